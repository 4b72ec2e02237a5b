use sea_orm_migration::{prelude::*, schema::*};

use super::m20261018_000001_create_profile_table::Profile;
use super::m20261018_000003_create_list_table::List;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Product::Table)
                    .col(pk_uuid(Product::Id))
                    .col(uuid(Product::OwnerId))
                    .col(string(Product::Title))
                    .col(text(Product::Description))
                    .col(string_null(Product::Price))
                    .col(string_null(Product::ImageUrl))
                    .col(string(Product::ProductUrl))
                    .col(boolean(Product::IsPinned).default(false))
                    .col(json(Product::Tags))
                    .col(uuid_null(Product::ListId))
                    .col(timestamp_with_time_zone(Product::CreatedAt))
                    .col(timestamp_with_time_zone(Product::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-product-owner_id")
                            .from(Product::Table, Product::OwnerId)
                            .to(Profile::Table, Profile::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-product-list_id")
                            .from(Product::Table, Product::ListId)
                            .to(List::Table, List::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_owner_id")
                    .table(Product::Table)
                    .col(Product::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_list_id")
                    .table(Product::Table)
                    .col(Product::ListId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Product::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Product {
    Table,
    Id,
    OwnerId,
    Title,
    Description,
    Price,
    ImageUrl,
    ProductUrl,
    IsPinned,
    Tags,
    ListId,
    CreatedAt,
    UpdatedAt,
}
