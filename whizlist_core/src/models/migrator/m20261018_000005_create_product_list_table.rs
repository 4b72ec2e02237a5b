use sea_orm_migration::{prelude::*, schema::*};

use super::m20261018_000003_create_list_table::List;
use super::m20261018_000004_create_product_table::Product;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductList::Table)
                    .col(uuid(ProductList::ProductId))
                    .col(uuid(ProductList::ListId))
                    .col(timestamp_with_time_zone(ProductList::CreatedAt))
                    .primary_key(
                        Index::create()
                            .col(ProductList::ProductId)
                            .col(ProductList::ListId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-product_list-product_id")
                            .from(ProductList::Table, ProductList::ProductId)
                            .to(Product::Table, Product::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-product_list-list_id")
                            .from(ProductList::Table, ProductList::ListId)
                            .to(List::Table, List::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Product counts are computed per list
        manager
            .create_index(
                Index::create()
                    .name("idx_product_list_list_id")
                    .table(ProductList::Table)
                    .col(ProductList::ListId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProductList::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ProductList {
    Table,
    ProductId,
    ListId,
    CreatedAt,
}
