use sea_orm_migration::{prelude::*, schema::*};

use super::m20261018_000001_create_profile_table::Profile;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Folder::Table)
                    .col(pk_uuid(Folder::Id))
                    .col(uuid(Folder::OwnerId))
                    .col(string(Folder::Name))
                    .col(string_null(Folder::Description))
                    .col(boolean(Folder::IsPublic).default(false))
                    .col(boolean(Folder::IsPinned).default(false))
                    .col(timestamp_with_time_zone(Folder::CreatedAt))
                    .col(timestamp_with_time_zone(Folder::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-folder-owner_id")
                            .from(Folder::Table, Folder::OwnerId)
                            .to(Profile::Table, Profile::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_folder_owner_id")
                    .table(Folder::Table)
                    .col(Folder::OwnerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Folder::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Folder {
    Table,
    Id,
    OwnerId,
    Name,
    Description,
    IsPublic,
    IsPinned,
    CreatedAt,
    UpdatedAt,
}
