use sea_orm_migration::{prelude::*, schema::*};

use super::m20261018_000001_create_profile_table::Profile;
use super::m20261018_000002_create_folder_table::Folder;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(List::Table)
                    .col(pk_uuid(List::Id))
                    .col(uuid(List::OwnerId))
                    .col(string(List::Name))
                    .col(string_null(List::Description))
                    .col(boolean(List::IsPublic).default(false))
                    .col(boolean(List::IsPinned).default(false))
                    .col(uuid_null(List::FolderId))
                    .col(timestamp_with_time_zone(List::CreatedAt))
                    .col(timestamp_with_time_zone(List::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-list-owner_id")
                            .from(List::Table, List::OwnerId)
                            .to(Profile::Table, Profile::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-list-folder_id")
                            .from(List::Table, List::FolderId)
                            .to(Folder::Table, Folder::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_list_owner_id")
                    .table(List::Table)
                    .col(List::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_list_folder_id")
                    .table(List::Table)
                    .col(List::FolderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(List::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum List {
    Table,
    Id,
    OwnerId,
    Name,
    Description,
    IsPublic,
    IsPinned,
    FolderId,
    CreatedAt,
    UpdatedAt,
}
