use sea_orm_migration::prelude::*;

mod m20261018_000001_create_profile_table;
mod m20261018_000002_create_folder_table;
mod m20261018_000003_create_list_table;
mod m20261018_000004_create_product_table;
mod m20261018_000005_create_product_list_table;
mod m20261018_000006_create_comment_table;
mod m20261018_000007_create_comment_like_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261018_000001_create_profile_table::Migration),
            Box::new(m20261018_000002_create_folder_table::Migration),
            Box::new(m20261018_000003_create_list_table::Migration),
            Box::new(m20261018_000004_create_product_table::Migration),
            Box::new(m20261018_000005_create_product_list_table::Migration),
            Box::new(m20261018_000006_create_comment_table::Migration),
            Box::new(m20261018_000007_create_comment_like_table::Migration),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DbErr};

    #[tokio::test]
    async fn test_migrations_okay() -> Result<(), DbErr> {
        let db = Database::connect("sqlite::memory:").await?;
        let schema_manager = SchemaManager::new(&db);

        Migrator::refresh(&db).await?;

        for table in [
            "profile",
            "folder",
            "list",
            "product",
            "product_list",
            "comment",
            "comment_like",
        ] {
            assert!(schema_manager.has_table(table).await?, "missing {table}");
        }

        Ok(())
    }
}
