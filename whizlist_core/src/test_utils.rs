use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::entity::prelude::*;
use crate::ids::{ListId, ProductId, UserId};
use crate::models::migrator::Migrator;

/// Fresh in-memory SQLite database with every migration applied.
/// Each call gets its own isolated database.
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Inserts a profile and returns its id.
pub async fn create_test_user(db: &DatabaseConnection, name: &str) -> UserId {
    let id = UserId::new();
    let profile = ProfileActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        avatar_url: Set(None),
        created_at: Set(chrono::Utc::now()),
    };
    Profile::insert(profile).exec(db).await.unwrap();
    id
}

/// Inserts a bare product owned by `owner` and returns its id.
pub async fn create_test_product(
    db: &DatabaseConnection,
    owner: UserId,
    title: &str,
    list_id: Option<ListId>,
) -> ProductId {
    let id = ProductId::new();
    let now = chrono::Utc::now();
    let product = ProductActiveModel {
        id: Set(id),
        owner_id: Set(owner),
        title: Set(title.to_string()),
        description: Set(String::new()),
        price: Set(None),
        image_url: Set(None),
        product_url: Set(format!("https://shop.example/{id}")),
        is_pinned: Set(false),
        tags: Set(Tags::default()),
        list_id: Set(list_id),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Product::insert(product).exec(db).await.unwrap();
    id
}

/// Inserts an empty list owned by `owner` and returns its id.
pub async fn create_test_list(db: &DatabaseConnection, owner: UserId, name: &str) -> ListId {
    let id = ListId::new();
    let now = chrono::Utc::now();
    let list = ListActiveModel {
        id: Set(id),
        owner_id: Set(owner),
        name: Set(name.to_string()),
        description: Set(None),
        is_public: Set(false),
        is_pinned: Set(false),
        folder_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    List::insert(list).exec(db).await.unwrap();
    id
}
