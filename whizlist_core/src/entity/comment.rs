use crate::ids::{CommentId, FolderId, ListId, ProductId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of records a comment can be attached to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "folder")]
    Folder,
    #[sea_orm(string_value = "list")]
    List,
}

/// A commentable record: its kind plus its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn product(id: ProductId) -> Self {
        Self {
            kind: EntityKind::Product,
            id: id.into_uuid(),
        }
    }

    pub fn list(id: ListId) -> Self {
        Self {
            kind: EntityKind::List,
            id: id.into_uuid(),
        }
    }

    pub fn folder(id: FolderId) -> Self {
        Self {
            kind: EntityKind::Folder,
            id: id.into_uuid(),
        }
    }

    /// The product id, for the legacy `product_id` column.
    pub fn as_product(&self) -> Option<ProductId> {
        (self.kind == EntityKind::Product).then(|| ProductId::from_uuid(self.id))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            EntityKind::Product => "product",
            EntityKind::Folder => "folder",
            EntityKind::List => "list",
        };
        write!(f, "{kind}:{}", self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: CommentId,
    pub content: String,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub product_id: Option<ProductId>, // predates polymorphic targets, set for product comments only
    pub user_id: UserId,
    pub parent_id: Option<CommentId>, // NULL for root comments
    pub is_edited: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn entity(&self) -> EntityRef {
        EntityRef {
            kind: self.entity_type,
            id: self.entity_id,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::UserId",
        to = "super::profile::Column::Id"
    )]
    Profile,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id"
    )]
    Parent,
    #[sea_orm(has_many = "super::comment_like::Entity")]
    CommentLike,
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl Related<super::comment_like::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CommentLike.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
