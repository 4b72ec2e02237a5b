use crate::ids::{ListId, ProductId, UserId};
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: ProductId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub price: Option<String>,
    pub image_url: Option<String>,
    pub product_url: String,
    pub is_pinned: bool,
    #[sea_orm(column_type = "Json")]
    #[serde(default)]
    pub tags: Tags,
    pub list_id: Option<ListId>, // primary list; extra memberships live in product_list
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Tags attached to a product, stored as a JSON array.
///
/// A `null` column deserializes to an empty set of tags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct Tags(pub Vec<String>);

impl<'de> Deserialize<'de> for Tags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tags = Option::<Vec<String>>::deserialize(deserializer)?;
        Ok(Tags(tags.unwrap_or_default()))
    }
}

impl Tags {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        Tags(tags)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::list::Entity",
        from = "Column::ListId",
        to = "super::list::Column::Id"
    )]
    List,
    #[sea_orm(has_many = "super::product_list::Entity")]
    ProductList,
}

impl Related<super::list::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::List.def()
    }
}

impl Related<super::product_list::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductList.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
