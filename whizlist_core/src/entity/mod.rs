// SeaORM entities
// One module per table; `prelude` re-exports them under unambiguous names.

pub mod comment;
pub mod comment_like;
pub mod folder;
pub mod list;
pub mod product;
pub mod product_list;
pub mod profile;


pub mod prelude {
    pub use super::comment::{
        ActiveModel as CommentActiveModel, Column as CommentColumn, Entity as Comment, EntityKind,
        EntityRef, Model as CommentModel,
    };
    pub use super::comment_like::{
        ActiveModel as CommentLikeActiveModel, Column as CommentLikeColumn,
        Entity as CommentLike, Model as CommentLikeModel,
    };
    pub use super::folder::{
        ActiveModel as FolderActiveModel, Column as FolderColumn, Entity as Folder,
        Model as FolderModel,
    };
    pub use super::list::{
        ActiveModel as ListActiveModel, Column as ListColumn, Entity as List, Model as ListModel,
    };
    pub use super::product::{
        ActiveModel as ProductActiveModel, Column as ProductColumn, Entity as Product,
        Model as ProductModel, Tags,
    };
    pub use super::product_list::{
        ActiveModel as ProductListActiveModel, Column as ProductListColumn,
        Entity as ProductList, Model as ProductListModel,
    };
    pub use super::profile::{
        ActiveModel as ProfileActiveModel, Column as ProfileColumn, Entity as Profile,
        Model as ProfileModel,
    };

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, Database, DatabaseConnection,
        DbErr, EntityTrait, ModelTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder,
        QuerySelect, Related, RelationTrait, Set, TransactionTrait, Unchanged,
    };
}
