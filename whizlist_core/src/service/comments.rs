use std::collections::{HashMap, HashSet};

use sea_orm::{sea_query::Expr, DatabaseConnection};
use thiserror::Error;
use tracing::debug;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    ids::{CommentId, FolderId, ListId, ProductId, UserId},
    thread::{Author, CommentRecord},
};

#[derive(Debug, Error)]
pub enum CommentsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("comment not found")]
    CommentNotFound,

    #[error("commented record not found")]
    TargetNotFound,

    #[error("parent comment not found")]
    ParentNotFound,

    #[error("parent comment belongs to a different entity")]
    ParentEntityMismatch,

    #[error("comment must not be empty")]
    EmptyContent,

    #[error("unauthorized: not comment author")]
    Unauthorized,
}

impl From<CommentsServiceError> for ResourceError {
    fn from(error: CommentsServiceError) -> Self {
        match error {
            CommentsServiceError::DbError(error) => ResourceError::infra(error),
            CommentsServiceError::CommentNotFound => ResourceError::app(error),
            CommentsServiceError::TargetNotFound => ResourceError::app(error),
            CommentsServiceError::ParentNotFound => ResourceError::app(error),
            CommentsServiceError::ParentEntityMismatch => ResourceError::app(error),
            CommentsServiceError::EmptyContent => ResourceError::app(error),
            CommentsServiceError::Unauthorized => ResourceError::app(error),
        }
    }
}

#[derive(Clone)]
pub struct CommentsService {
    db: DatabaseConnection,
}

impl CommentsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Every comment on `entity`, oldest first, with authors and like data.
    ///
    /// Three queries regardless of thread size: comments joined with their
    /// authors, grouped like counts, and the viewer's own likes.
    pub async fn _list_comments(
        &self,
        entity: EntityRef,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentRecord>, CommentsServiceError> {
        let rows = Comment::find()
            .filter(CommentColumn::EntityType.eq(entity.kind))
            .filter(CommentColumn::EntityId.eq(entity.id))
            .order_by_asc(CommentColumn::CreatedAt)
            .find_also_related(Profile)
            .all(&self.db)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<CommentId> = rows.iter().map(|(comment, _)| comment.id).collect();

        let counts: HashMap<CommentId, i64> = CommentLike::find()
            .select_only()
            .column(CommentLikeColumn::CommentId)
            .column_as(Expr::col(CommentLikeColumn::UserId).count(), "like_count")
            .filter(CommentLikeColumn::CommentId.is_in(ids.clone()))
            .group_by(CommentLikeColumn::CommentId)
            .into_tuple::<(CommentId, i64)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        let liked: HashSet<CommentId> = match viewer {
            Some(viewer) => CommentLike::find()
                .select_only()
                .column(CommentLikeColumn::CommentId)
                .filter(CommentLikeColumn::UserId.eq(viewer))
                .filter(CommentLikeColumn::CommentId.is_in(ids))
                .into_tuple::<CommentId>()
                .all(&self.db)
                .await?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };

        let records = rows
            .into_iter()
            .map(|(comment, profile)| {
                let like_count = counts.get(&comment.id).copied().unwrap_or(0).max(0) as u64;
                let is_liked_by_user = liked.contains(&comment.id);
                record(comment, profile, like_count, is_liked_by_user)
            })
            .collect();

        Ok(records)
    }

    pub async fn _get_comment(&self, id: CommentId) -> Result<CommentModel, CommentsServiceError> {
        Comment::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(CommentsServiceError::CommentNotFound)
    }

    /// Posts a comment, or a reply when `parent_id` is given.
    pub async fn _create_comment(
        &self,
        entity: EntityRef,
        author: UserId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentModel, CommentsServiceError> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(CommentsServiceError::EmptyContent);
        }

        self.ensure_target(entity).await?;

        if let Some(parent_id) = parent_id {
            let parent = Comment::find_by_id(parent_id)
                .one(&self.db)
                .await?
                .ok_or(CommentsServiceError::ParentNotFound)?;
            if parent.entity() != entity {
                return Err(CommentsServiceError::ParentEntityMismatch);
            }
        }

        let now = chrono::Utc::now();
        let comment = CommentActiveModel {
            id: Set(CommentId::new()),
            content: Set(content),
            entity_type: Set(entity.kind),
            entity_id: Set(entity.id),
            product_id: Set(entity.as_product()),
            user_id: Set(author),
            parent_id: Set(parent_id),
            is_edited: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let comment = Comment::insert(comment)
            .exec_with_returning(&self.db)
            .await?;
        debug!(comment_id = %comment.id, %entity, "posted comment");
        Ok(comment)
    }

    async fn ensure_target(&self, entity: EntityRef) -> Result<(), CommentsServiceError> {
        let found = match entity.kind {
            EntityKind::Product => Product::find_by_id(ProductId::from_uuid(entity.id))
                .count(&self.db)
                .await?,
            EntityKind::List => List::find_by_id(ListId::from_uuid(entity.id))
                .count(&self.db)
                .await?,
            EntityKind::Folder => Folder::find_by_id(FolderId::from_uuid(entity.id))
                .count(&self.db)
                .await?,
        };
        if found == 0 {
            return Err(CommentsServiceError::TargetNotFound);
        }
        Ok(())
    }

    /// Replaces the content of a comment and marks it edited.
    pub async fn _update_comment(
        &self,
        id: CommentId,
        author: UserId,
        content: String,
    ) -> Result<CommentModel, CommentsServiceError> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(CommentsServiceError::EmptyContent);
        }
        let comment = self.authored(id, author).await?;

        let mut active: CommentActiveModel = comment.into();
        active.content = Set(content);
        active.is_edited = Set(true);
        active.updated_at = Set(chrono::Utc::now());

        Ok(active.update(&self.db).await?)
    }

    /// Deletes a comment. Replies below it cascade.
    pub async fn _delete_comment(
        &self,
        id: CommentId,
        author: UserId,
    ) -> Result<(), CommentsServiceError> {
        self.authored(id, author).await?;
        Comment::delete_by_id(id).exec(&self.db).await?;
        debug!(comment_id = %id, "deleted comment");
        Ok(())
    }

    /// Likes or unlikes a comment for `user`. Returns whether it is now liked.
    pub async fn _toggle_like(
        &self,
        id: CommentId,
        user: UserId,
    ) -> Result<bool, CommentsServiceError> {
        self._get_comment(id).await?;

        let existing = CommentLike::find_by_id((id, user)).one(&self.db).await?;
        let liked = match existing {
            Some(like) => {
                like.delete(&self.db).await?;
                false
            }
            None => {
                let like = CommentLikeActiveModel {
                    comment_id: Set(id),
                    user_id: Set(user),
                    created_at: Set(chrono::Utc::now()),
                };
                CommentLike::insert(like)
                    .exec_without_returning(&self.db)
                    .await?;
                true
            }
        };

        debug!(comment_id = %id, liked, "toggled like");
        Ok(liked)
    }

    async fn authored(
        &self,
        id: CommentId,
        author: UserId,
    ) -> Result<CommentModel, CommentsServiceError> {
        let comment = self._get_comment(id).await?;
        if comment.user_id != author {
            return Err(CommentsServiceError::Unauthorized);
        }
        Ok(comment)
    }
}

fn record(
    comment: CommentModel,
    profile: Option<ProfileModel>,
    like_count: u64,
    is_liked_by_user: bool,
) -> CommentRecord {
    let author = match profile {
        Some(profile) => Author {
            id: profile.id,
            name: profile.name,
            avatar_url: profile.avatar_url,
        },
        None => Author {
            id: comment.user_id,
            name: "Unknown".to_string(),
            avatar_url: None,
        },
    };

    CommentRecord {
        id: comment.id,
        entity: comment.entity(),
        content: comment.content,
        author,
        parent_id: comment.parent_id,
        is_edited: comment.is_edited,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        like_count,
        is_liked_by_user,
    }
}

#[zel_service(name = "comments")]
trait Comments {
    #[method(name = "list_comments")]
    async fn list_comments(
        &self,
        entity: EntityRef,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentRecord>, ResourceError>;

    #[method(name = "get_comment")]
    async fn get_comment(&self, id: CommentId) -> Result<CommentModel, ResourceError>;

    #[method(name = "create_comment")]
    async fn create_comment(
        &self,
        entity: EntityRef,
        author: UserId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentModel, ResourceError>;

    #[method(name = "update_comment")]
    async fn update_comment(
        &self,
        id: CommentId,
        author: UserId,
        content: String,
    ) -> Result<CommentModel, ResourceError>;

    #[method(name = "delete_comment")]
    async fn delete_comment(&self, id: CommentId, author: UserId) -> Result<(), ResourceError>;

    #[method(name = "toggle_like")]
    async fn toggle_like(&self, id: CommentId, user: UserId) -> Result<bool, ResourceError>;
}

#[async_trait]
impl CommentsServer for CommentsService {
    async fn list_comments(
        &self,
        _ctx: RequestContext,
        entity: EntityRef,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentRecord>, ResourceError> {
        Ok(self._list_comments(entity, viewer).await?)
    }

    async fn get_comment(
        &self,
        _ctx: RequestContext,
        id: CommentId,
    ) -> Result<CommentModel, ResourceError> {
        Ok(self._get_comment(id).await?)
    }

    async fn create_comment(
        &self,
        _ctx: RequestContext,
        entity: EntityRef,
        author: UserId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentModel, ResourceError> {
        Ok(self
            ._create_comment(entity, author, content, parent_id)
            .await?)
    }

    async fn update_comment(
        &self,
        _ctx: RequestContext,
        id: CommentId,
        author: UserId,
        content: String,
    ) -> Result<CommentModel, ResourceError> {
        Ok(self._update_comment(id, author, content).await?)
    }

    async fn delete_comment(
        &self,
        _ctx: RequestContext,
        id: CommentId,
        author: UserId,
    ) -> Result<(), ResourceError> {
        Ok(self._delete_comment(id, author).await?)
    }

    async fn toggle_like(
        &self,
        _ctx: RequestContext,
        id: CommentId,
        user: UserId,
    ) -> Result<bool, ResourceError> {
        Ok(self._toggle_like(id, user).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FolderId, ListId, ProductId};
    use crate::test_utils::{create_test_list, create_test_product, create_test_user, setup_test_db};

    #[tokio::test]
    async fn test_post_and_list_comments() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let product = create_test_product(&db, ada, "Lamp", None).await;
        let service = CommentsService::new(db);
        let entity = EntityRef::product(product);

        let root = service
            ._create_comment(entity, ada, "  Nice lamp ".to_string(), None)
            .await
            .unwrap();
        assert_eq!(root.content, "Nice lamp");
        assert_eq!(root.product_id, Some(product));

        service
            ._create_comment(entity, ada, "Agreed".to_string(), Some(root.id))
            .await
            .unwrap();

        let records = service._list_comments(entity, None).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].author.name, "Ada");
        assert!(records.iter().all(|r| r.like_count == 0 && !r.is_liked_by_user));
    }

    #[tokio::test]
    async fn test_list_comments_on_other_entities() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let list = EntityRef::list(create_test_list(&db, ada, "Gifts").await);
        let service = CommentsService::new(db);

        let comment = service
            ._create_comment(list, ada, "Good list".to_string(), None)
            .await
            .unwrap();
        assert_eq!(comment.product_id, None);

        let other = EntityRef::list(ListId::new());
        assert!(service._list_comments(other, None).await.unwrap().is_empty());
        assert_eq!(service._list_comments(list, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_comment_target_must_exist() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let service = CommentsService::new(db);

        for missing in [
            EntityRef::list(ListId::new()),
            EntityRef::folder(FolderId::new()),
            EntityRef::product(ProductId::new()),
        ] {
            let result = service
                ._create_comment(missing, ada, "Hello?".to_string(), None)
                .await;
            assert!(matches!(result, Err(CommentsServiceError::TargetNotFound)));
            assert!(service._list_comments(missing, None).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_blank_comment_rejected() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let service = CommentsService::new(db);

        let result = service
            ._create_comment(EntityRef::list(ListId::new()), ada, " \n ".to_string(), None)
            .await;
        assert!(matches!(result, Err(CommentsServiceError::EmptyContent)));
    }

    #[tokio::test]
    async fn test_reply_must_share_entity() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let first = EntityRef::list(create_test_list(&db, ada, "First").await);
        let second = EntityRef::list(create_test_list(&db, ada, "Second").await);
        let service = CommentsService::new(db);

        let parent = service
            ._create_comment(first, ada, "Root".to_string(), None)
            .await
            .unwrap();
        let result = service
            ._create_comment(second, ada, "Reply".to_string(), Some(parent.id))
            .await;
        assert!(matches!(result, Err(CommentsServiceError::ParentEntityMismatch)));

        let result = service
            ._create_comment(first, ada, "Reply".to_string(), Some(CommentId::new()))
            .await;
        assert!(matches!(result, Err(CommentsServiceError::ParentNotFound)));
    }

    #[tokio::test]
    async fn test_like_counts_and_viewer_flag() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let bob = create_test_user(&db, "Bob").await;
        let entity = EntityRef::list(create_test_list(&db, ada, "Gifts").await);
        let service = CommentsService::new(db);
        let comment = service
            ._create_comment(entity, ada, "Root".to_string(), None)
            .await
            .unwrap();

        assert!(service._toggle_like(comment.id, ada).await.unwrap());
        assert!(service._toggle_like(comment.id, bob).await.unwrap());

        let records = service._list_comments(entity, Some(bob)).await.unwrap();
        assert_eq!(records[0].like_count, 2);
        assert!(records[0].is_liked_by_user);

        // a second toggle undoes the first
        assert!(!service._toggle_like(comment.id, bob).await.unwrap());
        let records = service._list_comments(entity, Some(bob)).await.unwrap();
        assert_eq!(records[0].like_count, 1);
        assert!(!records[0].is_liked_by_user);
    }

    #[tokio::test]
    async fn test_edit_marks_comment_edited() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let bob = create_test_user(&db, "Bob").await;
        let entity = EntityRef::list(create_test_list(&db, ada, "Gifts").await);
        let service = CommentsService::new(db);
        let comment = service
            ._create_comment(entity, ada, "Frist".to_string(), None)
            .await
            .unwrap();

        let edited = service
            ._update_comment(comment.id, ada, "First".to_string())
            .await
            .unwrap();
        assert_eq!(edited.content, "First");
        assert!(edited.is_edited);

        let result = service._update_comment(comment.id, bob, "Mine".to_string()).await;
        assert!(matches!(result, Err(CommentsServiceError::Unauthorized)));
        let result = service._update_comment(comment.id, ada, "".to_string()).await;
        assert!(matches!(result, Err(CommentsServiceError::EmptyContent)));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let entity = EntityRef::list(create_test_list(&db, ada, "Gifts").await);
        let service = CommentsService::new(db);

        let root = service
            ._create_comment(entity, ada, "Root".to_string(), None)
            .await
            .unwrap();
        let reply = service
            ._create_comment(entity, ada, "Reply".to_string(), Some(root.id))
            .await
            .unwrap();
        service
            ._create_comment(entity, ada, "Nested".to_string(), Some(reply.id))
            .await
            .unwrap();
        let sibling = service
            ._create_comment(entity, ada, "Sibling".to_string(), None)
            .await
            .unwrap();

        service._delete_comment(root.id, ada).await.unwrap();

        let records = service._list_comments(entity, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, sibling.id);
    }

    #[tokio::test]
    async fn test_product_delete_removes_comments() {
        let db = setup_test_db().await;
        let ada = create_test_user(&db, "Ada").await;
        let product = create_test_product(&db, ada, "Lamp", None).await;
        let service = CommentsService::new(db.clone());
        let entity = EntityRef::product(product);
        service
            ._create_comment(entity, ada, "Root".to_string(), None)
            .await
            .unwrap();

        Product::delete_by_id(product).exec(&db).await.unwrap();
        assert!(service._list_comments(entity, None).await.unwrap().is_empty());

        let missing = EntityRef::product(ProductId::new());
        assert!(service._list_comments(missing, None).await.unwrap().is_empty());
    }
}
