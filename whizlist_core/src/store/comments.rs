use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::StoreError;
use crate::{
    entity::prelude::{CommentModel, EntityRef},
    ids::{CommentId, UserId},
    service::comments::{CommentsService, CommentsServiceError},
    thread::{CommentArena, CommentRecord, ThreadedComment},
};

/// The comment operations a [`CommentStore`] needs.
#[async_trait]
pub trait CommentBackend: Send + Sync {
    async fn list_comments(
        &self,
        entity: EntityRef,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentRecord>, CommentsServiceError>;

    async fn create_comment(
        &self,
        entity: EntityRef,
        author: UserId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentModel, CommentsServiceError>;

    async fn update_comment(
        &self,
        id: CommentId,
        author: UserId,
        content: String,
    ) -> Result<CommentModel, CommentsServiceError>;

    async fn delete_comment(&self, id: CommentId, author: UserId)
        -> Result<(), CommentsServiceError>;

    async fn toggle_like(&self, id: CommentId, user: UserId) -> Result<bool, CommentsServiceError>;
}

#[async_trait]
impl CommentBackend for CommentsService {
    async fn list_comments(
        &self,
        entity: EntityRef,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentRecord>, CommentsServiceError> {
        self._list_comments(entity, viewer).await
    }

    async fn create_comment(
        &self,
        entity: EntityRef,
        author: UserId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentModel, CommentsServiceError> {
        self._create_comment(entity, author, content, parent_id).await
    }

    async fn update_comment(
        &self,
        id: CommentId,
        author: UserId,
        content: String,
    ) -> Result<CommentModel, CommentsServiceError> {
        self._update_comment(id, author, content).await
    }

    async fn delete_comment(
        &self,
        id: CommentId,
        author: UserId,
    ) -> Result<(), CommentsServiceError> {
        self._delete_comment(id, author).await
    }

    async fn toggle_like(&self, id: CommentId, user: UserId) -> Result<bool, CommentsServiceError> {
        self._toggle_like(id, user).await
    }
}

/// Comment threads the viewer has opened, one arena per entity.
pub struct CommentStore<B> {
    backend: B,
    viewer: UserId,
    threads: HashMap<EntityRef, CommentArena>,
    error: Option<String>,
}

impl<B: CommentBackend> CommentStore<B> {
    pub fn new(backend: B, viewer: UserId) -> Self {
        Self {
            backend,
            viewer,
            threads: HashMap::new(),
            error: None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn track<T, E: Into<StoreError>>(&mut self, result: Result<T, E>) -> Result<T, StoreError> {
        match result {
            Ok(value) => {
                self.error = None;
                Ok(value)
            }
            Err(error) => {
                let error = error.into();
                self.error = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// The cached thread of `entity`; empty until it has been fetched.
    pub fn thread(&self, entity: &EntityRef) -> Vec<ThreadedComment> {
        self.threads
            .get(entity)
            .map(CommentArena::thread)
            .unwrap_or_default()
    }

    /// A single cached comment, predicted likes applied.
    pub fn comment(&self, entity: &EntityRef, id: &CommentId) -> Option<CommentRecord> {
        self.threads.get(entity)?.get(id)
    }

    /// Loads the thread of `entity`, replacing the cached one and any
    /// predicted likes. On failure the cached thread is kept.
    pub async fn fetch_thread(
        &mut self,
        entity: EntityRef,
    ) -> Result<Vec<ThreadedComment>, StoreError> {
        let result = self
            .backend
            .list_comments(entity, Some(self.viewer))
            .await;
        let records = self.track(result)?;

        debug!(%entity, comments = records.len(), "fetched thread");
        let arena = CommentArena::from_records(records);
        let thread = arena.thread();
        self.threads.insert(entity, arena);
        Ok(thread)
    }

    /// Posts a root comment and refetches the thread.
    ///
    /// Returns the saved comment even when the refetch fails; that failure is
    /// only reported through [`CommentStore::error`].
    pub async fn post_comment(
        &mut self,
        entity: EntityRef,
        content: &str,
    ) -> Result<CommentModel, StoreError> {
        self.post(entity, content, None).await
    }

    /// Replies on `clicked`. Replies on the deepest comments attach higher up
    /// the chain so threads never nest past the display limit.
    pub async fn post_reply(
        &mut self,
        entity: EntityRef,
        clicked: CommentId,
        content: &str,
    ) -> Result<CommentModel, StoreError> {
        let parent = self
            .threads
            .get(&entity)
            .and_then(|arena| arena.reply_parent(&clicked))
            .unwrap_or(clicked);
        self.post(entity, content, Some(parent)).await
    }

    async fn post(
        &mut self,
        entity: EntityRef,
        content: &str,
        parent_id: Option<CommentId>,
    ) -> Result<CommentModel, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return self.track(Err(StoreError::Validation("comment must not be empty")));
        }

        let result = self
            .backend
            .create_comment(entity, self.viewer, content.to_string(), parent_id)
            .await;
        let comment = self.track(result)?;

        // the comment is saved either way; a failed refresh only leaves `error` set
        if let Err(error) = self.fetch_thread(entity).await {
            warn!(%error, comment_id = %comment.id, "posted comment but thread refresh failed");
        }
        Ok(comment)
    }

    /// Edits a comment in place; its replies and likes stay as they are.
    pub async fn edit_comment(
        &mut self,
        entity: EntityRef,
        id: CommentId,
        content: &str,
    ) -> Result<CommentModel, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return self.track(Err(StoreError::Validation("comment must not be empty")));
        }

        let result = self
            .backend
            .update_comment(id, self.viewer, content.to_string())
            .await;
        let comment = self.track(result)?;

        if let Some(arena) = self.threads.get_mut(&entity) {
            arena.apply_edit(id, comment.content.clone(), comment.updated_at);
        }
        Ok(comment)
    }

    /// Deletes a comment and drops its whole subtree from the cache.
    pub async fn delete_comment(
        &mut self,
        entity: EntityRef,
        id: CommentId,
    ) -> Result<Vec<CommentId>, StoreError> {
        let result = self.backend.delete_comment(id, self.viewer).await;
        self.track(result)?;

        let removed = self
            .threads
            .get_mut(&entity)
            .map(|arena| arena.remove_subtree(id))
            .unwrap_or_default();
        Ok(removed)
    }

    /// Toggles the viewer's like. Returns whether the comment is now liked.
    pub async fn toggle_like(
        &mut self,
        entity: EntityRef,
        id: CommentId,
    ) -> Result<bool, StoreError> {
        let result = self.backend.toggle_like(id, self.viewer).await;
        let liked = self.track(result)?;

        if let Some(arena) = self.threads.get_mut(&entity) {
            arena.predict_like(id, liked);
        }
        Ok(liked)
    }
}
