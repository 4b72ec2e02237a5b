//! Per-user caches over the services.
//!
//! A [`Session`] is what a signed-in user works against: the catalog of their
//! products, lists and folders, and the comment threads they have opened.
//! Dropping the session signs the user out.

use thiserror::Error;

use crate::{
    ids::UserId,
    service::{
        comments::{CommentsService, CommentsServiceError},
        folders::FoldersServiceError,
        lists::ListsServiceError,
        products::ProductsServiceError,
    },
};

pub mod catalog;
pub mod comments;

pub use catalog::CatalogStore;
pub use comments::{CommentBackend, CommentStore};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected before reaching a service.
    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Products(#[from] ProductsServiceError),

    #[error(transparent)]
    Lists(#[from] ListsServiceError),

    #[error(transparent)]
    Folders(#[from] FoldersServiceError),

    #[error(transparent)]
    Comments(#[from] CommentsServiceError),
}

pub struct Session {
    pub user: UserId,
    pub catalog: CatalogStore,
    pub comments: CommentStore<CommentsService>,
}

impl Session {
    pub fn new(user: UserId, catalog: CatalogStore, comments: CommentStore<CommentsService>) -> Self {
        Self {
            user,
            catalog,
            comments,
        }
    }
}
