//! Product image storage.
//!
//! Objects are addressed by path, `{user_id}/{product_id}.{ext}`, and uploads
//! replace whatever already sits at the path.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::ids::{ProductId, UserId};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("blob i/o failed")]
    Io(#[from] std::io::Error),
}

/// Path of a product image inside the store.
pub fn image_path(owner: UserId, product: ProductId, ext: &str) -> String {
    format!("{owner}/{product}.{ext}")
}

/// Extension of a stored object, `bin` when it has none.
pub fn extension(path: &str) -> &str {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("bin")
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `data` at `path`, replacing any existing object.
    async fn upload(&self, path: &str, data: Bytes) -> Result<(), BlobError>;

    async fn download(&self, path: &str) -> Result<Bytes, BlobError>;

    /// Public URL for the object at `path`.
    fn public_url(&self, path: &str) -> String;

    /// Reverse of [`BlobStore::public_url`]; `None` for URLs this store did not issue.
    fn path_for_url(&self, url: &str) -> Option<String>;

    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        let data = self.download(from).await?;
        self.upload(to, data).await
    }
}

/// Blob store on the local filesystem.
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, data: Bytes) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, &data).await?;
        debug!(path, bytes = data.len(), "stored blob");
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Bytes, BlobError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.base_url)?
            .strip_prefix('/')
            .filter(|path| !path.is_empty())
            .map(str::to_owned)
    }
}
