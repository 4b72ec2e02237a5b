use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    ids::{FolderId, UserId},
};

#[derive(Debug, Error)]
pub enum FoldersServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("folder not found")]
    FolderNotFound,

    #[error("folder name must not be empty")]
    EmptyName,

    #[error("unauthorized: not folder owner")]
    Unauthorized,
}

impl From<FoldersServiceError> for ResourceError {
    fn from(error: FoldersServiceError) -> Self {
        match error {
            FoldersServiceError::DbError(error) => ResourceError::infra(error),
            FoldersServiceError::FolderNotFound => ResourceError::app(error),
            FoldersServiceError::EmptyName => ResourceError::app(error),
            FoldersServiceError::Unauthorized => ResourceError::app(error),
        }
    }
}

/// Fields of a new folder.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewFolder {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

/// Partial folder update; `None` leaves a field alone.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FolderPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub is_pinned: Option<bool>,
}

#[derive(Clone)]
pub struct FoldersService {
    db: DatabaseConnection,
}

impl FoldersService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn _create_folder(
        &self,
        owner_id: UserId,
        folder: NewFolder,
    ) -> Result<FolderModel, FoldersServiceError> {
        let name = folder.name.trim().to_string();
        if name.is_empty() {
            return Err(FoldersServiceError::EmptyName);
        }

        let now = chrono::Utc::now();
        let folder = FolderActiveModel {
            id: Set(FolderId::new()),
            owner_id: Set(owner_id),
            name: Set(name),
            description: Set(folder.description),
            is_public: Set(folder.is_public),
            is_pinned: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let folder = Folder::insert(folder).exec_with_returning(&self.db).await?;
        debug!(folder_id = %folder.id, "created folder");
        Ok(folder)
    }

    pub async fn _get_folder(&self, id: FolderId) -> Result<FolderModel, FoldersServiceError> {
        Folder::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(FoldersServiceError::FolderNotFound)
    }

    pub async fn _list_folders(
        &self,
        owner_id: UserId,
    ) -> Result<Vec<FolderModel>, FoldersServiceError> {
        let folders = Folder::find()
            .filter(FolderColumn::OwnerId.eq(owner_id))
            .order_by_asc(FolderColumn::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(folders)
    }

    pub async fn _update_folder(
        &self,
        id: FolderId,
        owner_id: UserId,
        patch: FolderPatch,
    ) -> Result<FolderModel, FoldersServiceError> {
        let folder = self._get_folder(id).await?;
        if folder.owner_id != owner_id {
            return Err(FoldersServiceError::Unauthorized);
        }

        let mut active: FolderActiveModel = folder.into();
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(FoldersServiceError::EmptyName);
            }
            active.name = Set(name);
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(is_public) = patch.is_public {
            active.is_public = Set(is_public);
        }
        if let Some(is_pinned) = patch.is_pinned {
            active.is_pinned = Set(is_pinned);
        }
        active.updated_at = Set(chrono::Utc::now());

        Ok(active.update(&self.db).await?)
    }

    /// Deletes a folder. Its lists move to the top level and its comments go with it.
    pub async fn _delete_folder(
        &self,
        id: FolderId,
        owner_id: UserId,
    ) -> Result<(), FoldersServiceError> {
        let folder = self._get_folder(id).await?;
        if folder.owner_id != owner_id {
            return Err(FoldersServiceError::Unauthorized);
        }

        let txn = self.db.begin().await?;
        Comment::delete_many()
            .filter(CommentColumn::EntityType.eq(EntityKind::Folder))
            .filter(CommentColumn::EntityId.eq(id.into_uuid()))
            .exec(&txn)
            .await?;
        // list.folder_id is cleared by ON DELETE SET NULL
        Folder::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        debug!(folder_id = %id, "deleted folder");
        Ok(())
    }
}

#[zel_service(name = "folders")]
trait Folders {
    #[method(name = "create_folder")]
    async fn create_folder(
        &self,
        owner_id: UserId,
        folder: NewFolder,
    ) -> Result<FolderModel, ResourceError>;

    #[method(name = "get_folder")]
    async fn get_folder(&self, id: FolderId) -> Result<FolderModel, ResourceError>;

    #[method(name = "list_folders")]
    async fn list_folders(&self, owner_id: UserId) -> Result<Vec<FolderModel>, ResourceError>;

    #[method(name = "update_folder")]
    async fn update_folder(
        &self,
        id: FolderId,
        owner_id: UserId,
        patch: FolderPatch,
    ) -> Result<FolderModel, ResourceError>;

    #[method(name = "delete_folder")]
    async fn delete_folder(&self, id: FolderId, owner_id: UserId) -> Result<(), ResourceError>;
}

#[async_trait]
impl FoldersServer for FoldersService {
    async fn create_folder(
        &self,
        _ctx: RequestContext,
        owner_id: UserId,
        folder: NewFolder,
    ) -> Result<FolderModel, ResourceError> {
        Ok(self._create_folder(owner_id, folder).await?)
    }

    async fn get_folder(
        &self,
        _ctx: RequestContext,
        id: FolderId,
    ) -> Result<FolderModel, ResourceError> {
        Ok(self._get_folder(id).await?)
    }

    async fn list_folders(
        &self,
        _ctx: RequestContext,
        owner_id: UserId,
    ) -> Result<Vec<FolderModel>, ResourceError> {
        Ok(self._list_folders(owner_id).await?)
    }

    async fn update_folder(
        &self,
        _ctx: RequestContext,
        id: FolderId,
        owner_id: UserId,
        patch: FolderPatch,
    ) -> Result<FolderModel, ResourceError> {
        Ok(self._update_folder(id, owner_id, patch).await?)
    }

    async fn delete_folder(
        &self,
        _ctx: RequestContext,
        id: FolderId,
        owner_id: UserId,
    ) -> Result<(), ResourceError> {
        Ok(self._delete_folder(id, owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_user, setup_test_db};

    fn named(name: &str) -> NewFolder {
        NewFolder {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_list_folders() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let other = create_test_user(&db, "Other").await;
        let service = FoldersService::new(db);

        service._create_folder(owner, named("Home")).await.unwrap();
        service._create_folder(owner, named("Office")).await.unwrap();
        service._create_folder(other, named("Theirs")).await.unwrap();

        let folders = service._list_folders(owner).await.unwrap();
        assert_eq!(folders.len(), 2);
        assert!(folders.iter().all(|f| !f.is_pinned));
    }

    #[tokio::test]
    async fn test_blank_folder_name_rejected() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let service = FoldersService::new(db);

        let result = service._create_folder(owner, named("  ")).await;
        assert!(matches!(result, Err(FoldersServiceError::EmptyName)));
    }

    #[tokio::test]
    async fn test_update_folder() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let service = FoldersService::new(db);
        let folder = service._create_folder(owner, named("Home")).await.unwrap();

        let updated = service
            ._update_folder(
                folder.id,
                owner,
                FolderPatch {
                    name: Some("House".to_string()),
                    description: Some(Some("Things for the house".to_string())),
                    is_pinned: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "House");
        assert_eq!(updated.description.as_deref(), Some("Things for the house"));
        assert!(updated.is_pinned);
    }

    #[tokio::test]
    async fn test_delete_folder_by_non_owner_fails() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let other = create_test_user(&db, "Other").await;
        let service = FoldersService::new(db);
        let folder = service._create_folder(owner, named("Home")).await.unwrap();

        let result = service._delete_folder(folder.id, other).await;
        assert!(matches!(result, Err(FoldersServiceError::Unauthorized)));

        service._delete_folder(folder.id, owner).await.unwrap();
        let result = service._get_folder(folder.id).await;
        assert!(matches!(result, Err(FoldersServiceError::FolderNotFound)));
    }
}
