use std::collections::{HashMap, HashSet};

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    ids::{FolderId, ListId, ProductId, UserId},
};

#[derive(Debug, Error)]
pub enum ListsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("list not found")]
    ListNotFound,

    #[error("folder not found")]
    FolderNotFound,

    #[error("list name must not be empty")]
    EmptyName,

    #[error("unauthorized: not the owner")]
    Unauthorized,
}

impl From<ListsServiceError> for ResourceError {
    fn from(error: ListsServiceError) -> Self {
        match error {
            ListsServiceError::DbError(error) => ResourceError::infra(error),
            ListsServiceError::ListNotFound => ResourceError::app(error),
            ListsServiceError::FolderNotFound => ResourceError::app(error),
            ListsServiceError::EmptyName => ResourceError::app(error),
            ListsServiceError::Unauthorized => ResourceError::app(error),
        }
    }
}

/// A list plus the number of distinct products it contains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListView {
    pub list: ListModel,
    pub product_count: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewList {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub folder_id: Option<FolderId>,
}

/// Partial list update; `None` leaves a field alone.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub is_pinned: Option<bool>,
}

#[derive(Clone)]
pub struct ListsService {
    db: DatabaseConnection,
}

impl ListsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn _create_list(
        &self,
        owner_id: UserId,
        list: NewList,
    ) -> Result<ListModel, ListsServiceError> {
        let name = list.name.trim().to_string();
        if name.is_empty() {
            return Err(ListsServiceError::EmptyName);
        }
        if let Some(folder_id) = list.folder_id {
            self.ensure_folder(folder_id, owner_id).await?;
        }

        let now = chrono::Utc::now();
        let list = ListActiveModel {
            id: Set(ListId::new()),
            owner_id: Set(owner_id),
            name: Set(name),
            description: Set(list.description),
            is_public: Set(list.is_public),
            is_pinned: Set(false),
            folder_id: Set(list.folder_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let list = List::insert(list).exec_with_returning(&self.db).await?;
        debug!(list_id = %list.id, "created list");
        Ok(list)
    }

    pub async fn _get_list(&self, id: ListId) -> Result<ListModel, ListsServiceError> {
        List::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ListsServiceError::ListNotFound)
    }

    /// Every list of `owner_id` with its product count.
    ///
    /// A product counts once per list even when it is both the primary list
    /// and an extra membership.
    pub async fn _list_views(&self, owner_id: UserId) -> Result<Vec<ListView>, ListsServiceError> {
        let lists = List::find()
            .filter(ListColumn::OwnerId.eq(owner_id))
            .order_by_asc(ListColumn::CreatedAt)
            .all(&self.db)
            .await?;
        if lists.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ListId> = lists.iter().map(|l| l.id).collect();

        let primary: Vec<(Option<ListId>, ProductId)> = Product::find()
            .select_only()
            .column(ProductColumn::ListId)
            .column(ProductColumn::Id)
            .filter(ProductColumn::ListId.is_in(ids.clone()))
            .into_tuple()
            .all(&self.db)
            .await?;

        let extra: Vec<(ListId, ProductId)> = ProductList::find()
            .select_only()
            .column(ProductListColumn::ListId)
            .column(ProductListColumn::ProductId)
            .filter(ProductListColumn::ListId.is_in(ids))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut members: HashMap<ListId, HashSet<ProductId>> = HashMap::new();
        let primary = primary
            .into_iter()
            .filter_map(|(list, product)| list.map(|list| (list, product)));
        for (list, product) in primary.chain(extra) {
            members.entry(list).or_default().insert(product);
        }

        Ok(lists
            .into_iter()
            .map(|list| {
                let product_count = members.get(&list.id).map_or(0, |m| m.len() as u64);
                ListView {
                    list,
                    product_count,
                }
            })
            .collect())
    }

    pub async fn _update_list(
        &self,
        id: ListId,
        owner_id: UserId,
        patch: ListPatch,
    ) -> Result<ListModel, ListsServiceError> {
        let list = self.owned(id, owner_id).await?;

        let mut active: ListActiveModel = list.into();
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ListsServiceError::EmptyName);
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

    /// Moves a list into a folder, or to the top level with `None`.
    pub async fn _set_folder(
        &self,
        id: ListId,
        owner_id: UserId,
        folder_id: Option<FolderId>,
    ) -> Result<ListModel, ListsServiceError> {
        let list = self.owned(id, owner_id).await?;
        if let Some(folder_id) = folder_id {
            self.ensure_folder(folder_id, owner_id).await?;
        }

        let mut active: ListActiveModel = list.into();
        active.folder_id = Set(folder_id);
        active.updated_at = Set(chrono::Utc::now());

        Ok(active.update(&self.db).await?)
    }

    /// Deletes a list with its comments. Products whose primary list it was
    /// become unassigned; extra memberships cascade.
    pub async fn _delete_list(&self, id: ListId, owner_id: UserId) -> Result<(), ListsServiceError> {
        self.owned(id, owner_id).await?;

        let txn = self.db.begin().await?;
        Comment::delete_many()
            .filter(CommentColumn::EntityType.eq(EntityKind::List))
            .filter(CommentColumn::EntityId.eq(id.into_uuid()))
            .exec(&txn)
            .await?;
        List::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        debug!(list_id = %id, "deleted list");
        Ok(())
    }

    async fn owned(&self, id: ListId, owner_id: UserId) -> Result<ListModel, ListsServiceError> {
        let list = self._get_list(id).await?;
        if list.owner_id != owner_id {
            return Err(ListsServiceError::Unauthorized);
        }
        Ok(list)
    }

    async fn ensure_folder(
        &self,
        folder_id: FolderId,
        owner_id: UserId,
    ) -> Result<(), ListsServiceError> {
        let folder = Folder::find_by_id(folder_id)
            .one(&self.db)
            .await?
            .ok_or(ListsServiceError::FolderNotFound)?;
        if folder.owner_id != owner_id {
            return Err(ListsServiceError::Unauthorized);
        }
        Ok(())
    }
}

#[zel_service(name = "lists")]
trait Lists {
    #[method(name = "create_list")]
    async fn create_list(&self, owner_id: UserId, list: NewList)
        -> Result<ListModel, ResourceError>;

    #[method(name = "get_list")]
    async fn get_list(&self, id: ListId) -> Result<ListModel, ResourceError>;

    #[method(name = "list_views")]
    async fn list_views(&self, owner_id: UserId) -> Result<Vec<ListView>, ResourceError>;

    #[method(name = "update_list")]
    async fn update_list(
        &self,
        id: ListId,
        owner_id: UserId,
        patch: ListPatch,
    ) -> Result<ListModel, ResourceError>;

    #[method(name = "set_folder")]
    async fn set_folder(
        &self,
        id: ListId,
        owner_id: UserId,
        folder_id: Option<FolderId>,
    ) -> Result<ListModel, ResourceError>;

    #[method(name = "delete_list")]
    async fn delete_list(&self, id: ListId, owner_id: UserId) -> Result<(), ResourceError>;
}

#[async_trait]
impl ListsServer for ListsService {
    async fn create_list(
        &self,
        _ctx: RequestContext,
        owner_id: UserId,
        list: NewList,
    ) -> Result<ListModel, ResourceError> {
        Ok(self._create_list(owner_id, list).await?)
    }

    async fn get_list(&self, _ctx: RequestContext, id: ListId) -> Result<ListModel, ResourceError> {
        Ok(self._get_list(id).await?)
    }

    async fn list_views(
        &self,
        _ctx: RequestContext,
        owner_id: UserId,
    ) -> Result<Vec<ListView>, ResourceError> {
        Ok(self._list_views(owner_id).await?)
    }

    async fn update_list(
        &self,
        _ctx: RequestContext,
        id: ListId,
        owner_id: UserId,
        patch: ListPatch,
    ) -> Result<ListModel, ResourceError> {
        Ok(self._update_list(id, owner_id, patch).await?)
    }

    async fn set_folder(
        &self,
        _ctx: RequestContext,
        id: ListId,
        owner_id: UserId,
        folder_id: Option<FolderId>,
    ) -> Result<ListModel, ResourceError> {
        Ok(self._set_folder(id, owner_id, folder_id).await?)
    }

    async fn delete_list(
        &self,
        _ctx: RequestContext,
        id: ListId,
        owner_id: UserId,
    ) -> Result<(), ResourceError> {
        Ok(self._delete_list(id, owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::folders::{FoldersService, NewFolder};
    use crate::test_utils::{create_test_product, create_test_user, setup_test_db};

    fn named(name: &str) -> NewList {
        NewList {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_list_trims_name() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let service = ListsService::new(db);

        let list = service._create_list(owner, named("  Gifts ")).await.unwrap();
        assert_eq!(list.name, "Gifts");
        assert_eq!(list.folder_id, None);

        let result = service._create_list(owner, named("")).await;
        assert!(matches!(result, Err(ListsServiceError::EmptyName)));
    }

    #[tokio::test]
    async fn test_product_counts_are_distinct() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let service = ListsService::new(db.clone());
        let gifts = service._create_list(owner, named("Gifts")).await.unwrap();
        let empty = service._create_list(owner, named("Empty")).await.unwrap();

        let primary = create_test_product(&db, owner, "Lamp", Some(gifts.id)).await;
        let extra = create_test_product(&db, owner, "Chair", None).await;
        for product in [primary, extra] {
            ProductList::insert(ProductListActiveModel {
                product_id: Set(product),
                list_id: Set(gifts.id),
                created_at: Set(chrono::Utc::now()),
            })
            .exec_without_returning(&db)
            .await
            .unwrap();
        }

        let views = service._list_views(owner).await.unwrap();
        let count = |id| views.iter().find(|v| v.list.id == id).unwrap().product_count;
        assert_eq!(count(gifts.id), 2);
        assert_eq!(count(empty.id), 0);
    }

    #[tokio::test]
    async fn test_set_folder_and_folder_delete() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let folders = FoldersService::new(db.clone());
        let service = ListsService::new(db);

        let folder = folders
            ._create_folder(
                owner,
                NewFolder {
                    name: "Home".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let list = service._create_list(owner, named("Kitchen")).await.unwrap();

        let moved = service
            ._set_folder(list.id, owner, Some(folder.id))
            .await
            .unwrap();
        assert_eq!(moved.folder_id, Some(folder.id));

        folders._delete_folder(folder.id, owner).await.unwrap();
        let list = service._get_list(list.id).await.unwrap();
        assert_eq!(list.folder_id, None);

        let result = service._set_folder(list.id, owner, Some(FolderId::new())).await;
        assert!(matches!(result, Err(ListsServiceError::FolderNotFound)));
    }

    #[tokio::test]
    async fn test_cannot_file_under_another_users_folder() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let other = create_test_user(&db, "Other").await;
        let folders = FoldersService::new(db.clone());
        let service = ListsService::new(db);

        let theirs = folders
            ._create_folder(
                other,
                NewFolder {
                    name: "Theirs".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let list = service._create_list(owner, named("Kitchen")).await.unwrap();

        let result = service._set_folder(list.id, owner, Some(theirs.id)).await;
        assert!(matches!(result, Err(ListsServiceError::Unauthorized)));

        let result = service
            ._create_list(
                owner,
                NewList {
                    name: "Garden".to_string(),
                    folder_id: Some(theirs.id),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ListsServiceError::Unauthorized)));

        let list = service._get_list(list.id).await.unwrap();
        assert_eq!(list.folder_id, None);
        assert_eq!(service._list_views(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_list_unassigns_products() {
        let db = setup_test_db().await;
        let owner = create_test_user(&db, "Owner").await;
        let service = ListsService::new(db.clone());
        let list = service._create_list(owner, named("Gifts")).await.unwrap();
        let product = create_test_product(&db, owner, "Lamp", Some(list.id)).await;

        let other = create_test_user(&db, "Other").await;
        let result = service._delete_list(list.id, other).await;
        assert!(matches!(result, Err(ListsServiceError::Unauthorized)));

        service._delete_list(list.id, owner).await.unwrap();
        let product = Product::find_by_id(product).one(&db).await.unwrap().unwrap();
        assert_eq!(product.list_id, None);
    }
}
