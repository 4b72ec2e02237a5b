use std::{collections::BTreeSet, sync::Arc};

use futures::TryFutureExt;
use tokio::task::JoinHandle;
use tracing::debug;

use super::StoreError;
use crate::{
    assignment::{ListChanges, ListSelection},
    entity::prelude::{FolderModel, ListModel, ProductModel},
    extraction::ContentExtractor,
    ids::{FolderId, ListId, ProductId, UserId},
    search::{self, SearchResults},
    service::{
        folders::{FolderPatch, FoldersService, NewFolder},
        lists::{ListPatch, ListView, ListsService, NewList},
        products::{NewProduct, ProductPatch, ProductsService},
    },
};

/// Cached products, lists and folders of one user.
///
/// Every mutation goes to the services first. The cache only changes once
/// the service call succeeded; a failure leaves it as it was and records the
/// message in [`CatalogStore::error`].
pub struct CatalogStore {
    user: UserId,
    products_service: ProductsService,
    lists_service: ListsService,
    folders_service: FoldersService,

    products: Vec<ProductModel>,
    lists: Vec<ListView>,
    folders: Vec<FolderModel>,
    error: Option<String>,
}

impl CatalogStore {
    pub fn new(
        user: UserId,
        products_service: ProductsService,
        lists_service: ListsService,
        folders_service: FoldersService,
    ) -> Self {
        Self {
            user,
            products_service,
            lists_service,
            folders_service,
            products: Vec::new(),
            lists: Vec::new(),
            folders: Vec::new(),
            error: None,
        }
    }

    pub fn products(&self) -> &[ProductModel] {
        &self.products
    }

    pub fn lists(&self) -> &[ListView] {
        &self.lists
    }

    pub fn folders(&self) -> &[FolderModel] {
        &self.folders
    }

    /// Message of the last failed call, cleared by the next successful one.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn product(&self, id: ProductId) -> Option<&ProductModel> {
        self.products.iter().find(|p| p.id == id)
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

    /// Replaces the whole cache with fresh data.
    pub async fn load(&mut self) -> Result<(), StoreError> {
        let result = futures::try_join!(
            self.products_service
                ._list_products(self.user)
                .map_err(StoreError::from),
            self.lists_service
                ._list_views(self.user)
                .map_err(StoreError::from),
            self.folders_service
                ._list_folders(self.user)
                .map_err(StoreError::from),
        );
        let (products, lists, folders) = self.track(result)?;

        debug!(
            user_id = %self.user,
            products = products.len(),
            lists = lists.len(),
            folders = folders.len(),
            "loaded catalog"
        );
        self.products = products;
        self.lists = lists;
        self.folders = folders;
        Ok(())
    }

    async fn refresh_lists(&mut self) -> Result<(), StoreError> {
        let result = self.lists_service._list_views(self.user).await;
        self.lists = self.track(result)?;
        Ok(())
    }

    fn replace_product(&mut self, product: ProductModel) {
        match self.products.iter_mut().find(|p| p.id == product.id) {
            Some(slot) => *slot = product,
            None => self.products.insert(0, product),
        }
    }

    /// Creates a product and puts it in every list of `lists`.
    pub async fn add_product(
        &mut self,
        product: NewProduct,
        lists: BTreeSet<ListId>,
    ) -> Result<ProductModel, StoreError> {
        let result = self
            .products_service
            ._create_product(self.user, product)
            .await;
        let product = self.track(result)?;

        let result = self
            .products_service
            ._reconcile_lists(product.id, self.user, lists)
            .await;
        self.track(result)?;

        let result = self.products_service._get_product(product.id).await;
        let product = self.track(result)?;
        self.replace_product(product.clone());
        self.refresh_lists().await?;
        Ok(product)
    }

    /// Saves a product from a url; the returned handle finishes the background
    /// enhancement. Reload to pick up the enhanced fields.
    pub async fn add_product_from_url(
        &mut self,
        url: &str,
        lists: BTreeSet<ListId>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Result<(ProductModel, JoinHandle<()>), StoreError> {
        let result = self
            .products_service
            .create_from_url(self.user, url, lists, extractor)
            .await;
        let (product, enhancement) = self.track(result)?;

        self.replace_product(product.clone());
        self.refresh_lists().await?;
        Ok((product, enhancement))
    }

    pub async fn update_product(
        &mut self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<ProductModel, StoreError> {
        let result = self
            .products_service
            ._update_product(id, self.user, patch)
            .await;
        let product = self.track(result)?;
        self.replace_product(product.clone());
        Ok(product)
    }

    pub async fn set_pinned(
        &mut self,
        id: ProductId,
        is_pinned: bool,
    ) -> Result<ProductModel, StoreError> {
        let result = self
            .products_service
            ._set_pinned(id, self.user, is_pinned)
            .await;
        let product = self.track(result)?;
        self.replace_product(product.clone());
        Ok(product)
    }

    pub async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError> {
        let result = self.products_service._delete_product(id, self.user).await;
        self.track(result)?;
        self.products.retain(|p| p.id != id);
        self.refresh_lists().await
    }

    pub async fn move_product(
        &mut self,
        id: ProductId,
        list_id: Option<ListId>,
    ) -> Result<ProductModel, StoreError> {
        let result = self
            .products_service
            ._move_product(id, self.user, list_id)
            .await;
        let product = self.track(result)?;
        self.replace_product(product.clone());
        self.refresh_lists().await?;
        Ok(product)
    }

    pub async fn copy_product(
        &mut self,
        id: ProductId,
        target: ListId,
    ) -> Result<ProductModel, StoreError> {
        let result = self
            .products_service
            ._copy_product(id, self.user, target)
            .await;
        let copy = self.track(result)?;
        self.replace_product(copy.clone());
        self.refresh_lists().await?;
        Ok(copy)
    }

    /// Current list memberships of a product, for seeding a [`ListSelection`].
    pub async fn memberships(&mut self, id: ProductId) -> Result<BTreeSet<ListId>, StoreError> {
        let result = self.products_service._memberships(id).await;
        self.track(result)
    }

    /// Applies a list selection to a product.
    pub async fn assign_lists(
        &mut self,
        id: ProductId,
        selection: &ListSelection,
    ) -> Result<ListChanges, StoreError> {
        let result = self
            .products_service
            ._reconcile_lists(id, self.user, selection.selected().clone())
            .await;
        let changes = self.track(result)?;
        if changes.is_empty() {
            return Ok(changes);
        }

        let result = self.products_service._get_product(id).await;
        let product = self.track(result)?;
        self.replace_product(product);
        self.refresh_lists().await?;
        Ok(changes)
    }

    pub async fn create_list(&mut self, list: NewList) -> Result<ListModel, StoreError> {
        let result = self.lists_service._create_list(self.user, list).await;
        let list = self.track(result)?;
        self.lists.push(ListView {
            list: list.clone(),
            product_count: 0,
        });
        Ok(list)
    }

    /// Creates a list from the inline field of a list selector and ticks it.
    pub async fn create_list_and_select(
        &mut self,
        selection: &mut ListSelection,
        name: &str,
    ) -> Result<ListModel, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return self.track(Err(StoreError::Validation("list name must not be empty")));
        }

        let list = self
            .create_list(NewList {
                name: name.to_string(),
                ..Default::default()
            })
            .await?;
        selection.select(list.id);
        Ok(list)
    }

    pub async fn update_list(
        &mut self,
        id: ListId,
        patch: ListPatch,
    ) -> Result<ListModel, StoreError> {
        let result = self.lists_service._update_list(id, self.user, patch).await;
        let list = self.track(result)?;
        if let Some(view) = self.lists.iter_mut().find(|v| v.list.id == id) {
            view.list = list.clone();
        }
        Ok(list)
    }

    pub async fn set_list_folder(
        &mut self,
        id: ListId,
        folder_id: Option<FolderId>,
    ) -> Result<ListModel, StoreError> {
        let result = self
            .lists_service
            ._set_folder(id, self.user, folder_id)
            .await;
        let list = self.track(result)?;
        if let Some(view) = self.lists.iter_mut().find(|v| v.list.id == id) {
            view.list = list.clone();
        }
        Ok(list)
    }

    pub async fn delete_list(&mut self, id: ListId) -> Result<(), StoreError> {
        let result = self.lists_service._delete_list(id, self.user).await;
        self.track(result)?;

        self.lists.retain(|v| v.list.id != id);
        for product in self.products.iter_mut().filter(|p| p.list_id == Some(id)) {
            product.list_id = None;
        }
        Ok(())
    }

    pub async fn create_folder(&mut self, folder: NewFolder) -> Result<FolderModel, StoreError> {
        let result = self.folders_service._create_folder(self.user, folder).await;
        let folder = self.track(result)?;
        self.folders.push(folder.clone());
        Ok(folder)
    }

    pub async fn update_folder(
        &mut self,
        id: FolderId,
        patch: FolderPatch,
    ) -> Result<FolderModel, StoreError> {
        let result = self
            .folders_service
            ._update_folder(id, self.user, patch)
            .await;
        let folder = self.track(result)?;
        if let Some(slot) = self.folders.iter_mut().find(|f| f.id == id) {
            *slot = folder.clone();
        }
        Ok(folder)
    }

    pub async fn delete_folder(&mut self, id: FolderId) -> Result<(), StoreError> {
        let result = self.folders_service._delete_folder(id, self.user).await;
        self.track(result)?;

        self.folders.retain(|f| f.id != id);
        for view in self.lists.iter_mut().filter(|v| v.list.folder_id == Some(id)) {
            view.list.folder_id = None;
        }
        Ok(())
    }

    /// Searches the cached catalog.
    pub fn search(&self, query: &str) -> SearchResults {
        let lists: Vec<ListModel> = self.lists.iter().map(|v| v.list.clone()).collect();
        search::search(query, &self.products, &lists, &self.folders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::FsBlobStore;
    use crate::search::MatchField;
    use crate::service::products::ProductsServiceError;
    use crate::test_utils::{create_test_user, setup_test_db};

    async fn catalog() -> (CatalogStore, tempfile::TempDir) {
        let db = setup_test_db().await;
        let user = create_test_user(&db, "Owner").await;
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(FsBlobStore::new(dir.path(), "whizlist://blobs"));
        let store = CatalogStore::new(
            user,
            ProductsService::new(db.clone(), blobs),
            ListsService::new(db.clone()),
            FoldersService::new(db),
        );
        (store, dir)
    }

    fn new_product(title: &str) -> NewProduct {
        NewProduct {
            title: title.to_string(),
            product_url: "https://shop.example/item".to_string(),
            ..Default::default()
        }
    }

    fn count(store: &CatalogStore, id: ListId) -> u64 {
        store
            .lists()
            .iter()
            .find(|v| v.list.id == id)
            .map_or(0, |v| v.product_count)
    }

    #[tokio::test]
    async fn test_add_product_with_selected_lists() {
        let (mut store, _dir) = catalog().await;
        let mut selection = ListSelection::default();
        let gifts = store
            .create_list_and_select(&mut selection, " Gifts ")
            .await
            .unwrap();
        let home = store
            .create_list_and_select(&mut selection, "Home")
            .await
            .unwrap();
        assert!(selection.is_selected(&gifts.id) && selection.is_selected(&home.id));

        let product = store
            .add_product(new_product("Lamp"), selection.selected().clone())
            .await
            .unwrap();

        assert_eq!(store.products().len(), 1);
        assert_eq!(count(&store, gifts.id), 1);
        assert_eq!(count(&store, home.id), 1);
        assert_eq!(
            store.memberships(product.id).await.unwrap(),
            BTreeSet::from([gifts.id, home.id])
        );
    }

    #[tokio::test]
    async fn test_blank_inline_list_is_rejected_without_call() {
        let (mut store, _dir) = catalog().await;
        let mut selection = ListSelection::default();

        let result = store.create_list_and_select(&mut selection, "   ").await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(selection.selected().is_empty());
        assert!(store.lists().is_empty());
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn test_failure_keeps_cache_and_records_error() {
        let (mut store, _dir) = catalog().await;
        store.add_product(new_product("Lamp"), BTreeSet::new()).await.unwrap();

        let result = store.delete_product(ProductId::new()).await;
        assert!(matches!(
            result,
            Err(StoreError::Products(ProductsServiceError::ProductNotFound))
        ));
        assert_eq!(store.products().len(), 1);
        assert_eq!(store.error(), Some("product not found"));

        store.load().await.unwrap();
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn test_assign_and_move_update_counts() {
        let (mut store, _dir) = catalog().await;
        let first = store
            .create_list(NewList {
                name: "First".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = store
            .create_list(NewList {
                name: "Second".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let product = store.add_product(new_product("Lamp"), BTreeSet::new()).await.unwrap();

        store.move_product(product.id, Some(first.id)).await.unwrap();
        assert_eq!(count(&store, first.id), 1);

        let mut selection = ListSelection::new(store.memberships(product.id).await.unwrap());
        selection.toggle(first.id);
        selection.toggle(second.id);
        let changes = store.assign_lists(product.id, &selection).await.unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(count(&store, first.id), 0);
        assert_eq!(count(&store, second.id), 1);
        assert_eq!(store.product(product.id).unwrap().list_id, None);
    }

    #[tokio::test]
    async fn test_folder_delete_moves_lists_to_top_level() {
        let (mut store, _dir) = catalog().await;
        let folder = store
            .create_folder(NewFolder {
                name: "Home".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let list = store
            .create_list(NewList {
                name: "Kitchen".to_string(),
                folder_id: Some(folder.id),
                ..Default::default()
            })
            .await
            .unwrap();

        store.delete_folder(folder.id).await.unwrap();
        assert!(store.folders().is_empty());
        assert_eq!(store.lists()[0].list.folder_id, None);

        store.load().await.unwrap();
        assert_eq!(store.lists()[0].list.id, list.id);
        assert_eq!(store.lists()[0].list.folder_id, None);
    }

    #[tokio::test]
    async fn test_search_over_cache() {
        let (mut store, _dir) = catalog().await;
        store.add_product(new_product("Desk Lamp"), BTreeSet::new()).await.unwrap();
        store
            .create_folder(NewFolder {
                name: "Lamps and lights".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let results = store.search("LAMP");
        assert_eq!(results.products.len(), 1);
        assert_eq!(results.products[0].matched_in, vec![MatchField::Title]);
        assert_eq!(results.folders.len(), 1);
        assert!(store.search("  ").is_empty());
    }
}
