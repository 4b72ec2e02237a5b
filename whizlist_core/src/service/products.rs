use std::{collections::BTreeSet, sync::Arc};

use futures::future::{join, join_all};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    DatabaseConnection,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zel_core::prelude::*;

use crate::{
    assignment::ListChanges,
    blob::{self, BlobStore},
    entity::prelude::*,
    extraction::{ContentExtractor, ExtractedContent, ExtractionTier},
    ids::{ListId, ProductId, UserId},
};

#[derive(Debug, Error)]
pub enum ProductsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("product not found")]
    ProductNotFound,

    #[error("list not found")]
    ListNotFound,

    #[error("product title must not be empty")]
    EmptyTitle,

    #[error("product url must not be empty")]
    EmptyUrl,

    #[error("unauthorized: not the owner")]
    Unauthorized,
}

impl From<ProductsServiceError> for ResourceError {
    fn from(error: ProductsServiceError) -> Self {
        match error {
            ProductsServiceError::DbError(error) => ResourceError::infra(error),
            ProductsServiceError::ProductNotFound => ResourceError::app(error),
            ProductsServiceError::ListNotFound => ResourceError::app(error),
            ProductsServiceError::EmptyTitle => ResourceError::app(error),
            ProductsServiceError::EmptyUrl => ResourceError::app(error),
            ProductsServiceError::Unauthorized => ResourceError::app(error),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: Option<String>,
    pub image_url: Option<String>,
    pub product_url: String,
    pub tags: Vec<String>,
    pub list_id: Option<ListId>,
}

/// Partial product update; `None` leaves a field alone.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub product_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Fallback title for a product saved from `url`: its hostname, else the url.
fn title_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_string())
}

#[derive(Clone)]
pub struct ProductsService {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
}

impl ProductsService {
    pub fn new(db: DatabaseConnection, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    pub async fn _create_product(
        &self,
        owner_id: UserId,
        product: NewProduct,
    ) -> Result<ProductModel, ProductsServiceError> {
        let title = product.title.trim().to_string();
        if title.is_empty() {
            return Err(ProductsServiceError::EmptyTitle);
        }
        let product_url = product.product_url.trim().to_string();
        if product_url.is_empty() {
            return Err(ProductsServiceError::EmptyUrl);
        }
        if let Some(list_id) = product.list_id {
            self.ensure_list(list_id, owner_id).await?;
        }

        let now = chrono::Utc::now();
        let product = ProductActiveModel {
            id: Set(ProductId::new()),
            owner_id: Set(owner_id),
            title: Set(title),
            description: Set(product.description),
            price: Set(product.price),
            image_url: Set(product.image_url),
            product_url: Set(product_url),
            is_pinned: Set(false),
            tags: Set(product.tags.into()),
            list_id: Set(product.list_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = Product::insert(product)
            .exec_with_returning(&self.db)
            .await?;
        debug!(product_id = %product.id, "created product");
        Ok(product)
    }

    pub async fn _get_product(&self, id: ProductId) -> Result<ProductModel, ProductsServiceError> {
        Product::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ProductsServiceError::ProductNotFound)
    }

    pub async fn _list_products(
        &self,
        owner_id: UserId,
    ) -> Result<Vec<ProductModel>, ProductsServiceError> {
        let products = Product::find()
            .filter(ProductColumn::OwnerId.eq(owner_id))
            .order_by_desc(ProductColumn::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(products)
    }

    pub async fn _update_product(
        &self,
        id: ProductId,
        owner_id: UserId,
        patch: ProductPatch,
    ) -> Result<ProductModel, ProductsServiceError> {
        let product = self.owned(id, owner_id).await?;

        let mut active: ProductActiveModel = product.into();
        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(ProductsServiceError::EmptyTitle);
            }
            active.title = Set(title);
        }
        if let Some(product_url) = patch.product_url {
            let product_url = product_url.trim().to_string();
            if product_url.is_empty() {
                return Err(ProductsServiceError::EmptyUrl);
            }
            active.product_url = Set(product_url);
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(price) = patch.price {
            active.price = Set(price);
        }
        if let Some(image_url) = patch.image_url {
            active.image_url = Set(image_url);
        }
        if let Some(tags) = patch.tags {
            active.tags = Set(tags.into());
        }
        active.updated_at = Set(chrono::Utc::now());

        Ok(active.update(&self.db).await?)
    }

    pub async fn _set_pinned(
        &self,
        id: ProductId,
        owner_id: UserId,
        is_pinned: bool,
    ) -> Result<ProductModel, ProductsServiceError> {
        let product = self.owned(id, owner_id).await?;

        let mut active: ProductActiveModel = product.into();
        active.is_pinned = Set(is_pinned);
        active.updated_at = Set(chrono::Utc::now());

        Ok(active.update(&self.db).await?)
    }

    /// Deletes a product. Its comments and extra memberships cascade.
    pub async fn _delete_product(
        &self,
        id: ProductId,
        owner_id: UserId,
    ) -> Result<(), ProductsServiceError> {
        self.owned(id, owner_id).await?;
        Product::delete_by_id(id).exec(&self.db).await?;
        debug!(product_id = %id, "deleted product");
        Ok(())
    }

    /// Sets the primary list of a product; `None` unassigns it.
    pub async fn _move_product(
        &self,
        id: ProductId,
        owner_id: UserId,
        list_id: Option<ListId>,
    ) -> Result<ProductModel, ProductsServiceError> {
        let product = self.owned(id, owner_id).await?;
        if let Some(list_id) = list_id {
            self.ensure_list(list_id, owner_id).await?;
        }

        let mut active: ProductActiveModel = product.into();
        active.list_id = Set(list_id);
        active.updated_at = Set(chrono::Utc::now());

        let product = active.update(&self.db).await?;
        debug!(product_id = %id, list_id = ?list_id, "moved product");
        Ok(product)
    }

    /// Duplicates a product into `target`. The copy is never pinned.
    ///
    /// An image held in the blob store is duplicated under the new id; if that
    /// fails the copy keeps pointing at the source image.
    pub async fn _copy_product(
        &self,
        id: ProductId,
        owner_id: UserId,
        target: ListId,
    ) -> Result<ProductModel, ProductsServiceError> {
        let source = self.owned(id, owner_id).await?;
        self.ensure_list(target, owner_id).await?;

        let new_id = ProductId::new();
        let image_url = match source.image_url.as_deref() {
            Some(url) => self
                .copy_image(url, source.owner_id, new_id)
                .await
                .or_else(|| source.image_url.clone()),
            None => None,
        };

        let now = chrono::Utc::now();
        let copy = ProductActiveModel {
            id: Set(new_id),
            owner_id: Set(source.owner_id),
            title: Set(source.title),
            description: Set(source.description),
            price: Set(source.price),
            image_url: Set(image_url),
            product_url: Set(source.product_url),
            is_pinned: Set(false),
            tags: Set(source.tags),
            list_id: Set(Some(target)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let copy = Product::insert(copy).exec_with_returning(&self.db).await?;
        debug!(source_id = %id, product_id = %copy.id, "copied product");
        Ok(copy)
    }

    async fn copy_image(&self, url: &str, owner_id: UserId, new_id: ProductId) -> Option<String> {
        let from = self.blobs.path_for_url(url)?;
        let to = blob::image_path(owner_id, new_id, blob::extension(&from));

        match self.blobs.copy(&from, &to).await {
            Ok(()) => Some(self.blobs.public_url(&to)),
            Err(error) => {
                warn!(%error, %from, %to, "failed to copy product image");
                None
            }
        }
    }

    /// Every list the product belongs to: its primary list plus extra memberships.
    pub async fn _memberships(
        &self,
        id: ProductId,
    ) -> Result<BTreeSet<ListId>, ProductsServiceError> {
        let product = self._get_product(id).await?;
        self.memberships_of(&product).await
    }

    async fn memberships_of(
        &self,
        product: &ProductModel,
    ) -> Result<BTreeSet<ListId>, ProductsServiceError> {
        let extra: Vec<ListId> = ProductList::find()
            .select_only()
            .column(ProductListColumn::ListId)
            .filter(ProductListColumn::ProductId.eq(product.id))
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(product.list_id.into_iter().chain(extra).collect())
    }

    pub async fn _add_to_list(
        &self,
        id: ProductId,
        owner_id: UserId,
        list_id: ListId,
    ) -> Result<(), ProductsServiceError> {
        let product = self.owned(id, owner_id).await?;
        self.ensure_list(list_id, owner_id).await?;
        self.add_membership(&product, list_id).await
    }

    pub async fn _remove_from_list(
        &self,
        id: ProductId,
        owner_id: UserId,
        list_id: ListId,
    ) -> Result<(), ProductsServiceError> {
        let product = self.owned(id, owner_id).await?;
        self.remove_membership(&product, list_id).await
    }

    async fn add_membership(
        &self,
        product: &ProductModel,
        list_id: ListId,
    ) -> Result<(), ProductsServiceError> {
        if product.list_id == Some(list_id) {
            return Ok(());
        }

        let row = ProductListActiveModel {
            product_id: Set(product.id),
            list_id: Set(list_id),
            created_at: Set(chrono::Utc::now()),
        };
        ProductList::insert(row)
            .on_conflict(
                OnConflict::columns([ProductListColumn::ProductId, ProductListColumn::ListId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn remove_membership(
        &self,
        product: &ProductModel,
        list_id: ListId,
    ) -> Result<(), ProductsServiceError> {
        ProductList::delete_many()
            .filter(ProductListColumn::ProductId.eq(product.id))
            .filter(ProductListColumn::ListId.eq(list_id))
            .exec(&self.db)
            .await?;

        if product.list_id == Some(list_id) {
            Product::update_many()
                .col_expr(ProductColumn::ListId, Expr::value(Option::<ListId>::None))
                .col_expr(ProductColumn::UpdatedAt, Expr::value(chrono::Utc::now()))
                .filter(ProductColumn::Id.eq(product.id))
                .filter(ProductColumn::ListId.eq(list_id))
                .exec(&self.db)
                .await?;
        }
        Ok(())
    }

    /// Brings the product's memberships in line with `selected`.
    ///
    /// All additions and removals run concurrently and each one runs to
    /// completion. The first failure (removals before additions) is returned;
    /// the calls that succeeded stay applied.
    pub async fn _reconcile_lists(
        &self,
        id: ProductId,
        owner_id: UserId,
        selected: BTreeSet<ListId>,
    ) -> Result<ListChanges, ProductsServiceError> {
        let product = self.owned(id, owner_id).await?;
        let current = self.memberships_of(&product).await?;
        let changes = ListChanges::diff(&current, &selected);
        if changes.is_empty() {
            return Ok(changes);
        }

        let product = &product;
        let removals = changes
            .to_remove
            .iter()
            .map(|&list_id| self.remove_membership(product, list_id));
        let additions = changes.to_add.iter().map(|&list_id| async move {
            self.ensure_list(list_id, owner_id).await?;
            self.add_membership(product, list_id).await
        });
        let (removed, added) = join(join_all(removals), join_all(additions)).await;
        if let Some(error) = removed.into_iter().chain(added).find_map(Result::err) {
            warn!(%error, product_id = %id, "list reconciliation partially failed");
            return Err(error);
        }

        debug!(
            product_id = %id,
            added = changes.to_add.len(),
            removed = changes.to_remove.len(),
            "reconciled product lists"
        );
        Ok(changes)
    }

    /// Saves a product from its url.
    ///
    /// The fast extraction tier fills the initial row; the deep tier runs in
    /// the background and patches the product when it finishes.
    pub async fn create_from_url(
        &self,
        owner_id: UserId,
        url: &str,
        lists: BTreeSet<ListId>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Result<(ProductModel, JoinHandle<()>), ProductsServiceError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ProductsServiceError::EmptyUrl);
        }

        let fast = match extractor.extract(url, ExtractionTier::Fast).await {
            Ok(content) => content.normalized(),
            Err(error) => {
                warn!(%error, url, "fast extraction failed");
                ExtractedContent::default()
            }
        };

        let product = self
            ._create_product(
                owner_id,
                NewProduct {
                    title: fast.title.unwrap_or_else(|| title_from_url(url)),
                    description: fast.description.unwrap_or_default(),
                    price: fast.price,
                    image_url: fast.image_url,
                    product_url: url.to_string(),
                    ..Default::default()
                },
            )
            .await?;

        self._reconcile_lists(product.id, owner_id, lists).await?;
        let product = self._get_product(product.id).await?;

        let service = self.clone();
        let product_id = product.id;
        let url = url.to_string();
        let enhancement = tokio::spawn(async move {
            let content = match extractor.extract(&url, ExtractionTier::Deep).await {
                Ok(content) => content.normalized(),
                Err(error) => {
                    warn!(%error, %product_id, "deep extraction failed");
                    return;
                }
            };
            if content.is_empty() {
                return;
            }
            if let Err(error) = service.apply_extracted(product_id, content).await {
                warn!(%error, %product_id, "failed to apply deep extraction");
            }
        });

        Ok((product, enhancement))
    }

    async fn apply_extracted(
        &self,
        id: ProductId,
        content: ExtractedContent,
    ) -> Result<ProductModel, ProductsServiceError> {
        let product = self._get_product(id).await?;

        let mut active: ProductActiveModel = product.into();
        if let Some(title) = content.title {
            active.title = Set(title);
        }
        if let Some(description) = content.description {
            active.description = Set(description);
        }
        if content.price.is_some() {
            active.price = Set(content.price);
        }
        if content.image_url.is_some() {
            active.image_url = Set(content.image_url);
        }
        active.updated_at = Set(chrono::Utc::now());

        let product = active.update(&self.db).await?;
        debug!(product_id = %id, "applied deep extraction");
        Ok(product)
    }

    async fn owned(
        &self,
        id: ProductId,
        owner_id: UserId,
    ) -> Result<ProductModel, ProductsServiceError> {
        let product = self._get_product(id).await?;
        if product.owner_id != owner_id {
            return Err(ProductsServiceError::Unauthorized);
        }
        Ok(product)
    }

    /// Checks that `list_id` exists and belongs to `owner_id`.
    async fn ensure_list(
        &self,
        list_id: ListId,
        owner_id: UserId,
    ) -> Result<(), ProductsServiceError> {
        let list = List::find_by_id(list_id)
            .one(&self.db)
            .await?
            .ok_or(ProductsServiceError::ListNotFound)?;
        if list.owner_id != owner_id {
            return Err(ProductsServiceError::Unauthorized);
        }
        Ok(())
    }
}

#[zel_service(name = "products")]
trait Products {
    #[method(name = "create_product")]
    async fn create_product(
        &self,
        owner_id: UserId,
        product: NewProduct,
    ) -> Result<ProductModel, ResourceError>;

    #[method(name = "get_product")]
    async fn get_product(&self, id: ProductId) -> Result<ProductModel, ResourceError>;

    #[method(name = "list_products")]
    async fn list_products(&self, owner_id: UserId) -> Result<Vec<ProductModel>, ResourceError>;

    #[method(name = "update_product")]
    async fn update_product(
        &self,
        id: ProductId,
        owner_id: UserId,
        patch: ProductPatch,
    ) -> Result<ProductModel, ResourceError>;

    #[method(name = "set_pinned")]
    async fn set_pinned(
        &self,
        id: ProductId,
        owner_id: UserId,
        is_pinned: bool,
    ) -> Result<ProductModel, ResourceError>;

    #[method(name = "delete_product")]
    async fn delete_product(&self, id: ProductId, owner_id: UserId) -> Result<(), ResourceError>;

    #[method(name = "move_product")]
    async fn move_product(
        &self,
        id: ProductId,
        owner_id: UserId,
        list_id: Option<ListId>,
    ) -> Result<ProductModel, ResourceError>;

    #[method(name = "copy_product")]
    async fn copy_product(
        &self,
        id: ProductId,
        owner_id: UserId,
        target: ListId,
    ) -> Result<ProductModel, ResourceError>;

    #[method(name = "memberships")]
    async fn memberships(&self, id: ProductId) -> Result<BTreeSet<ListId>, ResourceError>;

    #[method(name = "reconcile_lists")]
    async fn reconcile_lists(
        &self,
        id: ProductId,
        owner_id: UserId,
        selected: BTreeSet<ListId>,
    ) -> Result<ListChanges, ResourceError>;
}

#[async_trait]
impl ProductsServer for ProductsService {
    async fn create_product(
        &self,
        _ctx: RequestContext,
        owner_id: UserId,
        product: NewProduct,
    ) -> Result<ProductModel, ResourceError> {
        Ok(self._create_product(owner_id, product).await?)
    }

    async fn get_product(
        &self,
        _ctx: RequestContext,
        id: ProductId,
    ) -> Result<ProductModel, ResourceError> {
        Ok(self._get_product(id).await?)
    }

    async fn list_products(
        &self,
        _ctx: RequestContext,
        owner_id: UserId,
    ) -> Result<Vec<ProductModel>, ResourceError> {
        Ok(self._list_products(owner_id).await?)
    }

    async fn update_product(
        &self,
        _ctx: RequestContext,
        id: ProductId,
        owner_id: UserId,
        patch: ProductPatch,
    ) -> Result<ProductModel, ResourceError> {
        Ok(self._update_product(id, owner_id, patch).await?)
    }

    async fn set_pinned(
        &self,
        _ctx: RequestContext,
        id: ProductId,
        owner_id: UserId,
        is_pinned: bool,
    ) -> Result<ProductModel, ResourceError> {
        Ok(self._set_pinned(id, owner_id, is_pinned).await?)
    }

    async fn delete_product(
        &self,
        _ctx: RequestContext,
        id: ProductId,
        owner_id: UserId,
    ) -> Result<(), ResourceError> {
        Ok(self._delete_product(id, owner_id).await?)
    }

    async fn move_product(
        &self,
        _ctx: RequestContext,
        id: ProductId,
        owner_id: UserId,
        list_id: Option<ListId>,
    ) -> Result<ProductModel, ResourceError> {
        Ok(self._move_product(id, owner_id, list_id).await?)
    }

    async fn copy_product(
        &self,
        _ctx: RequestContext,
        id: ProductId,
        owner_id: UserId,
        target: ListId,
    ) -> Result<ProductModel, ResourceError> {
        Ok(self._copy_product(id, owner_id, target).await?)
    }

    async fn memberships(
        &self,
        _ctx: RequestContext,
        id: ProductId,
    ) -> Result<BTreeSet<ListId>, ResourceError> {
        Ok(self._memberships(id).await?)
    }

    async fn reconcile_lists(
        &self,
        _ctx: RequestContext,
        id: ProductId,
        owner_id: UserId,
        selected: BTreeSet<ListId>,
    ) -> Result<ListChanges, ResourceError> {
        Ok(self._reconcile_lists(id, owner_id, selected).await?)
    }
}
