use std::{fmt::Display, sync::Arc, time::Duration};

use iroh::{endpoint::Connection, Endpoint};
use tracing::info;
use zel_core::{prelude::RpcServerBuilder, protocol::RpcClient, IrohBundle};

use crate::{
    blob::{BlobStore, FsBlobStore},
    config::WhizlistConfig,
    error::CoreError,
    ids::UserId,
    service::{
        comments::{CommentsClient, CommentsServer, CommentsService},
        folders::{FoldersClient, FoldersServer, FoldersService},
        lists::{ListsClient, ListsServer, ListsService},
        products::{ProductsClient, ProductsServer, ProductsService},
        profiles::{ProfilesClient, ProfilesServer, ProfilesService},
    },
    store::{CatalogStore, CommentStore, Session},
};

pub mod assignment;
pub mod blob;
pub mod config;
pub mod entity;
pub mod error;
pub mod extraction;
pub mod ids;
pub mod models;
pub mod search;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod thread;

#[cfg(test)]
mod test_utils;

static ALPN: &[u8] = b"whizlist::0.1.0";

fn transport(error: impl Display) -> CoreError {
    CoreError::Transport(error.to_string())
}

async fn rpc_client(conn: &Connection) -> Result<RpcClient, CoreError> {
    RpcClient::new(conn.clone()).await.map_err(transport)
}

/// Main runtime handle for Whizlist.
///
/// Owns the database, the RPC server and a local client connected to it.
/// Nothing is global: start one, hand out sessions, shut it down.
pub struct WhizlistCore {
    pub config: WhizlistConfig,

    /// Server bundle that accepts inbound RPC traffic.
    pub server: IrohBundle,

    /// Client-side endpoint connected to the local server.
    pub client_endpoint: Endpoint,

    /// Typed clients for the local server.
    pub profiles: ProfilesClient,
    pub folders: FoldersClient,
    pub lists: ListsClient,
    pub products: ProductsClient,
    pub comments: CommentsClient,

    products_service: ProductsService,
    lists_service: ListsService,
    folders_service: FoldersService,
    comments_service: CommentsService,
}

impl WhizlistCore {
    /// Starts with the config from the platform data directory.
    pub async fn start_default() -> Result<Self, CoreError> {
        let config = config::get_or_init().await?;
        Self::start(config).await
    }

    pub async fn start(config: WhizlistConfig) -> Result<Self, CoreError> {
        telemetry::init_tracing(&config.log_filter);
        info!(database = %config.database_path().display(), "starting whizlist core");

        // ----------------
        // Server endpoint
        // ----------------
        let mut server_builder = IrohBundle::builder(Some(config.secret_key.clone()))
            .await
            .map_err(transport)?;
        let server_endpoint = server_builder.endpoint().clone();

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
            config.blob_dir(),
            config.blob_base_url(),
        ));

        let profiles_service = ProfilesService::new(db.clone());
        let folders_service = FoldersService::new(db.clone());
        let lists_service = ListsService::new(db.clone());
        let products_service = ProductsService::new(db.clone(), blobs);
        let comments_service = CommentsService::new(db);

        // Register RPC servers
        let rpc_server_builder = RpcServerBuilder::new(ALPN, server_endpoint.clone());
        let rpc_server_builder = profiles_service.register_service(rpc_server_builder);
        let rpc_server_builder = folders_service.clone().register_service(rpc_server_builder);
        let rpc_server_builder = lists_service.clone().register_service(rpc_server_builder);
        let rpc_server_builder = products_service.clone().register_service(rpc_server_builder);
        let rpc_server_builder = comments_service.clone().register_service(rpc_server_builder);
        let rpc_server = rpc_server_builder.build();

        let server = server_builder.accept(ALPN, rpc_server).finish().await;
        server.wait_online().await;

        // ----------------
        // Client endpoint
        // ----------------
        let client_endpoint = Endpoint::builder()
            .secret_key(config.client_secret_key.clone())
            .alpns(vec![ALPN.to_vec()])
            .bind()
            .await
            .map_err(transport)?;

        client_endpoint.online().await;

        // Connect client endpoint -> server endpoint
        let conn = client_endpoint
            .connect(server.endpoint.addr(), ALPN)
            .await
            .map_err(transport)?;

        let profiles = ProfilesClient::new(rpc_client(&conn).await?);
        let folders = FoldersClient::new(rpc_client(&conn).await?);
        let lists = ListsClient::new(rpc_client(&conn).await?);
        let products = ProductsClient::new(rpc_client(&conn).await?);
        let comments = CommentsClient::new(rpc_client(&conn).await?);

        if profiles.list_profiles().await.map_err(transport)?.is_empty() {
            let profile = profiles
                .create_profile("Default".to_string(), None)
                .await
                .map_err(transport)?;
            info!(profile_id = %profile.id, "created default profile");
        }

        info!("whizlist core online");
        Ok(Self {
            config,
            server,
            client_endpoint,
            profiles,
            folders,
            lists,
            products,
            comments,
            products_service,
            lists_service,
            folders_service,
            comments_service,
        })
    }

    /// Opens a session for `user`. Dropping it signs the user out.
    pub fn session(&self, user: UserId) -> Session {
        let catalog = CatalogStore::new(
            user,
            self.products_service.clone(),
            self.lists_service.clone(),
            self.folders_service.clone(),
        );
        let comments = CommentStore::new(self.comments_service.clone(), user);
        Session::new(user, catalog, comments)
    }

    pub async fn shutdown(self) -> Result<(), CoreError> {
        // Close client endpoint
        self.client_endpoint.close().await;

        // Shutdown server bundle
        self.server
            .shutdown(Duration::from_secs(5))
            .await
            .map_err(transport)?;
        info!("whizlist core stopped");
        Ok(())
    }
}

pub mod prelude {
    pub use super::assignment::{ListChanges, ListSelection};
    pub use super::entity;
    pub use super::ids;
    pub use super::models;
    pub use super::search::{search, SearchResults};
    pub use super::service;
    pub use super::store::{CatalogStore, CommentStore, Session, StoreError};
    pub use super::thread::{CommentRecord, ThreadedComment, MAX_NESTING_DEPTH};

    pub use super::config;
    pub use super::error;
    pub use super::WhizlistCore;

    pub use zel_core;
}
