use std::path::{Path, PathBuf};

use iroh::SecretKey;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

use crate::error::CoreError;

static DATA_DIR_NAME: &str = "whizlist";
static DB_NAME: &str = "whizlist.sqlite";
static BLOB_DIR_NAME: &str = "blobs";
static CONFIG_FILE_NAME: &str = "config.json";

// data_dir_path
// |- whizlist
//    |- whizlist.sqlite
//    |- blobs/{user_id}/{product_id}.{ext}
//    |- config.json

fn default_secret_key() -> SecretKey {
    SecretKey::generate(&mut rand::rng())
}

fn default_blob_base_url() -> String {
    "whizlist://blobs".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WhizlistConfig {
    /// Secret key for the local node.
    #[serde(default = "default_secret_key")]
    pub(crate) secret_key: SecretKey,

    /// Secret key for the UI-side client endpoint (separate from the node key).
    #[serde(default = "default_secret_key")]
    pub(crate) client_secret_key: SecretKey,

    pub(crate) database_path: PathBuf,

    /// Root directory of the product image blob store.
    pub(crate) blob_dir: PathBuf,

    /// Prefix of public image URLs handed out by the blob store.
    #[serde(default = "default_blob_base_url")]
    pub(crate) blob_base_url: String,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl WhizlistConfig {
    /// Creates a config with fresh secret keys rooted at `data_dir`.
    fn new(data_dir: &Path) -> Self {
        WhizlistConfig {
            secret_key: default_secret_key(),
            client_secret_key: default_secret_key(),
            database_path: data_dir.join(DB_NAME),
            blob_dir: data_dir.join(BLOB_DIR_NAME),
            blob_base_url: default_blob_base_url(),
            log_filter: default_log_filter(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    pub fn blob_base_url(&self) -> &str {
        &self.blob_base_url
    }
}

/// Gets the existing config from the platform data directory or creates one.
pub async fn get_or_init() -> Result<WhizlistConfig, CoreError> {
    let data_dir = dirs::data_dir().ok_or(CoreError::NoDataDir)?;
    get_or_init_in(&data_dir.join(DATA_DIR_NAME)).await
}

/// Same as [`get_or_init`], rooted at an explicit directory.
pub async fn get_or_init_in(dir: &Path) -> Result<WhizlistConfig, CoreError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(dir).await?;

    if fs::try_exists(&config_path).await? {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: WhizlistConfig = serde_json::from_str(&contents)?;
        Ok(config)
    } else {
        let config = WhizlistConfig::new(dir);

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;
        info!(path = %config_path.display(), "wrote new config");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_config_on_first_run_and_reloads_it() {
        let dir = tempfile::tempdir().unwrap();

        let created = get_or_init_in(dir.path()).await.unwrap();
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(created.database_path, dir.path().join(DB_NAME));
        assert_eq!(created.log_filter, "info");

        let reloaded = get_or_init_in(dir.path()).await.unwrap();
        assert_eq!(reloaded.database_path, created.database_path);
        assert_eq!(reloaded.blob_dir, created.blob_dir);
        assert_eq!(
            reloaded.secret_key.public(),
            created.secret_key.public()
        );
    }

    #[tokio::test]
    async fn missing_optional_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let json = serde_json::json!({
            "database_path": dir.path().join("db.sqlite"),
            "blob_dir": dir.path().join("blobs"),
        });
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), json.to_string()).unwrap();

        let config = get_or_init_in(dir.path()).await.unwrap();
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.blob_base_url, "whizlist://blobs");
    }

    #[tokio::test]
    async fn rejects_corrupt_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").unwrap();

        let result = get_or_init_in(dir.path()).await;
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
