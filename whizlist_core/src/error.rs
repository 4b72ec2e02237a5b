use thiserror::Error;

/// Failures while starting or configuring the core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to find a data directory on this platform")]
    NoDataDir,

    #[error("config file i/o failed")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid json")]
    Config(#[from] serde_json::Error),

    #[error("data store unavailable")]
    Db(#[from] sea_orm::DbErr),

    #[error("rpc transport failed: {0}")]
    Transport(String),
}
