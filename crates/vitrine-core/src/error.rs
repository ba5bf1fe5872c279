use thiserror::Error;

/// Failure taxonomy for catalog operations. Messages are meant for API clients:
/// fixed, human readable, and free of filesystem paths. Details go to the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Asset(String),

    #[error("{0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CatalogError {
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "VALIDATION_FAILED",
            CatalogError::NotFound(_) => "PROJECT_NOT_FOUND",
            CatalogError::Asset(_) => "ASSET_IO_FAILED",
            CatalogError::Store(_) => "STORE_IO_FAILED",
            CatalogError::Config(_) => "INVALID_CONFIG",
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
