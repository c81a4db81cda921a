use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notification queue error: {0}")]
    Queue(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<object_store::Error> for SiteError {
    fn from(err: object_store::Error) -> Self {
        SiteError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SiteError {
    fn from(err: serde_json::Error) -> Self {
        SiteError::Parsing(err.to_string())
    }
}

impl From<std::io::Error> for SiteError {
    fn from(err: std::io::Error) -> Self {
        SiteError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for SiteError {
    fn from(err: rusqlite::Error) -> Self {
        SiteError::Storage(err.to_string())
    }
}
