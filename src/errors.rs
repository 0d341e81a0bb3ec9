use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    NotVisible(String),

    #[error("{0}")]
    StillVisible(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    LocationMismatch(String),

    #[error("{0}")]
    WindowNotFound(String),

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Wait condition raised while polling: {0}")]
    ConditionError(#[source] Box<PageError>),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Driver error: {0}")]
    DriverError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, PageError>;

// Convert anyhow::Error to PageError
impl From<anyhow::Error> for PageError {
    fn from(err: anyhow::Error) -> Self {
        PageError::AnyhowError(err.to_string())
    }
}
