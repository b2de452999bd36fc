use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Unknown method: {0}")]
    MethodNotFound(String),

    #[error("No worker registered for url: {0}")]
    WorkerNotFound(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("Invalid params for {method}: {message}")]
    InvalidParams { method: String, message: String },

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    /// Error string carried back in a Response.
    #[error("{0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Lookup failures: an unknown method name or an unregistered worker url.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            BridgeError::MethodNotFound(_) | BridgeError::WorkerNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
