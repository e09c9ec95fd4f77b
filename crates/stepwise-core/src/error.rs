use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepwiseError {
    // Service client errors
    #[error("Transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Remote error from {url}: HTTP {status}: {body}")]
    Remote {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    // Readiness errors
    #[error("Dependency unavailable: {target} not ready after {attempts} attempts ({last_error})")]
    Unavailable {
        target: String,
        attempts: u32,
        last_error: String,
    },

    // Graph errors
    #[error("Node not found in graph: {0}")]
    NodeNotFound(String),

    #[error("Graph error: {0}")]
    Graph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StepwiseError {
    /// Whether the error came from talking to a remote service
    /// (as opposed to graph wiring or configuration).
    pub fn is_service_error(&self) -> bool {
        matches!(
            self,
            StepwiseError::Transport { .. }
                | StepwiseError::Remote { .. }
                | StepwiseError::MalformedResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StepwiseError>;
