use thiserror::Error;

#[derive(Error, Debug)]
pub enum CILensError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provider type '{0}' is not registered")]
    UnregisteredProvider(String),

    #[error("Invalid configuration for provider '{provider}': {}", errors.join(", "))]
    InvalidConfig {
        provider: String,
        errors: Vec<String>,
    },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Webhook payload could not be processed: {0}")]
    WebhookPayload(String),
}

impl CILensError {
    /// Failures caused by the remote system or the network, as opposed to setup mistakes.
    /// A scheduler may retry these.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Api { .. })
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == 401 || *status == 403)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, CILensError>;
