use thiserror::Error;

/// Error codes the remote service uses to reject calls for lack of access
const PERMISSION_CODES: &[&str] = &["UnauthorizedOperation", "AccessDeniedException"];

/// Error types for calls against the migration service
#[derive(Error, Debug)]
pub enum ClientError {
    /// The service could not be reached
    #[error("Failed to connect to migration service: {0}")]
    Connection(String),

    /// Error during HTTP communication
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service rejected the call
    #[error("{}", describe_api_error(.code, .message))]
    Api { code: String, message: String },

    /// The service answered with a shape we do not understand
    #[error("Unexpected response from migration service: {0}")]
    UnexpectedResponse(String),

    /// A request or response body could not be (de)serialized
    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn describe_api_error(code: &str, message: &str) -> String {
    if PERMISSION_CODES.contains(&code) {
        format!("Insufficient permissions. Ensure your credentials have migration service access ({code}: {message})")
    } else {
        format!("Migration service error {code}: {message}")
    }
}

impl ClientError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The message as the remote service phrased it, for per-server
    /// reporting. Non-API errors fall back to their display text.
    pub fn remote_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_permission_error(&self) -> bool {
        matches!(self, ClientError::Api { code, .. } if PERMISSION_CODES.contains(&code.as_str()))
    }
}

/// Why a single raw record could not be reconciled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing sourceServerID")]
    MissingId,
}
