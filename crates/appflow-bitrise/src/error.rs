//! Bitrise provider error types

use thiserror::Error;

/// Remote call a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    Finalize,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Register => write!(f, "register"),
            Operation::Finalize => write!(f, "finalize"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BitriseError {
    #[error("Failed to encode request body: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected {operation} response (HTTP {http_status}): {source}")]
    Decode {
        operation: Operation,
        http_status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid app slug {0:?}: expected 1-128 ASCII letters, digits, '-' or '_'")]
    InvalidHandle(String),

    #[error("Invalid app spec: {0}")]
    InvalidSpec(String),

    #[error("{operation} rejected by Bitrise (HTTP {http_status}, status {status:?})")]
    Rejected {
        operation: Operation,
        http_status: u16,
        status: String,
    },

    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(Operation),

    #[error("Finalize failed after register succeeded, handle={handle}: {source}")]
    FinalizeAfterRegister {
        handle: String,
        #[source]
        source: Box<BitriseError>,
    },

    #[error("Missing API token. Set {0} or bitrise.api_token in the settings file")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] appflow_config::ConfigError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] appflow_cloud::CloudError),
}

impl BitriseError {
    /// Whether the error came from the transport layer (DNS, connect, timeout)
    pub fn is_network(&self) -> bool {
        matches!(self, BitriseError::Network(_))
    }

    /// Whether a retry could plausibly succeed without changing the spec
    pub fn is_transient(&self) -> bool {
        match self {
            BitriseError::Network(_) | BitriseError::DeadlineExceeded(_) => true,
            BitriseError::FinalizeAfterRegister { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BitriseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BitriseError::DeadlineExceeded(Operation::Register).is_transient());
        assert!(!BitriseError::InvalidSpec("stack_id must not be empty".into()).is_transient());

        let partial = BitriseError::FinalizeAfterRegister {
            handle: "abc123".to_string(),
            source: Box::new(BitriseError::DeadlineExceeded(Operation::Finalize)),
        };
        assert!(partial.is_transient());
        assert!(!partial.is_network());
        assert!(partial.to_string().contains("handle=abc123"));
    }
}
