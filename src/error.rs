//! Error types for delivery and process setup.

use thiserror::Error;

/// Result alias for process-level operations.
pub type Result<T> = std::result::Result<T, ForwarderError>;

/// Why a single provider failed to deliver an event.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Provider is configured off; no attempt was made.
    #[error("provider {provider} is disabled")]
    Disabled { provider: String },

    /// Breaker refused the attempt; nothing was sent.
    #[error("circuit breaker open for {provider}")]
    CircuitOpen { provider: String },

    /// Destination rejected the request (4xx). Not retried.
    #[error("{provider} rejected event with status {status}: {body}")]
    ClientError { provider: String, status: u16, body: String },

    /// Network, TLS or per-attempt timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx, non-4xx response. Retried.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Every attempt failed with a retryable error.
    #[error("delivery to {provider} failed after {attempts} attempts: {last}")]
    DeliveryExhausted {
        provider: String,
        attempts: usize,
        #[source]
        last: Box<DeliveryError>,
    },

    /// Cancelled before a terminal result was observed.
    #[error("delivery to {provider} cancelled")]
    Cancelled { provider: String },

    /// The request could not be built (bad URL, header or body). Never sent, never retried.
    #[error("invalid request for {provider}: {reason}")]
    InvalidRequest { provider: String, reason: String },

    /// Event could not be encoded into the destination's wire format.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Short stable label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Disabled { .. } => "disabled",
            DeliveryError::CircuitOpen { .. } => "circuit_open",
            DeliveryError::ClientError { .. } => "client_error",
            DeliveryError::Transport(_) => "transport",
            DeliveryError::UnexpectedStatus { .. } => "unexpected_status",
            DeliveryError::DeliveryExhausted { .. } => "delivery_exhausted",
            DeliveryError::Cancelled { .. } => "cancelled",
            DeliveryError::InvalidRequest { .. } => "invalid_request",
            DeliveryError::Encode(_) => "encode",
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, DeliveryError::CircuitOpen { .. })
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, DeliveryError::ClientError { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, DeliveryError::DeliveryExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled { .. })
    }

    /// Whether another attempt could succeed. Only per-attempt failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transport(_) | DeliveryError::UnexpectedStatus { .. })
    }
}

/// Errors that stop the forwarder from starting or serving.
#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn kinds_are_stable() {
        let open = DeliveryError::CircuitOpen { provider: "Honeycomb".into() };
        assert_eq!(open.kind(), "circuit_open");
        assert!(open.is_circuit_open());
        assert!(!open.is_retryable());

        let status = DeliveryError::UnexpectedStatus { status: 503, body: String::new() };
        assert_eq!(status.kind(), "unexpected_status");
        assert!(status.is_retryable());
    }

    #[test]
    fn exhausted_exposes_last_attempt_as_source() {
        let err = DeliveryError::DeliveryExhausted {
            provider: "Honeycomb".into(),
            attempts: 3,
            last: Box::new(DeliveryError::UnexpectedStatus { status: 503, body: "busy".into() }),
        };
        assert!(err.is_exhausted());
        assert_eq!(
            err.to_string(),
            "delivery to Honeycomb failed after 3 attempts: unexpected status 503: busy"
        );
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "unexpected status 503: busy");
    }

    #[test]
    fn client_error_is_terminal() {
        let err = DeliveryError::ClientError {
            provider: "Honeycomb".into(),
            status: 404,
            body: "not found".into(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Honeycomb rejected event with status 404: not found");
    }

    #[test]
    fn invalid_request_is_terminal() {
        let err = DeliveryError::InvalidRequest {
            provider: "Honeycomb".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(err.kind(), "invalid_request");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "invalid request for Honeycomb: relative URL without a base");
    }

    #[test]
    fn config_error_display() {
        let err = ForwarderError::Config("HTTP_API_PORT must be a port number".into());
        assert_eq!(err.to_string(), "configuration error: HTTP_API_PORT must be a port number");
    }
}
