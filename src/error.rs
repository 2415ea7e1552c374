//! Error types for the catalog tier

use hyper::StatusCode;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving catalog and order traffic
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Unknown entity id
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: u64 },

    /// Purchase or decrement on an item with no stock left
    #[error("Item {item_id} is out of stock")]
    StockExhausted { item_id: u64 },

    /// Selected backend endpoint failed to respond
    #[error("Upstream {endpoint} unavailable: {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    /// Malformed request input
    #[error("Validation error: {0}")]
    Validation(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an unknown item.
    pub fn item_not_found(id: u64) -> Self {
        Error::NotFound { entity: "Item", id }
    }

    /// Shorthand for an unknown catalog.
    pub fn catalog_not_found(id: u64) -> Self {
        Error::NotFound {
            entity: "Catalog",
            id,
        }
    }

    /// Wrap a transport failure against a backend endpoint.
    pub fn upstream(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::UpstreamUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status used when this error is returned to a caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::StockExhausted { .. } => StatusCode::FORBIDDEN,
            Error::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Error::Validation(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable error kind, used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::StockExhausted { .. } => "stock_exhausted",
            Error::UpstreamUnavailable { .. } => "upstream_unavailable",
            Error::Validation(_) => "validation",
            Error::Serialization(_) => "bad_payload",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}
