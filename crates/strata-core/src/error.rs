//! Error taxonomy shared by every DAO, connector and driver.
//!
//! Every failure is either a *business* error (the caller asked for
//! something unsupported or malformed) or a *technical* error (the backend
//! or the framework misbehaved). Both carry a stable [`ErrorKey`] that outer
//! layers map to status codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable short identifiers carried by every [`DaoError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKey {
    NotSupported,
    NotImplemented,
    InvalidParameter,
    MissingField,
    NodeNotFound,
    EdgeNotFound,
    CreationFailed,
    WriteForbidden,
    UnknownVendor,
    NotConnected,
    GraphUnreachable,
    IndexUnreachable,
    GraphRequestError,
    IndexRequestError,
    UnexpectedResponse,
    /// The backend needs a manual change before it can be used
    SourceActionNeeded,
    /// An indexed value did not fit the index mapping
    IndexMappingError,
    Critical,
    Bug,
}

impl ErrorKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKey::NotSupported => "not_supported",
            ErrorKey::NotImplemented => "not_implemented",
            ErrorKey::InvalidParameter => "invalid_parameter",
            ErrorKey::MissingField => "missing_field",
            ErrorKey::NodeNotFound => "node_not_found",
            ErrorKey::EdgeNotFound => "edge_not_found",
            ErrorKey::CreationFailed => "creation_failed",
            ErrorKey::WriteForbidden => "write_forbidden",
            ErrorKey::UnknownVendor => "unknown_vendor",
            ErrorKey::NotConnected => "not_connected",
            ErrorKey::GraphUnreachable => "graph_unreachable",
            ErrorKey::IndexUnreachable => "index_unreachable",
            ErrorKey::GraphRequestError => "graph_request_error",
            ErrorKey::IndexRequestError => "index_request_error",
            ErrorKey::UnexpectedResponse => "unexpected_response",
            ErrorKey::SourceActionNeeded => "source_action_needed",
            ErrorKey::IndexMappingError => "index_mapping_error",
            ErrorKey::Critical => "critical",
            ErrorKey::Bug => "bug",
        }
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced by the DAO layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaoError {
    /// Caller's fault: unsupported feature, bad parameter, missing item
    #[error("{message} ({key})")]
    Business { key: ErrorKey, message: String },

    /// Backend or framework fault: unreachable, malformed response, bug
    #[error("{message} ({key})")]
    Technical { key: ErrorKey, message: String },
}

impl DaoError {
    pub fn business(key: ErrorKey, message: impl Into<String>) -> Self {
        DaoError::Business {
            key,
            message: message.into(),
        }
    }

    pub fn technical(key: ErrorKey, message: impl Into<String>) -> Self {
        DaoError::Technical {
            key,
            message: message.into(),
        }
    }

    /// Shorthand for a business `not_supported` error
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::business(ErrorKey::NotSupported, message)
    }

    /// Shorthand for a business `invalid_parameter` error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::business(ErrorKey::InvalidParameter, message)
    }

    /// Shorthand for a business `missing_field` error
    pub fn missing_field(message: impl Into<String>) -> Self {
        Self::business(ErrorKey::MissingField, message)
    }

    /// Returned by driver operations a vendor does not provide
    pub fn not_implemented(operation: &str) -> Self {
        Self::business(
            ErrorKey::NotImplemented,
            format!("\"{operation}\" is not implemented by this driver"),
        )
    }

    /// Shorthand for a technical `bug` error
    pub fn bug(message: impl Into<String>) -> Self {
        Self::technical(ErrorKey::Bug, message)
    }

    pub fn key(&self) -> ErrorKey {
        match self {
            DaoError::Business { key, .. } | DaoError::Technical { key, .. } => *key,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DaoError::Business { message, .. } | DaoError::Technical { message, .. } => message,
        }
    }

    pub fn is_business(&self) -> bool {
        matches!(self, DaoError::Business { .. })
    }

    pub fn is_technical(&self) -> bool {
        matches!(self, DaoError::Technical { .. })
    }

    /// True when the key matches, regardless of kind
    pub fn has_key(&self, key: ErrorKey) -> bool {
        self.key() == key
    }
}

impl From<serde_json::Error> for DaoError {
    fn from(e: serde_json::Error) -> Self {
        DaoError::technical(
            ErrorKey::UnexpectedResponse,
            format!("Malformed payload: {e}"),
        )
    }
}

/// Result type alias for DAO operations
pub type Result<T> = std::result::Result<T, DaoError>;
