//! Error types for the coremodel bridge
//!
//! Provides structured error types for schema lineage handling, client
//! dispatch, reconciliation, and bridge service construction.

use thiserror::Error;

use crate::schema::SchemaVersion;

/// Unified error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Bridge is disabled")]
    BridgeDisabled,

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    // =========================================================================
    // Schema Lineage Errors
    // =========================================================================
    #[error("Lineage '{name}' is invalid: {reason}")]
    InvalidLineage { name: String, reason: String },

    #[error("Schema version {version} not found in lineage '{name}'")]
    VersionNotFound { name: String, version: SchemaVersion },

    #[error("Payload does not conform to '{lineage}' schema {version}: {reason}")]
    Validation {
        lineage: String,
        version: SchemaVersion,
        reason: String,
    },

    #[error("Model type is not assignable to '{lineage}' schema {version}: {reason}")]
    NotAssignable {
        lineage: String,
        version: SchemaVersion,
        reason: String,
    },

    // =========================================================================
    // Client Dispatch Errors
    // =========================================================================
    #[error("No client registered for schema group/version: {group}/{version}")]
    ClientNotRegistered { group: String, version: String },

    #[error("Kind already present in scheme: {0}")]
    SchemeConflict(String),

    #[error("Controller registration failed for '{name}': {reason}")]
    ControllerRegistration { name: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::NotFound`] with owned parts.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Check whether this error carries a structured not-found reason.
    ///
    /// Reconciliation branches on this instead of comparing against a
    /// sentinel error value; apiserver 404s are mapped into
    /// [`Error::NotFound`] at the fetcher boundary.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this error aborts startup rather than a single pass
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::Kubeconfig(_)
                | Error::InvalidLineage { .. }
                | Error::VersionNotFound { .. }
                | Error::NotAssignable { .. }
                | Error::ClientNotRegistered { .. }
                | Error::SchemeConflict(_)
                | Error::ControllerRegistration { .. }
        )
    }

    /// Check if this error is transient for a single reconciliation pass
    pub fn is_transient(&self) -> bool {
        !self.is_startup_fatal() && !self.is_not_found()
    }
}

/// Result type alias for the bridge
pub type Result<T> = std::result::Result<T, Error>;
