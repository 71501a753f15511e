//! Error types for the service hub
//!
//! This module defines all error types used throughout the crate.
//!
//! Validation and schema errors are never recovered locally: they abort the
//! resolution or reconciliation call that raised them. I/O and network errors
//! are surfaced verbatim and the caller decides whether to retry.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the service hub
#[derive(Error, Debug)]
pub enum Error {
    /// A required setting has no raw value and no derivation produced one
    #[error("Missing required setting '{name}': {hint}")]
    MissingRequiredSetting {
        /// Setting name
        name: String,
        /// Remediation hint
        hint: String,
    },

    /// A setting value has the wrong shape or is out of range
    #[error("Invalid value for setting '{name}' ({value}): {constraint}")]
    SettingValidation {
        /// Setting name
        name: String,
        /// Offending value (redacted for sensitive settings)
        value: String,
        /// Human-readable constraint that was violated
        constraint: String,
    },

    /// Typo or unsupported dotted path
    #[error("Unknown setting name '{name}': {hint}")]
    UnknownSettingName {
        /// The name or dotted path as supplied
        name: String,
        /// Where it came from or what is allowed
        hint: String,
    },

    /// A derivation rule references a setting the schema does not declare
    #[error("Schema definition error: {0}")]
    SchemaDefinition(String),

    /// The derivation rule graph has a dependency cycle
    #[error("Schema dependency cycle between settings: {}", cycle.join(" -> "))]
    SchemaCycle {
        /// Settings participating in the cycle
        cycle: Vec<String>,
    },

    /// I/O failure during an atomic write; the on-disk document is unchanged
    #[error("Failed to persist {}: {message}", path.display())]
    StorePersist {
        /// Target path
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// The on-disk settings document could not be read or parsed
    #[error("Invalid settings document {}: {message}", path.display())]
    Document {
        /// Document path
        path: PathBuf,
        /// Parse or read failure
        message: String,
    },

    /// No zone owned by the account contains the requested name
    #[error("No hosted zone found for DNS name '{name}'")]
    ZoneNotFound {
        /// Fully-qualified DNS name
        name: String,
    },

    /// More than one record of the relevant type exists at the name
    #[error("Ambiguous record set at '{name}': {count} records found; resolve manually")]
    AmbiguousRecordSet {
        /// Record name
        name: String,
        /// Number of conflicting records
        count: usize,
    },

    /// The target did not resolve to exactly the expected address
    #[error("Target '{target}' resolves to {resolved:?}, expected exactly [{expected}]")]
    TargetMismatch {
        /// Requested target
        target: String,
        /// Addresses the target resolved to
        resolved: Vec<Ipv4Addr>,
        /// Expected public address
        expected: Ipv4Addr,
    },

    /// A record exists and policy forbids keeping or replacing it
    #[error("DNS record '{name}' already exists ({existing}); overwrite not allowed")]
    RecordExists {
        /// Record name
        name: String,
        /// Description of the existing record
        existing: String,
    },

    /// Delete of an absent record when the caller opted out of soft deletes
    #[error("DNS record '{name}' does not exist")]
    RecordNotFound {
        /// Record name
        name: String,
    },

    /// Local host lookup failed (hostname, LAN address)
    #[error("Host probe failed: {0}")]
    HostProbe(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors outside the atomic write path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a missing-required-setting error
    pub fn missing(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequiredSetting {
            name: name.into(),
            hint: hint.into(),
        }
    }

    /// Create a setting validation error
    pub fn validation(
        name: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::SettingValidation {
            name: name.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an unknown-setting-name error
    pub fn unknown_setting(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::UnknownSettingName {
            name: name.into(),
            hint: hint.into(),
        }
    }

    /// Create a schema definition error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaDefinition(msg.into())
    }

    /// Create a store persistence error
    pub fn persist(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::StorePersist {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a document read/parse error
    pub fn document(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Document {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a host probe error
    pub fn host_probe(msg: impl Into<String>) -> Self {
        Self::HostProbe(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by bad configuration or schema rather than I/O
    ///
    /// The CLI maps these to its configuration exit code.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredSetting { .. }
                | Self::SettingValidation { .. }
                | Self::UnknownSettingName { .. }
                | Self::SchemaDefinition(_)
                | Self::SchemaCycle { .. }
                | Self::Document { .. }
                | Self::Config(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_members_in_order() {
        let err = Error::SchemaCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "Schema dependency cycle between settings: a -> b -> a"
        );
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(Error::missing("parent_dns_domain", "set it").is_configuration());
        assert!(Error::unknown_setting("typo", "not in schema").is_configuration());
        assert!(!Error::persist("/tmp/x", "disk full").is_configuration());
        assert!(!Error::ZoneNotFound { name: "a.b.c".into() }.is_configuration());
    }
}
