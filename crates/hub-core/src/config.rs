//! Configuration types for the service hub
//!
//! This module defines where the hub keeps its files and the policy knobs of
//! the DNS reconciler. The hub's own settings are not configured here; they
//! are resolved by [`crate::settings`].

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Prefix of environment variables that supply settings (`HUB_PARENT_DNS_DOMAIN`)
pub const DEFAULT_ENV_PREFIX: &str = "HUB_";

/// File name of the settings document inside the project directory
pub const SETTINGS_FILE_NAME: &str = "hub.toml";

/// Default time-to-live for records written by the reconciler
pub const DEFAULT_DNS_TTL: u32 = 300;

/// File locations for one hub project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Root of the hub project
    pub project_dir: PathBuf,

    /// Durable settings document
    pub settings_file: PathBuf,

    /// Dotenv-style override file
    pub dotenv_file: PathBuf,

    /// Directory with one file per secret setting
    pub secrets_dir: PathBuf,

    /// Prefix of environment variables that supply settings
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
}

impl HubConfig {
    /// Standard layout rooted at `project_dir`
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        Self {
            settings_file: project_dir.join(SETTINGS_FILE_NAME),
            dotenv_file: project_dir.join(".env"),
            secrets_dir: project_dir.join("secrets"),
            env_prefix: default_env_prefix(),
            project_dir,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.settings_file.as_os_str().is_empty() {
            return Err(crate::Error::config("Settings file path cannot be empty"));
        }
        if self.settings_file.file_name().is_none() {
            return Err(crate::Error::config(format!(
                "Settings file path {} does not name a file",
                self.settings_file.display()
            )));
        }
        if self.env_prefix.is_empty() {
            return Err(crate::Error::config("Environment prefix cannot be empty"));
        }
        if !crate::settings::validate::is_env_key(&self.env_prefix) {
            return Err(crate::Error::config(format!(
                "Environment prefix '{}' is not a valid variable name prefix",
                self.env_prefix
            )));
        }
        Ok(())
    }
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

/// Policy for one reconciler call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsPolicy {
    /// An existing identical record is a successful no-op rather than an error
    #[serde(default = "default_true")]
    pub allow_existing: bool,

    /// Replace an existing record that differs from the desired one
    #[serde(default)]
    pub allow_overwrite: bool,

    /// Require the target to resolve to exactly the expected address before writing
    #[serde(default)]
    pub verify_target: bool,

    /// Address to verify against; the current public IP when unset
    #[serde(default)]
    pub expected_address: Option<Ipv4Addr>,

    /// Time-to-live of written records, in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Deleting an absent record is a successful no-op rather than an error
    #[serde(default = "default_true")]
    pub allow_missing: bool,
}

impl DnsPolicy {
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn verify_against(mut self, expected: Option<Ipv4Addr>) -> Self {
        self.verify_target = true;
        self.expected_address = expected;
        self
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !(60..=86400).contains(&self.ttl) {
            return Err(crate::Error::config(format!(
                "DNS TTL must be between 60 and 86400 seconds. Got: {}",
                self.ttl
            )));
        }
        if self.expected_address.is_some() && !self.verify_target {
            return Err(crate::Error::config(
                "expected_address is only meaningful with verify_target",
            ));
        }
        Ok(())
    }
}

impl Default for DnsPolicy {
    fn default() -> Self {
        Self {
            allow_existing: true,
            allow_overwrite: false,
            verify_target: false,
            expected_address: None,
            ttl: DEFAULT_DNS_TTL,
            allow_missing: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u32 {
    DEFAULT_DNS_TTL
}
