// # Settings Provider
//
// Explicit handle for "the current resolved settings".
//
// A provider owns the resolver, the settings store and the source locations,
// and memoizes resolved snapshots keyed by the call-time overrides. Callers
// decide when a snapshot is stale:
//
// - `get`: cached snapshot, resolving on first use
// - `refresh`: resolve again and replace the cached snapshot
// - `clear`: drop every cached snapshot
//
// Writes through `set` go to the store and clear the cache.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::resolver::{RawSource, ResolvedSettings, Resolver, SourceLayer};
use super::sources::{EnvSource, dotenv_layer, secrets_layer};
use crate::Result;
use crate::config::HubConfig;
use crate::store::SettingsStore;
use crate::traits::HostProbe;

/// Memoizing front end to [`Resolver`]
pub struct SettingsProvider {
    resolver: Resolver,
    store: Arc<SettingsStore>,
    env: EnvSource,
    dotenv_file: Option<PathBuf>,
    secrets_dir: Option<PathBuf>,
    env_prefix: String,
    cache: Mutex<HashMap<String, Arc<ResolvedSettings>>>,
}

impl std::fmt::Debug for SettingsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsProvider")
            .field("store", &self.store.path())
            .field("dotenv_file", &self.dotenv_file)
            .field("secrets_dir", &self.secrets_dir)
            .field("env_prefix", &self.env_prefix)
            .finish_non_exhaustive()
    }
}

impl SettingsProvider {
    /// Create a provider reading only the store and the given environment
    pub fn new(resolver: Resolver, store: Arc<SettingsStore>, env: EnvSource) -> Self {
        Self {
            resolver,
            store,
            env,
            dotenv_file: None,
            secrets_dir: None,
            env_prefix: crate::config::DEFAULT_ENV_PREFIX.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Create a provider for a project layout, snapshotting the process environment
    pub fn from_config(config: &HubConfig, probe: Arc<dyn HostProbe>) -> Result<Self> {
        config.validate()?;
        let schema = Arc::new(super::hub_schema()?);
        let store = Arc::new(SettingsStore::new(&config.settings_file, schema.clone()));
        let env = EnvSource::from_process(config.env_prefix.clone());
        Ok(Self::new(Resolver::new(schema, probe), store, env)
            .with_dotenv_file(config.dotenv_file.clone())
            .with_secrets_dir(config.secrets_dir.clone())
            .with_env_prefix(config.env_prefix.clone()))
    }

    pub fn with_dotenv_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv_file = Some(path.into());
        self
    }

    pub fn with_secrets_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_dir = Some(path.into());
        self
    }

    /// Prefix used for dotenv-file names (the environment snapshot carries its own)
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Cached snapshot for `overrides`, resolving it on first use
    ///
    /// The cache lock is held while resolving, so concurrent callers never
    /// populate the same entry twice.
    pub async fn get(&self, overrides: &RawSource) -> Result<Arc<ResolvedSettings>> {
        let key = cache_key(overrides);
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache.get(&key) {
            tracing::debug!("Resolved settings cache hit");
            return Ok(hit.clone());
        }

        let resolved = Arc::new(self.resolve_now(overrides).await?);
        cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Resolve again, replacing any cached snapshot for `overrides`
    pub async fn refresh(&self, overrides: &RawSource) -> Result<Arc<ResolvedSettings>> {
        let key = cache_key(overrides);
        let mut cache = self.cache.lock().await;
        let resolved = Arc::new(self.resolve_now(overrides).await?);
        cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Drop every cached snapshot
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Write one setting through the store and persist it
    ///
    /// Cached snapshots are dropped because they may no longer match the
    /// document.
    pub async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.store.set(path, value).await?;
        self.store.flush().await?;
        self.clear().await;
        Ok(())
    }

    /// Every source layer, highest precedence first
    pub async fn layers(&self, overrides: &RawSource) -> Result<Vec<SourceLayer>> {
        let schema = self.resolver.schema();
        let mut layers = vec![
            SourceLayer::new("call-time overrides", overrides.clone()),
            self.env.layer(schema),
        ];
        if let Some(path) = &self.dotenv_file {
            layers.push(dotenv_layer(path, &self.env_prefix, schema).await?);
        }
        if let Some(dir) = &self.secrets_dir {
            layers.push(secrets_layer(dir, schema).await?);
        }
        layers.push(self.store.raw_layer().await?);
        Ok(layers)
    }

    async fn resolve_now(&self, overrides: &RawSource) -> Result<ResolvedSettings> {
        let layers = self.layers(overrides).await?;
        for layer in &layers {
            tracing::debug!("Settings source '{}': {} value(s)", layer.name, layer.values.len());
        }
        self.resolver.resolve(&layers)
    }
}

/// Canonical JSON of the overrides; `RawSource` is ordered so this is stable
fn cache_key(overrides: &RawSource) -> String {
    Value::Object(overrides.clone().into_iter().collect()).to_string()
}
