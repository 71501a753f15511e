// # Settings Store
//
// Durable home of the hub's settings: a TOML document with a `[hub]` table.
//
// ## Lifecycle
//
// ```text
//   Unloaded ──load/get/set──▶ Loaded ──set──▶ Dirty ──flush──▶ Persisted
//                                 ▲                                │
//                                 └──────────── set ◀──────────────┘ (Dirty)
// ```
//
// - First access reads the file, or writes the canonical default document
//   when there is none.
// - `set` edits the cached document only; `flush` persists it.
// - `save` persists a whole document at once.
// - `clear_cache` returns to `Unloaded`; the next access reads the file again.
//
// ## Durability
//
// Every write goes through [`atomic::write_atomic`]: an interrupted save
// leaves the previous document byte-for-byte intact.

pub mod atomic;
pub mod document;

pub use document::{SettingPath, SettingsDocument, to_toml};

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::settings::{Schema, SourceLayer, value::scalar_to_string};
use crate::{Error, Result};

/// Where the cached document stands relative to the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Nothing read yet
    Unloaded,
    /// Cached document matches what was read from disk
    Loaded,
    /// Cached document has unsaved edits
    Dirty,
    /// Cached document matches what was last written
    Persisted,
}

#[derive(Debug)]
struct Cached {
    doc: SettingsDocument,
    state: StoreState,
}

/// File-backed settings document with an in-memory cache
///
/// # Example
///
/// ```rust,no_run
/// use hub_core::settings::hub_schema;
/// use hub_core::store::SettingsStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = SettingsStore::new("/srv/hub/hub.toml", Arc::new(hub_schema()?));
///
///     store.set("parent_dns_domain", "example.com".into()).await?;
///     store.set("traefik_stack_env.TZ", "UTC".into()).await?;
///     store.flush().await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    schema: Arc<Schema>,
    cache: Mutex<Option<Cached>>,
}

impl SettingsStore {
    /// Create a store; nothing is read until first access
    pub fn new(path: impl AsRef<Path>, schema: Arc<Schema>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema,
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub async fn state(&self) -> StoreState {
        self.cache
            .lock()
            .await
            .as_ref()
            .map_or(StoreState::Unloaded, |c| c.state)
    }

    /// The current document, including unsaved edits
    pub async fn load(&self) -> Result<SettingsDocument> {
        let mut slot = self.cache.lock().await;
        Ok(self.ensure_loaded(&mut slot).await?.doc.clone())
    }

    /// Value stored at `setting` or `setting.key`
    pub async fn get(&self, path: &str) -> Result<Option<Value>> {
        let path = SettingPath::parse(path, &self.schema)?;
        let mut slot = self.cache.lock().await;
        Ok(self.ensure_loaded(&mut slot).await?.doc.get(&path))
    }

    /// Change one value in memory; `Value::Null` removes it
    ///
    /// The path and the value's type are checked before anything changes.
    /// Call [`flush`](Self::flush) to persist.
    pub async fn set(&self, path: &str, value: Value) -> Result<()> {
        let path = SettingPath::parse(path, &self.schema)?;
        let value = self.to_stored(&path, &value)?;

        let mut slot = self.cache.lock().await;
        let cached = self.ensure_loaded(&mut slot).await?;
        cached.doc.set(&path, value)?;
        cached.state = StoreState::Dirty;
        tracing::debug!("Set {} in {}", path, self.path.display());
        Ok(())
    }

    /// Persist unsaved edits; returns whether anything was written
    pub async fn flush(&self) -> Result<bool> {
        let mut slot = self.cache.lock().await;
        let Some(cached) = slot.as_mut() else {
            return Ok(false);
        };
        if cached.state != StoreState::Dirty {
            return Ok(false);
        }

        atomic::write_atomic(&self.path, cached.doc.to_string().as_bytes()).await?;
        cached.state = StoreState::Persisted;
        tracing::info!("Saved settings to {}", self.path.display());
        Ok(true)
    }

    /// Persist a whole document, replacing the cached one
    ///
    /// # Errors
    ///
    /// `UnknownSettingName` if `[hub]` holds a key the schema does not know;
    /// `StorePersist` if writing fails (the previous file is kept).
    pub async fn save(&self, doc: &SettingsDocument) -> Result<()> {
        self.check_keys(doc)?;
        let mut slot = self.cache.lock().await;
        atomic::write_atomic(&self.path, doc.to_string().as_bytes()).await?;
        *slot = Some(Cached {
            doc: doc.clone(),
            state: StoreState::Persisted,
        });
        tracing::info!("Saved settings to {}", self.path.display());
        Ok(())
    }

    /// Forget the cached document, discarding unsaved edits
    pub async fn clear_cache(&self) {
        let mut slot = self.cache.lock().await;
        if slot.as_ref().is_some_and(|c| c.state == StoreState::Dirty) {
            tracing::warn!("Discarding unsaved settings edits for {}", self.path.display());
        }
        *slot = None;
    }

    /// `[hub]` entries as the lowest-precedence resolver layer
    pub async fn raw_layer(&self) -> Result<SourceLayer> {
        let mut slot = self.cache.lock().await;
        let entries = self.ensure_loaded(&mut slot).await?.doc.entries();
        Ok(SourceLayer::new(
            format!("settings document {}", self.path.display()),
            entries,
        ))
    }

    async fn ensure_loaded<'a>(&self, slot: &'a mut Option<Cached>) -> Result<&'a mut Cached> {
        let cached = match slot.take() {
            Some(cached) => cached,
            None => Cached {
                doc: self.read_or_seed().await?,
                state: StoreState::Loaded,
            },
        };
        Ok(slot.insert(cached))
    }

    async fn read_or_seed(&self) -> Result<SettingsDocument> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => {
                let doc: SettingsDocument = text
                    .parse()
                    .map_err(|e| Error::document(&self.path, e))?;
                self.check_keys(&doc)?;
                if !doc.has_hub_section() {
                    tracing::warn!("{} has no [hub] table", self.path.display());
                }
                tracing::debug!("Loaded settings from {}", self.path.display());
                Ok(doc)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let doc = SettingsDocument::canonical(&self.schema)?;
                atomic::write_atomic(&self.path, doc.to_string().as_bytes()).await?;
                tracing::info!("Created default settings document at {}", self.path.display());
                Ok(doc)
            }
            Err(e) => Err(Error::document(&self.path, e)),
        }
    }

    fn check_keys(&self, doc: &SettingsDocument) -> Result<()> {
        match doc.unknown_keys(&self.schema).into_iter().next() {
            Some(key) => Err(Error::unknown_setting(
                key,
                format!("found in {} but not part of the settings schema", self.path.display()),
            )),
            None => Ok(()),
        }
    }

    /// Type-check `value` for `path` and convert it for the document
    fn to_stored(&self, path: &SettingPath, value: &Value) -> Result<Option<toml_edit::Value>> {
        if value.is_null() {
            return Ok(None);
        }
        let Some(def) = self.schema.get(&path.setting) else {
            return Err(Error::unknown_setting(path.to_string(), "not part of the settings schema"));
        };
        let shown = |v: &Value| {
            if def.is_sensitive() {
                "<redacted>".to_string()
            } else {
                v.to_string()
            }
        };

        if path.key.is_some() {
            let text = scalar_to_string(value).ok_or_else(|| {
                Error::validation(path.to_string(), shown(value), "map entries must be scalars")
            })?;
            return Ok(Some(text.as_str().into()));
        }

        let typed = def.kind().coerce(&path.setting, value).map_err(|e| match e {
            Error::SettingValidation { name, constraint, .. } => Error::SettingValidation {
                name,
                value: shown(value),
                constraint,
            },
            other => other,
        })?;
        Ok(Some(to_toml(&typed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SettingDef, SettingKind};
    use serde_json::json;
    use tempfile::tempdir;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .setting(SettingDef::new("parent_dns_domain", SettingKind::Str).required("set it"))
                .setting(SettingDef::new("dns_ttl", SettingKind::Int).default_value(300))
                .setting(SettingDef::new("portainer_agent_secret", SettingKind::Str).sensitive())
                .setting(SettingDef::new("base_stack_env", SettingKind::StrMap))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_file_is_seeded_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        let store = SettingsStore::new(&path, schema());
        assert_eq!(store.state().await, StoreState::Unloaded);

        assert_eq!(store.get("dns_ttl").await.unwrap(), Some(json!(300)));
        assert_eq!(store.get("parent_dns_domain").await.unwrap(), None);
        assert_eq!(store.state().await, StoreState::Loaded);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[hub]"));
        assert!(text.contains("# parent_dns_domain = <string>"));
    }

    #[tokio::test]
    async fn set_is_in_memory_until_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        let store = SettingsStore::new(&path, schema());

        store.set("parent_dns_domain", json!("example.com")).await.unwrap();
        store.set("base_stack_env.TZ", json!("UTC")).await.unwrap();
        assert_eq!(store.state().await, StoreState::Dirty);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("example.com"));

        assert!(store.flush().await.unwrap());
        assert_eq!(store.state().await, StoreState::Persisted);
        assert!(!store.flush().await.unwrap());

        let reopened = SettingsStore::new(&path, schema());
        assert_eq!(reopened.get("parent_dns_domain").await.unwrap(), Some(json!("example.com")));
        assert_eq!(reopened.get("base_stack_env.TZ").await.unwrap(), Some(json!("UTC")));
    }

    #[tokio::test]
    async fn set_rejects_bad_paths_and_types_without_changes() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("hub.toml"), schema());

        let err = store.set("typo", json!("x")).await.unwrap_err();
        assert!(matches!(err, Error::UnknownSettingName { .. }));
        let err = store.set("dns_ttl", json!("soon")).await.unwrap_err();
        assert!(matches!(err, Error::SettingValidation { .. }));
        let err = store.set("portainer_agent_secret", json!([1])).await.unwrap_err();
        assert!(!err.to_string().contains('['));

        assert_eq!(store.state().await, StoreState::Unloaded);
    }

    #[tokio::test]
    async fn null_removes_a_value() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("hub.toml"), schema());
        store.set("dns_ttl", Value::Null).await.unwrap();
        assert_eq!(store.get("dns_ttl").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_keys_in_file_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(&path, "[hub]\nparent_dns_domian = \"typo.com\"\n").unwrap();

        let store = SettingsStore::new(&path, schema());
        let err = store.raw_layer().await.unwrap_err();
        assert!(matches!(err, Error::UnknownSettingName { ref name, .. } if name == "parent_dns_domian"));
    }

    #[tokio::test]
    async fn clear_cache_rereads_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(&path, "[hub]\ndns_ttl = 600\n").unwrap();

        let store = SettingsStore::new(&path, schema());
        assert_eq!(store.get("dns_ttl").await.unwrap(), Some(json!(600)));

        std::fs::write(&path, "[hub]\ndns_ttl = 900\n").unwrap();
        assert_eq!(store.get("dns_ttl").await.unwrap(), Some(json!(600)));

        store.clear_cache().await;
        assert_eq!(store.get("dns_ttl").await.unwrap(), Some(json!(900)));
    }

    #[tokio::test]
    async fn save_replaces_the_whole_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        let store = SettingsStore::new(&path, schema());

        let doc: SettingsDocument = "# mine\n[hub]\ndns_ttl = 120\n".parse().unwrap();
        store.save(&doc).await.unwrap();
        assert_eq!(store.state().await, StoreState::Persisted);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n[hub]\ndns_ttl = 120\n");

        let bad: SettingsDocument = "[hub]\nbogus = 1\n".parse().unwrap();
        assert!(store.save(&bad).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n[hub]\ndns_ttl = 120\n");
    }
}
