//! Raw setting sources.
//!
//! Ranked highest precedence first:
//!
//! 1. call-time overrides (built by the caller)
//! 2. process environment, `HUB_<NAME>` and `HUB_<NAME>__<KEY>`
//! 3. a dotenv file using the same naming
//! 4. a secrets directory, one file per setting
//! 5. the `[hub]` section of the settings document (see [`crate::store`])
//!
//! Names are matched case-insensitively against the schema; anything that is
//! not a known setting is ignored here, because the environment legitimately
//! contains unrelated variables.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

use super::resolver::{RawSource, SourceLayer};
use super::schema::Schema;
use super::value::SettingKind;
use crate::{Error, Result};

/// Snapshot of environment variables
///
/// Taking the snapshot explicitly keeps resolution independent of whatever
/// the process environment looks like later, and lets tests supply their own
/// variables without touching global state.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    vars: Vec<(String, String)>,
}

impl EnvSource {
    /// Snapshot the current process environment
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_process(prefix: impl Into<String>) -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self {
            prefix: prefix.into(),
            vars,
        }
    }

    pub fn from_vars<K, V>(prefix: impl Into<String>, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn layer(&self, schema: &Schema) -> SourceLayer {
        SourceLayer::new(
            "environment",
            prefixed_values(&self.prefix, self.vars.iter().cloned(), schema),
        )
    }
}

/// Read a dotenv file into a source layer; a missing file is an empty layer
pub async fn dotenv_layer(path: &Path, prefix: &str, schema: &Schema) -> Result<SourceLayer> {
    let name = format!("dotenv file {}", path.display());
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No dotenv file at {}", path.display());
            return Ok(SourceLayer::new(name, RawSource::new()));
        }
        Err(e) => {
            return Err(Error::config(format!("Cannot read {}: {}", path.display(), e)));
        }
    };

    let vars = dotenvy::from_read_iter(text.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::config(format!("Cannot parse {}: {}", path.display(), e)))?;

    Ok(SourceLayer::new(name, prefixed_values(prefix, vars, schema)))
}

/// Read a secrets directory into a source layer; a missing directory is empty
///
/// Each regular file named after a setting supplies that setting's value.
/// Trailing newlines are stripped; everything else is kept verbatim.
pub async fn secrets_layer(dir: &Path, schema: &Schema) -> Result<SourceLayer> {
    let name = format!("secrets directory {}", dir.display());
    let mut values = RawSource::new();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No secrets directory at {}", dir.display());
            return Ok(SourceLayer::new(name, values));
        }
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_ascii_lowercase) else {
            continue;
        };
        if !schema.contains(&file_name) {
            tracing::trace!("Ignoring secrets file {}", file_name);
            continue;
        }
        let content = fs::read_to_string(entry.path()).await?;
        let content = content.trim_end_matches(['\r', '\n']).to_string();
        values.insert(file_name, Value::String(content));
    }

    Ok(SourceLayer::new(name, values))
}

/// Select `PREFIX_NAME` and `PREFIX_NAME__KEY` variables that match the schema
fn prefixed_values(
    prefix: &str,
    vars: impl IntoIterator<Item = (String, String)>,
    schema: &Schema,
) -> RawSource {
    let prefix = prefix.to_ascii_lowercase();
    let mut plain: BTreeMap<String, String> = BTreeMap::new();
    let mut sub_keys: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for (key, value) in vars {
        let lower = key.to_ascii_lowercase();
        let Some(rest) = lower.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once("__") {
            None if schema.contains(rest) => {
                plain.insert(rest.to_string(), value);
            }
            Some((setting, _)) if schema.get(setting).is_some_and(|d| d.kind() == SettingKind::StrMap) => {
                // ASCII lower-casing keeps byte offsets, so slice the original
                // name to preserve the sub-key's case.
                let sub_key = &key[prefix.len() + setting.len() + 2..];
                if !sub_key.is_empty() {
                    sub_keys
                        .entry(setting.to_string())
                        .or_default()
                        .insert(sub_key.to_string(), value);
                }
            }
            _ => {}
        }
    }

    let mut values: RawSource = plain
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();

    for (setting, entries) in sub_keys {
        let mut object = match values.remove(&setting) {
            Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(object)) => object,
                _ => serde_json::Map::new(),
            },
            _ => serde_json::Map::new(),
        };
        for (k, v) in entries {
            object.insert(k, Value::String(v));
        }
        values.insert(setting, Value::Object(object));
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::schema::SettingDef;
    use serde_json::json;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::builder()
            .setting(SettingDef::new("parent_dns_domain", SettingKind::Str))
            .setting(SettingDef::new("traefik_stack_env", SettingKind::StrMap))
            .setting(SettingDef::new("portainer_agent_secret", SettingKind::Str))
            .build()
            .unwrap()
    }

    #[test]
    fn env_prefix_is_case_insensitive_and_unknown_names_ignored() {
        let env = EnvSource::from_vars(
            "HUB_",
            [
                ("HUB_PARENT_DNS_DOMAIN", "example.com"),
                ("HUB_NOT_A_SETTING", "x"),
                ("PATH", "/usr/bin"),
            ],
        );
        let layer = env.layer(&schema());
        assert_eq!(layer.values.len(), 1);
        assert_eq!(layer.values["parent_dns_domain"], json!("example.com"));
    }

    #[test]
    fn double_underscore_builds_map_entries() {
        let env = EnvSource::from_vars(
            "hub_",
            [
                ("HUB_TRAEFIK_STACK_ENV", r#"{"A": "1", "B": "2"}"#),
                ("HUB_TRAEFIK_STACK_ENV__B", "overridden"),
                ("HUB_TRAEFIK_STACK_ENV__Log_Level", "DEBUG"),
                ("HUB_PARENT_DNS_DOMAIN__X", "ignored: not a map"),
            ],
        );
        let layer = env.layer(&schema());
        assert_eq!(
            layer.values["traefik_stack_env"],
            json!({"A": "1", "B": "overridden", "Log_Level": "DEBUG"})
        );
        assert!(!layer.values.contains_key("parent_dns_domain"));
    }

    #[tokio::test]
    async fn dotenv_file_uses_same_naming() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "HUB_PARENT_DNS_DOMAIN=example.org\n# comment\nOTHER=1\nHUB_TRAEFIK_STACK_ENV__FOO='bar baz'\n",
        )
        .unwrap();

        let layer = dotenv_layer(&path, "HUB_", &schema()).await.unwrap();
        assert_eq!(layer.values["parent_dns_domain"], json!("example.org"));
        assert_eq!(layer.values["traefik_stack_env"], json!({"FOO": "bar baz"}));

        let missing = dotenv_layer(&dir.path().join("absent.env"), "HUB_", &schema())
            .await
            .unwrap();
        assert!(missing.values.is_empty());
    }

    #[tokio::test]
    async fn secrets_directory_supplies_file_contents() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("portainer_agent_secret"), "0123456789abcdef\n").unwrap();
        std::fs::write(dir.path().join("unrelated"), "x").unwrap();
        std::fs::create_dir(dir.path().join("parent_dns_domain")).unwrap();

        let layer = secrets_layer(dir.path(), &schema()).await.unwrap();
        assert_eq!(layer.values.len(), 1);
        assert_eq!(layer.values["portainer_agent_secret"], json!("0123456789abcdef"));

        let missing = secrets_layer(&dir.path().join("nope"), &schema()).await.unwrap();
        assert!(missing.values.is_empty());
    }
}
