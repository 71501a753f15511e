// # Settings Document
//
// In-memory form of the durable settings file.
//
// ## File Format
//
// ```toml
// # comments and unrelated tables are kept verbatim
// version = "1.0"
//
// [hub]
// parent_dns_domain = "example.com"
// traefik_stack_env = { TRAEFIK_LOG_LEVEL = "DEBUG" }
// ```
//
// Only the `[hub]` section is managed. Edits go through `toml_edit`, so
// comments, ordering and formatting elsewhere survive a rewrite.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use toml_edit::{Array, DocumentMut, InlineTable, Item, TableLike};

use crate::settings::{RawSource, Schema, SettingKind, SettingValue};
use crate::{Error, Result};

/// Top-level table holding all managed settings
pub const HUB_SECTION: &str = "hub";

/// Format version written into new documents
pub const DOCUMENT_VERSION: &str = "1.0";

/// A dotted path of at most two segments: `setting` or `setting.key`
///
/// The second segment is only allowed for map-valued settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingPath {
    pub setting: String,
    pub key: Option<String>,
}

impl SettingPath {
    /// Parse and check `path` against the schema
    ///
    /// # Errors
    ///
    /// `UnknownSettingName` for unknown settings, empty segments, more than
    /// two segments, or a sub-key on a non-map setting.
    pub fn parse(path: &str, schema: &Schema) -> Result<Self> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) || segments.len() > 2 {
            return Err(Error::unknown_setting(
                path,
                "paths are 'setting' or 'setting.key' with non-empty segments",
            ));
        }

        let setting = segments[0];
        let Some(def) = schema.get(setting) else {
            return Err(Error::unknown_setting(path, format!("'{}' is not a known setting", setting)));
        };

        let key = segments.get(1).map(|k| k.to_string());
        if key.is_some() && def.kind() != SettingKind::StrMap {
            return Err(Error::unknown_setting(
                path,
                format!("'{}' is a {}, only map settings have sub-keys", setting, def.kind()),
            ));
        }

        Ok(Self {
            setting: setting.to_string(),
            key,
        })
    }
}

impl fmt::Display for SettingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}.{}", self.setting, key),
            None => f.write_str(&self.setting),
        }
    }
}

/// The settings document, with formatting preserved
#[derive(Debug, Clone)]
pub struct SettingsDocument {
    doc: DocumentMut,
}

impl SettingsDocument {
    /// Generate the default document for `schema`
    ///
    /// Every setting is listed with its description. Constant defaults are
    /// written as values; everything else is a commented-out placeholder.
    pub fn canonical(schema: &Schema) -> Result<Self> {
        let text = canonical_text(schema);
        Self::from_str(&text)
            .map_err(|e| Error::schema(format!("generated settings document does not parse: {}", e)))
    }

    pub fn has_hub_section(&self) -> bool {
        self.doc.contains_key(HUB_SECTION)
    }

    /// Managed entries as raw JSON values
    pub fn entries(&self) -> RawSource {
        self.hub()
            .map(|hub| {
                hub.iter()
                    .map(|(k, item)| (k.to_string(), item_to_json(item)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys in `[hub]` that the schema does not know
    pub fn unknown_keys(&self, schema: &Schema) -> Vec<String> {
        self.hub()
            .map(|hub| {
                hub.iter()
                    .map(|(k, _)| k)
                    .filter(|k| !schema.contains(k))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, path: &SettingPath) -> Option<Value> {
        let item = self.hub()?.get(&path.setting)?;
        match &path.key {
            None => Some(item_to_json(item)),
            Some(key) => item.as_table_like()?.get(key).map(item_to_json),
        }
    }

    /// Set or (with `None`) remove the value at `path`
    ///
    /// Decor of an existing value (such as a trailing comment) is kept.
    pub fn set(&mut self, path: &SettingPath, value: Option<toml_edit::Value>) -> Result<()> {
        let hub = self.hub_mut()?;
        match (&path.key, value) {
            (None, Some(value)) => replace_or_insert(hub, &path.setting, value),
            (None, None) => {
                hub.remove(&path.setting);
            }
            (Some(key), value) => {
                if hub.get(&path.setting).and_then(Item::as_table_like).is_none() {
                    hub.insert(&path.setting, Item::Value(InlineTable::new().into()));
                }
                let map = hub
                    .get_mut(&path.setting)
                    .and_then(Item::as_table_like_mut)
                    .ok_or_else(|| Error::invalid_input(format!("'{}' is not a table", path.setting)))?;
                match value {
                    Some(value) => replace_or_insert(map, key, value),
                    None => {
                        map.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn hub(&self) -> Option<&dyn TableLike> {
        self.doc.get(HUB_SECTION).and_then(Item::as_table_like)
    }

    fn hub_mut(&mut self) -> Result<&mut dyn TableLike> {
        if !self.doc.contains_key(HUB_SECTION) {
            self.doc.insert(HUB_SECTION, toml_edit::table());
        }
        self.doc
            .get_mut(HUB_SECTION)
            .and_then(Item::as_table_like_mut)
            .ok_or_else(|| Error::invalid_input(format!("'{}' is not a table", HUB_SECTION)))
    }
}

impl FromStr for SettingsDocument {
    type Err = toml_edit::TomlError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self { doc: s.parse()? })
    }
}

impl fmt::Display for SettingsDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.doc)
    }
}

fn replace_or_insert(table: &mut dyn TableLike, key: &str, value: toml_edit::Value) {
    match table.get_mut(key) {
        Some(Item::Value(existing)) => {
            let decor = existing.decor().clone();
            *existing = value;
            *existing.decor_mut() = decor;
        }
        Some(item) => *item = Item::Value(value),
        None => {
            table.insert(key, Item::Value(value));
        }
    }
}

/// TOML form of a typed value
pub fn to_toml(value: &SettingValue) -> toml_edit::Value {
    match value {
        SettingValue::Str(s) => s.as_str().into(),
        SettingValue::Int(i) => (*i).into(),
        SettingValue::Float(f) => (*f).into(),
        SettingValue::Bool(b) => (*b).into(),
        SettingValue::StrSet(items) => items.iter().map(String::as_str).collect::<Array>().into(),
        SettingValue::StrList(items) => items.iter().map(String::as_str).collect::<Array>().into(),
        SettingValue::StrMap(map) => map
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<InlineTable>()
            .into(),
    }
}

fn item_to_json(item: &Item) -> Value {
    match item {
        Item::None => Value::Null,
        Item::Value(v) => value_to_json(v),
        Item::Table(t) => Value::Object(
            t.iter()
                .map(|(k, i)| (k.to_string(), item_to_json(i)))
                .collect(),
        ),
        Item::ArrayOfTables(tables) => Value::Array(
            tables
                .iter()
                .map(|t| {
                    Value::Object(
                        t.iter()
                            .map(|(k, i)| (k.to_string(), item_to_json(i)))
                            .collect(),
                    )
                })
                .collect(),
        ),
    }
}

fn value_to_json(value: &toml_edit::Value) -> Value {
    use toml_edit::Value as T;
    match value {
        T::String(s) => Value::String(s.value().clone()),
        T::Integer(i) => Value::from(*i.value()),
        T::Float(f) => serde_json::Number::from_f64(*f.value())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        T::Boolean(b) => Value::Bool(*b.value()),
        T::Datetime(d) => Value::String(d.value().to_string()),
        T::Array(items) => Value::Array(items.iter().map(value_to_json).collect()),
        T::InlineTable(t) => Value::Object(
            t.iter()
                .map(|(k, v)| (k.to_string(), value_to_json(v)))
                .collect(),
        ),
    }
}

fn canonical_text(schema: &Schema) -> String {
    let mut out = String::new();
    out.push_str("# Service hub settings.\n");
    out.push_str("#\n");
    out.push_str("# Managed settings live in the [hub] table; anything else in this file is\n");
    out.push_str("# kept as-is but ignored. This file can hold secrets: keep it private.\n\n");
    out.push_str(&format!("version = \"{}\"\n\n", DOCUMENT_VERSION));
    out.push_str(&format!("[{}]\n", HUB_SECTION));

    for def in schema.settings() {
        out.push('\n');
        for line in def.description().lines().filter(|l| !l.trim().is_empty()) {
            out.push_str(&format!("# {}\n", line.trim()));
        }
        let required = if def.is_required() { ", required" } else { "" };
        out.push_str(&format!("# ({}{})\n", def.kind(), required));

        match def.derivation() {
            crate::settings::Derivation::Constant(value) if !def.is_sensitive() => {
                out.push_str(&format!("{} = {}\n", def.name(), to_toml(value)));
            }
            _ => out.push_str(&format!("# {} = <{}>\n", def.name(), def.kind())),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingDef;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder()
            .setting(
                SettingDef::new("parent_dns_domain", SettingKind::Str)
                    .required("set it")
                    .describe("Public domain."),
            )
            .setting(SettingDef::new("dns_ttl", SettingKind::Int).default_value(300))
            .setting(SettingDef::new("base_stack_env", SettingKind::StrMap))
            .build()
            .unwrap()
    }

    #[test]
    fn canonical_document_lists_every_setting() {
        let doc = SettingsDocument::canonical(&schema()).unwrap();
        let text = doc.to_string();
        assert!(text.contains("# Public domain."));
        assert!(text.contains("# parent_dns_domain = <string>"));
        assert!(text.contains("dns_ttl = 300"));
        assert!(text.contains("# base_stack_env = <string map>"));

        let entries = doc.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["dns_ttl"], json!(300));
    }

    #[test]
    fn paths_are_checked_against_the_schema() {
        let schema = schema();
        assert!(SettingPath::parse("dns_ttl", &schema).is_ok());
        assert_eq!(
            SettingPath::parse("base_stack_env.FOO", &schema).unwrap().key.as_deref(),
            Some("FOO")
        );
        for bad in ["typo", "typo.x", "dns_ttl.x", "base_stack_env.a.b", "", "base_stack_env."] {
            let err = SettingPath::parse(bad, &schema).unwrap_err();
            assert!(matches!(err, Error::UnknownSettingName { .. }), "{bad}: {err:?}");
        }
    }

    #[test]
    fn edits_keep_comments_and_foreign_tables() {
        let text = "# top comment\n[other]\nkeep = true # note\n\n[hub]\n# the domain\nparent_dns_domain = \"a.com\" # inline\n";
        let mut doc: SettingsDocument = text.parse().unwrap();
        let schema = schema();

        doc.set(&SettingPath::parse("parent_dns_domain", &schema).unwrap(), Some("b.com".into()))
            .unwrap();
        doc.set(&SettingPath::parse("base_stack_env.TZ", &schema).unwrap(), Some("UTC".into()))
            .unwrap();

        let rendered = doc.to_string();
        assert!(rendered.contains("# top comment"));
        assert!(rendered.contains("keep = true # note"));
        assert!(rendered.contains("# the domain"));
        assert!(rendered.contains("parent_dns_domain = \"b.com\" # inline"));
        assert_eq!(
            doc.get(&SettingPath::parse("base_stack_env", &schema).unwrap()),
            Some(json!({"TZ": "UTC"}))
        );

        doc.set(&SettingPath::parse("base_stack_env.TZ", &schema).unwrap(), None)
            .unwrap();
        assert_eq!(
            doc.get(&SettingPath::parse("base_stack_env", &schema).unwrap()),
            Some(json!({}))
        );
    }

    #[test]
    fn standard_subtables_are_read_as_maps() {
        let doc: SettingsDocument = "[hub.base_stack_env]\nTZ = \"UTC\"\n".parse().unwrap();
        assert_eq!(doc.entries()["base_stack_env"], json!({"TZ": "UTC"}));
        assert!(doc.unknown_keys(&schema()).is_empty());
    }
}
