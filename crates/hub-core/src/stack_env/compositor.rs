// # Stack Environment Compositor
//
// Builds named environment dictionaries by layered inheritance.
//
// ## Composition Order
//
// ```text
//   parent dictionary (fully composed, or empty)
//        │
//        ▼
//   explicit overrides   ← the dictionary's map setting, e.g. traefik_stack_env
//        │
//        ▼
//   defaulting rules     ← only for keys still absent or empty, in declared order
//        │
//        ▼
//   normalize            ← drop empty values
// ```
//
// An explicit empty override therefore removes an inherited key unless a
// defaulting rule of the child fills it again.
//
// Everything is keyed by `BTreeMap`, so the same settings always compose to
// the same dictionary.

use std::collections::{BTreeMap, HashSet};

use super::dictionary::EnvironmentDictionary;
use crate::settings::validate::is_env_key;
use crate::settings::{ResolvedSettings, Schema, SettingKind};
use crate::{Error, Result};

/// Pure function of the resolved settings and the keys composed so far
pub type ComputeFn = fn(&ResolvedSettings, &BTreeMap<String, String>) -> Result<Option<String>>;

/// How a defaulted key gets its value
#[derive(Clone, Copy)]
pub enum DefaultRule {
    /// Plain-text value of a resolved setting
    Setting(&'static str),
    Compute(ComputeFn),
}

impl std::fmt::Debug for DefaultRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setting(name) => f.debug_tuple("Setting").field(name).finish(),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// Declaration of one environment dictionary
#[derive(Debug, Clone)]
pub struct DictionaryDef {
    name: &'static str,
    parent: Option<&'static str>,
    overrides: Option<&'static str>,
    defaults: Vec<(&'static str, DefaultRule)>,
}

impl DictionaryDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parent: None,
            overrides: None,
            defaults: Vec::new(),
        }
    }

    /// Inherit everything `parent` composes to
    pub fn parent(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Take explicit overrides from a map-valued setting
    pub fn overrides(mut self, setting: &'static str) -> Self {
        self.overrides = Some(setting);
        self
    }

    /// Default `key` to the plain value of `setting`
    pub fn from_setting(mut self, key: &'static str, setting: &'static str) -> Self {
        self.defaults.push((key, DefaultRule::Setting(setting)));
        self
    }

    /// Default `key` to a computed value
    pub fn computed(mut self, key: &'static str, compute: ComputeFn) -> Self {
        self.defaults.push((key, DefaultRule::Compute(compute)));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent_name(&self) -> Option<&'static str> {
        self.parent
    }
}

/// A validated set of dictionary declarations
#[derive(Debug, Clone)]
pub struct StackEnvCompositor {
    dictionaries: Vec<DictionaryDef>,
}

impl StackEnvCompositor {
    pub fn builder() -> StackEnvCompositorBuilder {
        StackEnvCompositorBuilder::default()
    }

    /// Dictionary names in declared order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.dictionaries.iter().map(|d| d.name)
    }

    pub fn get(&self, name: &str) -> Option<&DictionaryDef> {
        self.dictionaries.iter().find(|d| d.name == name)
    }

    /// Compose one dictionary
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an unknown dictionary name
    /// - `SettingValidation` for an override key that is not a valid
    ///   environment variable name
    /// - anything a computed rule returns
    pub fn compose(&self, name: &str, settings: &ResolvedSettings) -> Result<EnvironmentDictionary> {
        let def = self
            .get(name)
            .ok_or_else(|| Error::invalid_input(format!("Unknown environment dictionary '{}'", name)))?;
        let vars = self.compose_vars(def, settings)?;
        tracing::debug!("Composed '{}' environment with {} variable(s)", name, vars.len());
        Ok(EnvironmentDictionary::new(def.name, vars))
    }

    /// Compose every dictionary, in declared order
    pub fn compose_all(&self, settings: &ResolvedSettings) -> Result<Vec<EnvironmentDictionary>> {
        self.names().map(|name| self.compose(name, settings)).collect()
    }

    fn compose_vars(&self, def: &DictionaryDef, settings: &ResolvedSettings) -> Result<BTreeMap<String, String>> {
        let mut vars = match def.parent.and_then(|p| self.get(p)) {
            Some(parent) => self.compose_vars(parent, settings)?,
            None => BTreeMap::new(),
        };

        if let Some(setting) = def.overrides {
            for (key, value) in settings.map(setting).into_iter().flatten() {
                if !is_env_key(key) {
                    return Err(Error::validation(
                        setting,
                        key.clone(),
                        "keys must be environment variable names ([A-Za-z_][A-Za-z0-9_]*)",
                    ));
                }
                vars.insert(key.clone(), value.clone());
            }
        }

        for (key, rule) in &def.defaults {
            if vars.get(*key).is_some_and(|v| !v.is_empty()) {
                continue;
            }
            let value = match rule {
                DefaultRule::Setting(name) => settings.get(name).map(|v| v.to_plain_string()),
                DefaultRule::Compute(compute) => compute(settings, &vars)?,
            };
            if let Some(value) = value {
                vars.insert(key.to_string(), value);
            }
        }

        vars.retain(|_, v| !v.is_empty());
        Ok(vars)
    }
}

/// Builder for [`StackEnvCompositor`]
#[derive(Debug, Default)]
pub struct StackEnvCompositorBuilder {
    dictionaries: Vec<DictionaryDef>,
}

impl StackEnvCompositorBuilder {
    pub fn dictionary(mut self, def: DictionaryDef) -> Self {
        self.dictionaries.push(def);
        self
    }

    /// Check the declarations against `schema`
    ///
    /// Parents must be declared before their children, which keeps the
    /// inheritance graph acyclic. Referenced settings must exist, and
    /// override settings must be maps.
    pub fn build(self, schema: &Schema) -> Result<StackEnvCompositor> {
        let mut seen: HashSet<&'static str> = HashSet::new();

        for def in &self.dictionaries {
            if let Some(parent) = def.parent {
                if !seen.contains(parent) {
                    return Err(Error::schema(format!(
                        "Dictionary '{}' inherits from '{}', which is not declared before it",
                        def.name, parent
                    )));
                }
            }

            if let Some(setting) = def.overrides {
                match schema.get(setting) {
                    Some(s) if s.kind() == SettingKind::StrMap => {}
                    Some(s) => {
                        return Err(Error::schema(format!(
                            "Dictionary '{}' takes overrides from '{}', a {} rather than a string map",
                            def.name,
                            setting,
                            s.kind()
                        )));
                    }
                    None => {
                        return Err(Error::schema(format!(
                            "Dictionary '{}' takes overrides from unknown setting '{}'",
                            def.name, setting
                        )));
                    }
                }
            }

            for (key, rule) in &def.defaults {
                if !is_env_key(key) {
                    return Err(Error::schema(format!(
                        "Dictionary '{}' declares invalid key '{}'",
                        def.name, key
                    )));
                }
                if let DefaultRule::Setting(setting) = rule {
                    if !schema.contains(setting) {
                        return Err(Error::schema(format!(
                            "Dictionary '{}' key '{}' references unknown setting '{}'",
                            def.name, key, setting
                        )));
                    }
                }
            }

            if !seen.insert(def.name) {
                return Err(Error::schema(format!("Dictionary '{}' declared twice", def.name)));
            }
        }

        Ok(StackEnvCompositor {
            dictionaries: self.dictionaries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::StaticHostProbe;
    use crate::settings::{RawSource, Resolver, SettingDef, SourceLayer};
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Schema {
        Schema::builder()
            .setting(SettingDef::new("domain", SettingKind::Str).default_value("example.com"))
            .setting(SettingDef::new("port", SettingKind::Int).default_value(80))
            .setting(SettingDef::new("base_env", SettingKind::StrMap))
            .setting(SettingDef::new("web_env", SettingKind::StrMap))
            .build()
            .unwrap()
    }

    fn url(_: &ResolvedSettings, vars: &BTreeMap<String, String>) -> Result<Option<String>> {
        Ok(vars
            .get("DOMAIN")
            .map(|d| format!("http://{}:{}", d, vars.get("PORT").map_or("80", String::as_str))))
    }

    fn compositor(schema: &Schema) -> StackEnvCompositor {
        StackEnvCompositor::builder()
            .dictionary(
                DictionaryDef::new("base")
                    .overrides("base_env")
                    .from_setting("DOMAIN", "domain"),
            )
            .dictionary(
                DictionaryDef::new("web")
                    .parent("base")
                    .overrides("web_env")
                    .from_setting("PORT", "port")
                    .computed("URL", url),
            )
            .build(schema)
            .unwrap()
    }

    fn resolve(schema: Schema, raw: serde_json::Value) -> ResolvedSettings {
        let values: RawSource = serde_json::from_value(raw).unwrap();
        Resolver::new(Arc::new(schema), Arc::new(StaticHostProbe::unavailable()))
            .resolve(&[SourceLayer::new("test", values)])
            .unwrap()
    }

    #[test]
    fn child_inherits_overrides_and_defaults() {
        let settings = resolve(schema(), json!({"base_env": {"TZ": "UTC"}, "web_env": {"PORT": "8080"}}));
        let web = compositor(&schema()).compose("web", &settings).unwrap();

        assert_eq!(web.get("TZ"), Some("UTC"));
        assert_eq!(web.get("DOMAIN"), Some("example.com"));
        assert_eq!(web.get("PORT"), Some("8080"));
        assert_eq!(web.get("URL"), Some("http://example.com:8080"));
    }

    #[test]
    fn empty_override_removes_inherited_key() {
        let settings = resolve(schema(), json!({"base_env": {"TZ": "UTC"}, "web_env": {"TZ": ""}}));
        let c = compositor(&schema());

        assert_eq!(c.compose("base", &settings).unwrap().get("TZ"), Some("UTC"));
        assert_eq!(c.compose("web", &settings).unwrap().get("TZ"), None);
    }

    #[test]
    fn empty_override_is_refilled_by_default_rule() {
        let settings = resolve(schema(), json!({"base_env": {"DOMAIN": ""}}));
        let base = compositor(&schema()).compose("base", &settings).unwrap();
        assert_eq!(base.get("DOMAIN"), Some("example.com"));
    }

    #[test]
    fn composition_is_repeatable() {
        let settings = resolve(schema(), json!({"web_env": {"B": "2", "A": "1"}}));
        let c = compositor(&schema());
        assert_eq!(c.compose("web", &settings).unwrap(), c.compose("web", &settings).unwrap());
        assert_eq!(c.compose_all(&settings).unwrap().len(), 2);
    }

    #[test]
    fn unknown_dictionary_is_invalid_input() {
        let settings = resolve(schema(), json!({}));
        let err = compositor(&schema()).compose("db", &settings).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn bad_override_key_is_a_validation_error() {
        let settings = resolve(schema(), json!({"web_env": {"not-a-key": "x"}}));
        let err = compositor(&schema()).compose("web", &settings).unwrap_err();
        assert!(matches!(err, Error::SettingValidation { .. }));
    }

    #[test]
    fn declarations_are_checked() {
        let schema = schema();
        let forward = StackEnvCompositor::builder()
            .dictionary(DictionaryDef::new("web").parent("base"))
            .dictionary(DictionaryDef::new("base"))
            .build(&schema);
        assert!(matches!(forward, Err(Error::SchemaDefinition(_))));

        let bad_key = StackEnvCompositor::builder()
            .dictionary(DictionaryDef::new("base").from_setting("1BAD", "domain"))
            .build(&schema);
        assert!(bad_key.is_err());

        let unknown = StackEnvCompositor::builder()
            .dictionary(DictionaryDef::new("base").from_setting("X", "nope"))
            .build(&schema);
        assert!(unknown.is_err());

        let not_a_map = StackEnvCompositor::builder()
            .dictionary(DictionaryDef::new("base").overrides("domain"))
            .build(&schema);
        assert!(not_a_map.is_err());
    }
}
