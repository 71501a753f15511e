// # Settings Resolver
//
// Turns ranked raw sources into one validated, immutable settings snapshot.
//
// ```text
//   overrides ─┐
//   env vars  ─┤  shallow merge     topological      validate
//   dotenv    ─┼──────────────────► evaluation  ───► every value ───► ResolvedSettings
//   secrets   ─┤  (highest wins)    (schema order)
//   document  ─┘
// ```
//
// Resolution is pure apart from the injected `HostProbe`, and never returns a
// partially populated result.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::schema::{DerivationContext, Derivation, Schema, SettingDef};
use super::value::{SettingValue, short_json};
use crate::traits::HostProbe;
use crate::{Error, Result};

/// A raw, untyped mapping of setting names to values
pub type RawSource = BTreeMap<String, Value>;

/// One ranked source of raw values
#[derive(Debug, Clone, Default)]
pub struct SourceLayer {
    /// Where the values came from, for logs and error hints
    pub name: String,
    pub values: RawSource,
}

impl SourceLayer {
    pub fn new(name: impl Into<String>, values: RawSource) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

const REDACTED: &str = "<redacted>";

/// Evaluates a [`Schema`] against ranked sources
#[derive(Clone)]
pub struct Resolver {
    schema: Arc<Schema>,
    probe: Arc<dyn HostProbe>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settings", &self.schema.names().count())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(schema: Arc<Schema>, probe: Arc<dyn HostProbe>) -> Self {
        Self { schema, probe }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Resolve settings from sources ranked highest precedence first
    ///
    /// # Errors
    ///
    /// - `UnknownSettingName` if a source supplies a name the schema lacks
    /// - `SettingValidation` for values of the wrong shape
    /// - `MissingRequiredSetting` when a required setting ends up without a value
    /// - `HostProbe` when a host-derived default cannot be looked up
    pub fn resolve(&self, layers: &[SourceLayer]) -> Result<ResolvedSettings> {
        let merged = self.merge(layers)?;
        let mut resolved: BTreeMap<String, SettingValue> = BTreeMap::new();

        for def in self.schema.evaluation_order() {
            let deps = def.dependencies();
            let source = merged.get(def.name());
            let value = match source {
                Some((_, raw)) => {
                    let coerced = def.kind().coerce(def.name(), raw);
                    Some(coerced.map_err(|e| self.redact(def, e))?)
                }
                None => self.derive(def, &deps, &resolved)?,
            };

            let value = match (value, def.normalizer()) {
                (Some(v), Some(normalize)) => {
                    let ctx =
                        DerivationContext::new(def.name(), &deps, &resolved, self.probe.as_ref());
                    Some(normalize(v, &ctx)?)
                }
                (v, _) => v,
            };

            match value {
                Some(v) => {
                    self.check(def, &v)?;
                    let origin = source.map_or("derived", |(layer, _)| layer.as_str());
                    tracing::trace!(setting = def.name(), source = origin, "Setting resolved");
                    resolved.insert(def.name().to_string(), v);
                }
                None => {
                    if let Some(hint) = def.required_hint() {
                        return Err(Error::missing(def.name(), hint));
                    }
                }
            }
        }

        Ok(ResolvedSettings {
            values: resolved,
            sensitive: self.schema.sensitive_names(),
        })
    }

    /// Shallow, per-key merge; the first layer supplying a non-null value wins
    fn merge<'a>(
        &self,
        layers: &'a [SourceLayer],
    ) -> Result<BTreeMap<&'a str, (&'a String, &'a Value)>> {
        let mut merged = BTreeMap::new();
        for layer in layers {
            for (name, value) in &layer.values {
                if !self.schema.contains(name) {
                    return Err(Error::unknown_setting(
                        name.clone(),
                        format!("supplied by {} but not a known setting", layer.name),
                    ));
                }
                if value.is_null() {
                    continue;
                }
                merged.entry(name.as_str()).or_insert((&layer.name, value));
            }
        }
        Ok(merged)
    }

    fn derive(
        &self,
        def: &SettingDef,
        deps: &[&'static str],
        resolved: &BTreeMap<String, SettingValue>,
    ) -> Result<Option<SettingValue>> {
        match def.derivation() {
            Derivation::Explicit => Ok(None),
            Derivation::Constant(value) => Ok(Some(value.clone())),
            Derivation::Fallback(sibling) => Ok(resolved.get(*sibling).cloned()),
            Derivation::Computed { compute, .. } => {
                let ctx = DerivationContext::new(def.name(), deps, resolved, self.probe.as_ref());
                compute(&ctx)
            }
        }
    }

    fn check(&self, def: &SettingDef, value: &SettingValue) -> Result<()> {
        if value.kind() != def.kind() {
            return Err(self.redact(
                def,
                Error::validation(
                    def.name(),
                    short_json(&value.to_json()),
                    format!("expected a {}, derived a {}", def.kind(), value.kind()),
                ),
            ));
        }
        if let Some(validator) = def.validator() {
            validator(value).map_err(|constraint| {
                let shown = if def.is_sensitive() {
                    REDACTED.to_string()
                } else {
                    short_json(&value.to_json())
                };
                Error::validation(def.name(), shown, constraint)
            })?;
        }
        Ok(())
    }

    fn redact(&self, def: &SettingDef, err: Error) -> Error {
        match err {
            Error::SettingValidation { name, constraint, .. } if def.is_sensitive() => {
                Error::SettingValidation {
                    name,
                    value: REDACTED.to_string(),
                    constraint,
                }
            }
            other => other,
        }
    }
}

/// Immutable snapshot of fully resolved settings
///
/// Optional settings without a value are simply absent. Equal inputs always
/// produce equal snapshots, and [`to_json_string`](Self::to_json_string) is
/// byte-for-byte stable.
#[derive(Clone, PartialEq)]
pub struct ResolvedSettings {
    values: BTreeMap<String, SettingValue>,
    sensitive: BTreeSet<String>,
}

impl ResolvedSettings {
    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SettingValue::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SettingValue::as_int)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(SettingValue::as_bool)
    }

    pub fn set(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.get(name).and_then(SettingValue::as_set)
    }

    pub fn map(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.get(name).and_then(SettingValue::as_map)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(name)
    }

    /// All values as a JSON object, secrets included
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// All values as a JSON object with sensitive values replaced
    pub fn to_json_redacted(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| {
                    let shown = if self.sensitive.contains(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        v.to_json()
                    };
                    (k.clone(), shown)
                })
                .collect(),
        )
    }

    /// Canonical serialization: sorted keys, sorted sets, no whitespace
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

impl fmt::Debug for ResolvedSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.values {
            if self.sensitive.contains(k) {
                map.entry(k, &REDACTED);
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}
