//! Typed setting values and coercion from raw source values.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{Error, Result};

/// Declared type of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Str,
    Int,
    Float,
    Bool,
    /// Unordered set of strings, always iterated sorted
    StrSet,
    StrList,
    /// String-keyed dictionary of strings
    StrMap,
}

impl SettingKind {
    /// Short name used in error messages and generated documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Bool => "boolean",
            Self::StrSet => "string set",
            Self::StrList => "string list",
            Self::StrMap => "string map",
        }
    }

    /// Coerce a raw value into this kind
    ///
    /// Raw values come from JSON-ish sources (the settings document, call-time
    /// overrides) and from plain text sources (environment, dotenv, secrets),
    /// so strings are accepted for every kind and parsed.
    pub fn coerce(&self, name: &str, raw: &Value) -> Result<SettingValue> {
        let mismatch = || {
            Error::validation(name, short_json(raw), format!("expected a {}", self.as_str()))
        };

        match self {
            Self::Str => match raw {
                Value::String(s) => Ok(SettingValue::Str(s.clone())),
                Value::Number(n) => Ok(SettingValue::Str(n.to_string())),
                Value::Bool(b) => Ok(SettingValue::Str(b.to_string())),
                _ => Err(mismatch()),
            },
            Self::Int => match raw {
                Value::Number(n) => n.as_i64().map(SettingValue::Int).ok_or_else(mismatch),
                Value::String(s) => s.trim().parse().map(SettingValue::Int).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Float => match raw {
                Value::Number(n) => n.as_f64().map(SettingValue::Float).ok_or_else(mismatch),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(SettingValue::Float)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Bool => match raw {
                Value::Bool(b) => Ok(SettingValue::Bool(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(SettingValue::Bool(false)),
                    Some(1) => Ok(SettingValue::Bool(true)),
                    _ => Err(mismatch()),
                },
                Value::String(s) => parse_bool(s).map(SettingValue::Bool).ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            Self::StrSet => string_items(raw)
                .map(|items| SettingValue::StrSet(items.into_iter().collect()))
                .ok_or_else(mismatch),
            Self::StrList => string_items(raw).map(SettingValue::StrList).ok_or_else(mismatch),
            Self::StrMap => string_map(raw).map(SettingValue::StrMap).ok_or_else(mismatch),
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved, typed setting value
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    StrSet(BTreeSet<String>),
    StrList(Vec<String>),
    StrMap(BTreeMap<String, String>),
}

impl SettingValue {
    /// The kind this value belongs to
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Str(_) => SettingKind::Str,
            Self::Int(_) => SettingKind::Int,
            Self::Float(_) => SettingKind::Float,
            Self::Bool(_) => SettingKind::Bool,
            Self::StrSet(_) => SettingKind::StrSet,
            Self::StrList(_) => SettingKind::StrList,
            Self::StrMap(_) => SettingKind::StrMap,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::StrSet(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::StrMap(m) => Some(m),
            _ => None,
        }
    }

    /// JSON form of the value
    ///
    /// Sets serialize as sorted arrays, so equal values always produce
    /// identical JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
            Self::StrSet(s) => Value::Array(s.iter().cloned().map(Value::String).collect()),
            Self::StrList(l) => Value::Array(l.iter().cloned().map(Value::String).collect()),
            Self::StrMap(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }

    /// Plain-text rendering used for environment dictionaries
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::StrSet(s) => s.iter().cloned().collect::<Vec<_>>().join(","),
            Self::StrList(l) => l.join(","),
            Self::StrMap(_) => self.to_json().to_string(),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for SettingValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Text form of a JSON scalar, as stored in environment dictionaries
///
/// `null` becomes the empty string, which the compositor later deletes.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn string_items(raw: &Value) -> Option<Vec<String>> {
    match raw {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => None,
                other => scalar_to_string(other),
            })
            .collect(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                let parsed: Value = serde_json::from_str(trimmed).ok()?;
                return string_items(&parsed);
            }
            Some(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        }
        _ => None,
    }
}

fn string_map(raw: &Value) -> Option<BTreeMap<String, String>> {
    match raw {
        Value::Object(entries) => entries
            .iter()
            .map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
            .collect(),
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(s.trim()).ok()?;
            match parsed {
                Value::Object(_) => string_map(&parsed),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Compact, length-limited JSON rendering for error messages
pub(crate) fn short_json(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > 80 {
        let truncated: String = text.chars().take(77).collect();
        format!("{truncated}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_sources_parse_into_scalars() {
        assert_eq!(
            SettingKind::Int.coerce("ttl", &json!(" 600 ")).unwrap(),
            SettingValue::Int(600)
        );
        assert_eq!(
            SettingKind::Bool.coerce("flag", &json!("Yes")).unwrap(),
            SettingValue::Bool(true)
        );
        assert_eq!(
            SettingKind::Float.coerce("ratio", &json!("0.25")).unwrap(),
            SettingValue::Float(0.25)
        );
        assert!(SettingKind::Int.coerce("ttl", &json!("soon")).is_err());
    }

    #[test]
    fn sets_accept_json_text_and_comma_lists() {
        let from_json = SettingKind::StrSet
            .coerce("hosts", &json!(r#"["b.example.com", "a.example.com"]"#))
            .unwrap();
        let from_csv = SettingKind::StrSet
            .coerce("hosts", &json!("a.example.com, b.example.com,"))
            .unwrap();
        assert_eq!(from_json, from_csv);
        assert_eq!(
            from_json.to_json(),
            json!(["a.example.com", "b.example.com"])
        );
    }

    #[test]
    fn map_values_are_coerced_to_strings() {
        let value = SettingKind::StrMap
            .coerce("env", &json!({"PORT": 8080, "DEBUG": true, "UNSET": null}))
            .unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map["PORT"], "8080");
        assert_eq!(map["DEBUG"], "true");
        assert_eq!(map["UNSET"], "");
    }

    #[test]
    fn nested_map_values_are_rejected() {
        let err = SettingKind::StrMap
            .coerce("env", &json!({"NESTED": {"a": 1}}))
            .unwrap_err();
        assert!(matches!(err, Error::SettingValidation { .. }));
    }
}
