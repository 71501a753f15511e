//! Composed environment dictionaries and their dotenv rendering.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::Result;
use crate::store::atomic::write_atomic;

static BARE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:/-]+$").expect("static regex is valid"));

/// A named, flat map of environment variables for one stack
///
/// Values may include secrets, so `Debug` lists keys only.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvironmentDictionary {
    name: String,
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for EnvironmentDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentDictionary")
            .field("name", &self.name)
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EnvironmentDictionary {
    pub fn new(name: impl Into<String>, vars: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            vars,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn into_vars(self) -> BTreeMap<String, String> {
        self.vars
    }

    /// Render as a dotenv file, one `KEY=value` per line in key order
    pub fn to_dotenv(&self) -> String {
        let mut out = format!("# Environment for the '{}' stack. Generated; do not edit.\n", self.name);
        for (key, value) in &self.vars {
            out.push_str(key);
            out.push('=');
            out.push_str(&quote(value));
            out.push('\n');
        }
        out
    }

    /// Write [`to_dotenv`](Self::to_dotenv) atomically, owner-only
    pub async fn write_dotenv(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_dotenv().as_bytes()).await?;
        tracing::info!("Wrote '{}' environment to {}", self.name, path.display());
        Ok(())
    }
}

fn quote(value: &str) -> String {
    if BARE_VALUE.is_match(value) {
        return value.to_string();
    }
    if !value.contains(['\'', '\n', '\r']) {
        return format!("'{}'", value);
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('\n', "\\n")
        .replace('\r', "\\r");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dictionary() -> EnvironmentDictionary {
        EnvironmentDictionary::new(
            "traefik",
            BTreeMap::from([
                ("B_URL".to_string(), "https://hub.example.com/x".to_string()),
                ("A_RULE".to_string(), "Host(`a.example.com`)".to_string()),
                ("C_NOTE".to_string(), "it's here".to_string()),
                ("D_PRICE".to_string(), "it's $5 or ${HOME}".to_string()),
                ("E_HASH".to_string(), "admin:$2y$05$abc".to_string()),
            ]),
        )
    }

    #[test]
    fn dotenv_quotes_only_when_needed() {
        let text = dictionary().to_dotenv();
        let lines: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec![
                "A_RULE='Host(`a.example.com`)'",
                "B_URL=https://hub.example.com/x",
                r#"C_NOTE="it's here""#,
                r#"D_PRICE="it's \$5 or \${HOME}""#,
                "E_HASH='admin:$2y$05$abc'",
            ]
        );
    }

    #[test]
    fn dotenv_output_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("traefik.env");
        std::fs::write(&path, dictionary().to_dotenv()).unwrap();

        let read: BTreeMap<String, String> = dotenvy::from_path_iter(&path)
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(read, dictionary().into_vars());
    }

    #[test]
    fn debug_hides_values() {
        let debug = format!("{:?}", dictionary());
        assert!(debug.contains("A_RULE"));
        assert!(!debug.contains("example.com"));
    }

    #[tokio::test]
    async fn write_dotenv_persists_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stacks/traefik.env");
        dictionary().write_dotenv(&path).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("B_URL="));
    }
}
