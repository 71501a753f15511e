// # Settings Schema
//
// Declares every known setting: its type, whether it is required, how it is
// derived when no source supplies it, and how it is validated.
//
// ## Evaluation order
//
// Derivation rules form a small dependency graph (a fallback to a sibling, or
// a computed value reading earlier settings). The graph is sorted once, when
// the schema is built:
//
// ```text
//   parent_dns_domain ──► admin_parent_dns_domain ──► stable_public_dns_name
//          │                        │
//          ▼                        ▼
//   default_app_dns_name     traefik_dashboard_dns_name
// ```
//
// Unknown references and cycles are reported by `SchemaBuilder::build`, so a
// broken schema fails at startup and never in the middle of a resolution.
// Ties are broken by declaration order, which keeps evaluation deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::validate::Validator;
use super::value::{SettingKind, SettingValue};
use crate::traits::HostProbe;
use crate::{Error, Result};

/// Computes a value from already-resolved settings
///
/// Returning `Ok(None)` means "no value"; the resolver then reports a
/// missing required setting or leaves an optional one unset.
pub type DeriveFn = fn(&DerivationContext<'_>) -> Result<Option<SettingValue>>;

/// Post-processes a raw or derived value before validation
pub type NormalizeFn = fn(SettingValue, &DerivationContext<'_>) -> Result<SettingValue>;

/// How a setting gets its value when no source supplies one
#[derive(Debug, Clone)]
pub enum Derivation {
    /// Only an explicitly supplied value is used
    Explicit,
    /// A documented constant default
    Constant(SettingValue),
    /// The value of a sibling setting
    Fallback(&'static str),
    /// A pure function of the declared dependencies (and the host probe)
    Computed {
        deps: Vec<&'static str>,
        compute: DeriveFn,
    },
}

/// Definition of a single setting
#[derive(Debug, Clone)]
pub struct SettingDef {
    name: &'static str,
    kind: SettingKind,
    required_hint: Option<String>,
    derivation: Derivation,
    normalize: Option<(Vec<&'static str>, NormalizeFn)>,
    validator: Option<Validator>,
    sensitive: bool,
    description: &'static str,
}

impl SettingDef {
    pub fn new(name: &'static str, kind: SettingKind) -> Self {
        Self {
            name,
            kind,
            required_hint: None,
            derivation: Derivation::Explicit,
            normalize: None,
            validator: None,
            sensitive: false,
            description: "",
        }
    }

    /// Mark the setting as required, with a remediation hint
    pub fn required(mut self, hint: impl Into<String>) -> Self {
        self.required_hint = Some(hint.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<SettingValue>) -> Self {
        self.derivation = Derivation::Constant(value.into());
        self
    }

    pub fn fallback(mut self, sibling: &'static str) -> Self {
        self.derivation = Derivation::Fallback(sibling);
        self
    }

    pub fn derive(mut self, deps: &[&'static str], compute: DeriveFn) -> Self {
        self.derivation = Derivation::Computed {
            deps: deps.to_vec(),
            compute,
        };
        self
    }

    pub fn normalize(mut self, deps: &[&'static str], normalize: NormalizeFn) -> Self {
        self.normalize = Some((deps.to_vec(), normalize));
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Secrets and password hashes: values are redacted in errors and debug output
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> SettingKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required_hint.is_some()
    }

    pub fn required_hint(&self) -> Option<&str> {
        self.required_hint.as_deref()
    }

    pub fn derivation(&self) -> &Derivation {
        &self.derivation
    }

    pub fn normalizer(&self) -> Option<NormalizeFn> {
        self.normalize.as_ref().map(|(_, f)| *f)
    }

    pub fn validator(&self) -> Option<Validator> {
        self.validator
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Every setting this one reads, in declaration order, without duplicates
    pub fn dependencies(&self) -> Vec<&'static str> {
        let mut deps = match &self.derivation {
            Derivation::Explicit | Derivation::Constant(_) => Vec::new(),
            Derivation::Fallback(sibling) => vec![*sibling],
            Derivation::Computed { deps, .. } => deps.clone(),
        };
        if let Some((extra, _)) = &self.normalize {
            for dep in extra {
                if !deps.contains(dep) {
                    deps.push(*dep);
                }
            }
        }
        deps
    }
}

/// A validated, topologically sorted set of setting definitions
#[derive(Debug, Clone)]
pub struct Schema {
    settings: Vec<SettingDef>,
    index: HashMap<&'static str, usize>,
    order: Vec<usize>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&SettingDef> {
        self.index.get(name).map(|&i| &self.settings[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Settings in declaration order
    pub fn settings(&self) -> impl Iterator<Item = &SettingDef> {
        self.settings.iter()
    }

    /// Settings in evaluation order (dependencies first)
    pub fn evaluation_order(&self) -> impl Iterator<Item = &SettingDef> {
        self.order.iter().map(|&i| &self.settings[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.settings.iter().map(|s| s.name)
    }

    /// Names of all sensitive settings
    pub fn sensitive_names(&self) -> BTreeSet<String> {
        self.settings
            .iter()
            .filter(|s| s.sensitive)
            .map(|s| s.name.to_string())
            .collect()
    }
}

/// Collects setting definitions and validates them into a [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    settings: Vec<SettingDef>,
}

impl SchemaBuilder {
    pub fn setting(mut self, def: SettingDef) -> Self {
        self.settings.push(def);
        self
    }

    /// Validate references and compute the evaluation order
    ///
    /// # Errors
    ///
    /// - `SchemaDefinition` for duplicate names or references to undeclared settings
    /// - `SchemaCycle` if the dependency graph is not acyclic
    pub fn build(self) -> Result<Schema> {
        let mut index = HashMap::with_capacity(self.settings.len());
        for (i, def) in self.settings.iter().enumerate() {
            if index.insert(def.name, i).is_some() {
                return Err(Error::schema(format!(
                    "setting '{}' is declared more than once",
                    def.name
                )));
            }
        }

        let deps: Vec<Vec<usize>> = self
            .settings
            .iter()
            .map(|def| {
                def.dependencies()
                    .into_iter()
                    .map(|dep| {
                        index.get(dep).copied().ok_or_else(|| {
                            Error::schema(format!(
                                "setting '{}' depends on unknown setting '{}'",
                                def.name, dep
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<_>>()?;

        let order = topological_order(&deps).map_err(|cycle| Error::SchemaCycle {
            cycle: cycle
                .into_iter()
                .map(|i| self.settings[i].name.to_string())
                .collect(),
        })?;

        Ok(Schema {
            settings: self.settings,
            index,
            order,
        })
    }
}

/// Kahn's algorithm with ties broken by index; on failure returns a cycle
fn topological_order(deps: &[Vec<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = deps.len();
    let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); n];
    for (node, node_deps) in deps.iter().enumerate() {
        for &dep in node_deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &dependents[node] {
            remaining[next] -= 1;
            if remaining[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    // Every unsorted node still waits on another unsorted node, so following
    // those edges from any of them must revisit a node.
    let unsorted: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] > 0).collect();
    let mut seen = BTreeMap::new();
    let mut path = Vec::new();
    let mut current = unsorted.first().copied().unwrap_or_default();
    loop {
        if let Some(&pos) = seen.get(&current) {
            let mut cycle: Vec<usize> = path[pos..].to_vec();
            cycle.push(current);
            return Err(cycle);
        }
        seen.insert(current, path.len());
        path.push(current);
        match deps[current].iter().find(|d| unsorted.contains(d)) {
            Some(&next) => current = next,
            None => return Err(path),
        }
    }
}

/// What a derivation or normalization function may see
///
/// Reads are restricted to the setting's declared dependencies, so the
/// evaluation order computed at build time is always sufficient.
pub struct DerivationContext<'a> {
    setting: &'static str,
    allowed: &'a [&'static str],
    resolved: &'a BTreeMap<String, SettingValue>,
    probe: &'a dyn HostProbe,
}

impl<'a> DerivationContext<'a> {
    pub(crate) fn new(
        setting: &'static str,
        allowed: &'a [&'static str],
        resolved: &'a BTreeMap<String, SettingValue>,
        probe: &'a dyn HostProbe,
    ) -> Self {
        Self {
            setting,
            allowed,
            resolved,
            probe,
        }
    }

    /// Name of the setting being derived
    pub fn setting(&self) -> &'static str {
        self.setting
    }

    pub fn get(&self, name: &str) -> Result<Option<&'a SettingValue>> {
        if !self.allowed.iter().any(|dep| *dep == name) {
            return Err(Error::schema(format!(
                "setting '{}' reads '{}' without declaring it as a dependency",
                self.setting, name
            )));
        }
        Ok(self.resolved.get(name))
    }

    pub fn str(&self, name: &str) -> Result<Option<&'a str>> {
        Ok(self.get(name)?.and_then(SettingValue::as_str))
    }

    /// Like [`str`](Self::str) but an absent dependency is an error
    pub fn require_str(&self, name: &str) -> Result<&'a str> {
        self.str(name)?.ok_or_else(|| {
            Error::missing(name, format!("needed to derive '{}'", self.setting))
        })
    }

    pub fn probe(&self) -> &'a dyn HostProbe {
        self.probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
        Ok(Some(format!("{}.x", ctx.require_str("a")?).into()))
    }

    #[test]
    fn evaluation_order_puts_dependencies_first() {
        let schema = Schema::builder()
            .setting(SettingDef::new("c", SettingKind::Str).derive(&["b"], concat))
            .setting(SettingDef::new("b", SettingKind::Str).fallback("a"))
            .setting(SettingDef::new("a", SettingKind::Str))
            .build()
            .unwrap();

        let order: Vec<_> = schema.evaluation_order().map(SettingDef::name).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        let declared: Vec<_> = schema.names().collect();
        assert_eq!(declared, vec!["c", "b", "a"]);
    }

    #[test]
    fn independent_settings_keep_declaration_order() {
        let schema = Schema::builder()
            .setting(SettingDef::new("z", SettingKind::Int))
            .setting(SettingDef::new("y", SettingKind::Int))
            .setting(SettingDef::new("x", SettingKind::Int))
            .build()
            .unwrap();
        let order: Vec<_> = schema.evaluation_order().map(SettingDef::name).collect();
        assert_eq!(order, vec!["z", "y", "x"]);
    }

    #[test]
    fn cycle_is_reported_at_build_time() {
        let err = Schema::builder()
            .setting(SettingDef::new("first", SettingKind::Str))
            .setting(SettingDef::new("a", SettingKind::Str).fallback("b"))
            .setting(SettingDef::new("b", SettingKind::Str).derive(&["c"], concat))
            .setting(SettingDef::new("c", SettingKind::Str).fallback("a"))
            .build()
            .unwrap_err();

        match err {
            Error::SchemaCycle { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                for name in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|n| n == name), "{name} missing from {cycle:?}");
                }
                assert!(!cycle.iter().any(|n| n == "first"));
            }
            other => panic!("expected SchemaCycle, got {other:?}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = Schema::builder()
            .setting(SettingDef::new("loop", SettingKind::Str).fallback("loop"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::SchemaCycle { .. }));
    }

    #[test]
    fn unknown_reference_is_a_definition_error() {
        let err = Schema::builder()
            .setting(SettingDef::new("a", SettingKind::Str).fallback("nope"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::SchemaDefinition(msg) if msg.contains("nope")));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Schema::builder()
            .setting(SettingDef::new("a", SettingKind::Str))
            .setting(SettingDef::new("a", SettingKind::Int))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::SchemaDefinition(_)));
    }
}
