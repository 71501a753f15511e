// # DNS Record Types
//
// Provider-neutral shapes exchanged between the reconciler and a `ZoneApi`.
//
// Names are stored fully qualified: lower case with a trailing dot
// (`ddns.example.com.`). Zone names are stored without the trailing dot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An authoritative zone owned by the provider account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    /// Provider-specific zone id
    pub id: String,
    /// Zone name, lower case, no trailing dot
    pub name: String,
}

impl HostedZone {
    pub fn new(id: impl Into<String>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.trim_end_matches('.').to_ascii_lowercase(),
        }
    }

    /// Zone apex as a fully-qualified name
    pub fn fqdn(&self) -> String {
        format!("{}.", self.name)
    }

    /// Whether `fqdn` is the apex or lies below it
    pub fn contains(&self, fqdn: &str) -> bool {
        let name = fqdn.trim_end_matches('.');
        name == self.name
            || name
                .strip_suffix(&self.name)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Record type; only A and CNAME are managed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Cname,
    Other(String),
}

impl RecordType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "CNAME" => Self::Cname,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::A => "A",
            Self::Cname => "CNAME",
            Self::Other(s) => s,
        }
    }

    /// Types the reconciler treats as "the record at this name"
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::A | Self::Cname)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One published record
///
/// Equality compares name, type, ttl and value; the provider id is ignored.
#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: RecordType,
    pub ttl: u32,
    /// IPv4 literal for A, fully-qualified target for CNAME
    pub value: String,
    pub id: Option<String>,
}

impl DnsRecord {
    pub fn new(name: impl Into<String>, record_type: RecordType, ttl: u32, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_type,
            ttl,
            value: value.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl PartialEq for DnsRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.record_type == other.record_type
            && self.ttl == other.ttl
            && self.value == other.value
    }
}

impl Eq for DnsRecord {}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.ttl, self.record_type, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    /// Replace the record identified by `record.id` in place
    Upsert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub action: ChangeAction,
    pub record: DnsRecord,
}

/// Changes applied together in one provider call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    changes: Vec<RecordChange>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(mut self, record: DnsRecord) -> Self {
        self.changes.push(RecordChange {
            action: ChangeAction::Create,
            record,
        });
        self
    }

    pub fn upsert(mut self, record: DnsRecord) -> Self {
        self.changes.push(RecordChange {
            action: ChangeAction::Upsert,
            record,
        });
        self
    }

    pub fn delete(mut self, record: DnsRecord) -> Self {
        self.changes.push(RecordChange {
            action: ChangeAction::Delete,
            record,
        });
        self
    }

    pub fn changes(&self) -> &[RecordChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Result of a reconciler call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No record existed; one was created
    Created { record: DnsRecord },
    /// A differing record was replaced
    Updated { previous: DnsRecord, record: DnsRecord },
    /// The record was removed
    Deleted { record: DnsRecord },
    /// Nothing to do: the record already matched, or was already absent
    Unchanged { record: Option<DnsRecord> },
}

impl ReconcileOutcome {
    /// A change batch was sent to the provider
    pub fn is_applied(&self) -> bool {
        !self.is_noop()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { record } => write!(f, "created {}", record),
            Self::Updated { previous, record } => write!(f, "updated {} (was {})", record, previous),
            Self::Deleted { record } => write!(f, "deleted {}", record),
            Self::Unchanged { record: Some(record) } => write!(f, "unchanged {}", record),
            Self::Unchanged { record: None } => f.write_str("unchanged (no record)"),
        }
    }
}
