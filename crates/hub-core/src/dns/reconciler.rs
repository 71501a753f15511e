// # DNS Reconciler
//
// Converges one name in a remote zone to a desired record.
//
// ## Flow
//
// ```text
//   name ──normalize──▶ fqdn ──longest suffix──▶ zone
//   target ──classify──▶ A(ip) | CNAME(fqdn)
//        │
//        ├─ verify_target? resolve target, require exactly [expected]
//        │
//        ▼
//   list records at fqdn (A/CNAME only)
//        │
//        ├─ 0 records      → Create
//        ├─ 1, identical   → Unchanged (or RecordExists without allow_existing)
//        ├─ 1, different   → RecordExists, or with allow_overwrite:
//        │                     same type → Upsert, type change → Delete + Create
//        └─ >1 records     → AmbiguousRecordSet, whatever the policy
// ```
//
// At most one change batch is sent per call. The comparison uses a snapshot
// taken right before the write; a concurrent external change in between is
// not detected.

use std::net::Ipv4Addr;

use super::record::{ChangeBatch, DnsRecord, HostedZone, ReconcileOutcome, RecordType};
use crate::config::DnsPolicy;
use crate::settings::validate::{is_dns_label, is_dns_name};
use crate::traits::{PublicIpLookup, TargetResolver, ZoneApi};
use crate::{Error, Result};

/// Record management fewer than this many labels deep is refused
pub const MIN_NAME_LABELS: usize = 3;

/// Converges DNS records through a [`ZoneApi`]
pub struct DnsReconciler {
    zones: Box<dyn ZoneApi>,
    resolver: Box<dyn TargetResolver>,
    public_ip: Box<dyn PublicIpLookup>,
}

impl std::fmt::Debug for DnsReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsReconciler")
            .field("provider", &self.zones.provider_name())
            .finish_non_exhaustive()
    }
}

impl DnsReconciler {
    pub fn new(
        zones: Box<dyn ZoneApi>,
        resolver: Box<dyn TargetResolver>,
        public_ip: Box<dyn PublicIpLookup>,
    ) -> Self {
        Self {
            zones,
            resolver,
            public_ip,
        }
    }

    /// Make `name` point at `target`
    ///
    /// `target` is an IPv4 literal (A record), a bare label expanded inside
    /// the zone, or a DNS name (CNAME record).
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: malformed name or target, or the zone apex
    /// - `ZoneNotFound`, `TargetMismatch`, `AmbiguousRecordSet`, `RecordExists`
    /// - provider and network errors, unchanged
    pub async fn create_or_update(&self, name: &str, target: &str, policy: &DnsPolicy) -> Result<ReconcileOutcome> {
        policy.validate()?;
        let fqdn = normalize_name(name)?;
        let zone = self.find_zone(&fqdn).await?;
        let (record_type, value) = classify_target(target, &zone)?;
        if record_type == RecordType::Cname && value == fqdn {
            return Err(Error::invalid_input(format!("'{}' cannot be an alias of itself", fqdn)));
        }

        if policy.verify_target {
            self.verify(&record_type, &value, policy).await?;
        }

        let desired = DnsRecord::new(fqdn.clone(), record_type, policy.ttl, value);
        let existing = self.existing(&zone, &fqdn).await?;

        let (batch, outcome) = match existing {
            None => (
                ChangeBatch::new().create(desired.clone()),
                ReconcileOutcome::Created { record: desired },
            ),
            Some(current) if current == desired => {
                if !policy.allow_existing {
                    return Err(Error::RecordExists {
                        name: fqdn,
                        existing: current.to_string(),
                    });
                }
                tracing::debug!("{} already up to date", current);
                return Ok(ReconcileOutcome::Unchanged { record: Some(current) });
            }
            Some(current) => {
                if !policy.allow_overwrite {
                    return Err(Error::RecordExists {
                        name: fqdn,
                        existing: current.to_string(),
                    });
                }
                let batch = if current.record_type == desired.record_type {
                    let mut replacement = desired.clone();
                    replacement.id = current.id.clone();
                    ChangeBatch::new().upsert(replacement)
                } else {
                    ChangeBatch::new().delete(current.clone()).create(desired.clone())
                };
                (
                    batch,
                    ReconcileOutcome::Updated {
                        previous: current,
                        record: desired,
                    },
                )
            }
        };

        self.zones.apply_changes(&zone, &batch).await?;
        tracing::info!("DNS {} via {}", outcome, self.zones.provider_name());
        Ok(outcome)
    }

    /// Remove the A or CNAME record at `name`
    ///
    /// An absent record is `Unchanged` unless `policy.allow_missing` is off.
    pub async fn delete(&self, name: &str, policy: &DnsPolicy) -> Result<ReconcileOutcome> {
        let fqdn = normalize_name(name)?;
        let zone = self.find_zone(&fqdn).await?;

        let Some(current) = self.existing(&zone, &fqdn).await? else {
            if policy.allow_missing {
                tracing::debug!("No record at {}; nothing to delete", fqdn);
                return Ok(ReconcileOutcome::Unchanged { record: None });
            }
            return Err(Error::RecordNotFound { name: fqdn });
        };

        self.zones
            .apply_changes(&zone, &ChangeBatch::new().delete(current.clone()))
            .await?;
        let outcome = ReconcileOutcome::Deleted { record: current };
        tracing::info!("DNS {} via {}", outcome, self.zones.provider_name());
        Ok(outcome)
    }

    /// Zone with the longest name that contains `fqdn`; the apex is refused
    async fn find_zone(&self, fqdn: &str) -> Result<HostedZone> {
        let zone = self
            .zones
            .list_zones()
            .await?
            .into_iter()
            .filter(|z| z.contains(fqdn))
            .max_by_key(|z| z.name.len())
            .ok_or_else(|| Error::ZoneNotFound {
                name: fqdn.to_string(),
            })?;

        if zone.fqdn() == fqdn {
            return Err(Error::invalid_input(format!(
                "'{}' is the apex of zone {}; refusing to manage it",
                fqdn, zone.name
            )));
        }
        tracing::debug!("{} is in zone {} ({})", fqdn, zone.name, zone.id);
        Ok(zone)
    }

    /// The single managed record at `fqdn`, if any
    async fn existing(&self, zone: &HostedZone, fqdn: &str) -> Result<Option<DnsRecord>> {
        let mut records: Vec<DnsRecord> = self
            .zones
            .list_records(zone, fqdn)
            .await?
            .into_iter()
            .filter(|r| r.record_type.is_managed())
            .filter(|r| normalize_fqdn(&r.name) == fqdn)
            .collect();

        match records.len() {
            0 | 1 => Ok(records.pop()),
            count => Err(Error::AmbiguousRecordSet {
                name: fqdn.to_string(),
                count,
            }),
        }
    }

    async fn verify(&self, record_type: &RecordType, value: &str, policy: &DnsPolicy) -> Result<()> {
        let expected = match policy.expected_address {
            Some(address) => address,
            None => self.public_ip.current_ipv4().await?,
        };

        let resolved: Vec<Ipv4Addr> = match record_type {
            RecordType::A => value.parse().map(|ip| vec![ip]).unwrap_or_default(),
            _ => self.resolver.resolve_ipv4(value.trim_end_matches('.')).await?,
        };

        if resolved != [expected] {
            return Err(Error::TargetMismatch {
                target: value.to_string(),
                resolved,
                expected,
            });
        }
        tracing::debug!("Target {} resolves to {}", value, expected);
        Ok(())
    }
}

/// Lower-case `name` and give it a trailing dot
///
/// # Errors
///
/// `InvalidInput` for a leading dot, empty labels, invalid labels, or fewer
/// than [`MIN_NAME_LABELS`] labels.
pub fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let bare = trimmed.strip_suffix('.').unwrap_or(trimmed).to_ascii_lowercase();

    if bare.is_empty() || bare.starts_with('.') {
        return Err(Error::invalid_input(format!("'{}' is not a DNS name", name)));
    }
    let labels: Vec<&str> = bare.split('.').collect();
    if let Some(bad) = labels.iter().find(|l| !is_dns_label(l)) {
        return Err(Error::invalid_input(format!(
            "'{}' has an invalid label '{}'",
            name, bad
        )));
    }
    if labels.len() < MIN_NAME_LABELS {
        return Err(Error::invalid_input(format!(
            "'{}' needs at least {} labels",
            name, MIN_NAME_LABELS
        )));
    }
    Ok(format!("{}.", bare))
}

/// Record type and value for `target` inside `zone`
///
/// - `203.0.113.9` → A `203.0.113.9`
/// - `foo` → CNAME `foo.<zone>.`
/// - `bar.example.com` → CNAME `bar.example.com.`
pub fn classify_target(target: &str, zone: &HostedZone) -> Result<(RecordType, String)> {
    let target = target.trim();
    if target.is_empty() || target == "." {
        return Err(Error::invalid_input("DNS target cannot be empty"));
    }
    if let Ok(ip) = target.parse::<Ipv4Addr>() {
        return Ok((RecordType::A, ip.to_string()));
    }

    let bare = target.strip_suffix('.').unwrap_or(target).to_ascii_lowercase();
    if !bare.contains('.') {
        if !is_dns_label(&bare) {
            return Err(Error::invalid_input(format!("'{}' is not a valid DNS label", target)));
        }
        return Ok((RecordType::Cname, format!("{}.{}.", bare, zone.name)));
    }
    if !is_dns_name(&bare) {
        return Err(Error::invalid_input(format!("'{}' is not a valid DNS name", target)));
    }
    Ok((RecordType::Cname, format!("{}.", bare)))
}

fn normalize_fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.').to_ascii_lowercase())
}
