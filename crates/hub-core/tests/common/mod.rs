//! Test doubles and common utilities for contract tests
//!
//! The doubles count the calls they receive so tests can assert that an
//! operation performed (or skipped) a provider mutation.

#![allow(dead_code)]

use hub_core::dns::{ChangeAction, ChangeBatch, DnsRecord, HostedZone, RecordType};
use hub_core::error::{Error, Result};
use hub_core::net::StaticHostProbe;
use hub_core::settings::{RawSource, Resolver, hub_schema};
use hub_core::traits::{HostProbe, PublicIpLookup, TargetResolver, ZoneApi};
use serde_json::json;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const HTPASSWD: &str = "admin:$2y$05$LCmVF2WJY/Ue0avRDcsDmelPqzXQcMIXoRxHF3bR62HuIP.fqqqZm";

/// In-memory provider account holding zones and their records
pub struct MemoryZoneApi {
    zones: Vec<HostedZone>,
    records: Arc<Mutex<Vec<(String, DnsRecord)>>>,
    /// Call counter for apply_changes()
    apply_call_count: Arc<AtomicUsize>,
    /// Call counter for list_records()
    list_call_count: Arc<AtomicUsize>,
    /// Batches received, in order
    batches: Arc<Mutex<Vec<ChangeBatch>>>,
    next_id: Arc<AtomicUsize>,
}

impl MemoryZoneApi {
    /// Account owning the given zones, as (id, name) pairs
    pub fn new(zones: &[(&str, &str)]) -> Self {
        Self {
            zones: zones.iter().map(|(id, name)| HostedZone::new(*id, name)).collect(),
            records: Arc::new(Mutex::new(Vec::new())),
            apply_call_count: Arc::new(AtomicUsize::new(0)),
            list_call_count: Arc::new(AtomicUsize::new(0)),
            batches: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Create a MemoryZoneApi that shares records and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            zones: other.zones.clone(),
            records: Arc::clone(&other.records),
            apply_call_count: Arc::clone(&other.apply_call_count),
            list_call_count: Arc::clone(&other.list_call_count),
            batches: Arc::clone(&other.batches),
            next_id: Arc::clone(&other.next_id),
        }
    }

    /// Publish a record directly, bypassing the counters
    pub fn seed(&self, zone_id: &str, name: &str, record_type: RecordType, value: &str) {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().unwrap().push((
            zone_id.to_string(),
            DnsRecord::new(name, record_type, 300, value).with_id(id),
        ));
    }

    pub fn apply_call_count(&self) -> usize {
        self.apply_call_count.load(Ordering::SeqCst)
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<ChangeBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// Records currently published in `zone_id`
    pub fn records(&self, zone_id: &str) -> Vec<DnsRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(z, _)| z == zone_id)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl ZoneApi for MemoryZoneApi {
    async fn list_zones(&self) -> Result<Vec<HostedZone>> {
        Ok(self.zones.clone())
    }

    async fn list_records(&self, zone: &HostedZone, fqdn: &str) -> Result<Vec<DnsRecord>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records(&zone.id)
            .into_iter()
            .filter(|r| r.name == fqdn)
            .collect())
    }

    async fn apply_changes(&self, zone: &HostedZone, batch: &ChangeBatch) -> Result<()> {
        self.apply_call_count.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(batch.clone());

        let mut records = self.records.lock().unwrap();
        for change in batch.changes() {
            let same_id = |(z, r): &(String, DnsRecord)| *z == zone.id && r.id == change.record.id;
            match change.action {
                ChangeAction::Create => {
                    let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                    records.push((zone.id.clone(), change.record.clone().with_id(id)));
                }
                ChangeAction::Upsert => {
                    let slot = records
                        .iter_mut()
                        .find(|entry| same_id(entry))
                        .ok_or_else(|| Error::provider("memory", "upsert of unknown record"))?;
                    slot.1 = change.record.clone();
                }
                ChangeAction::Delete => {
                    let before = records.len();
                    records.retain(|entry| !same_id(entry));
                    if records.len() == before {
                        return Err(Error::provider("memory", "delete of unknown record"));
                    }
                }
            }
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Resolver answering from a fixed table; unknown names resolve to nothing
#[derive(Default)]
pub struct FixedResolver {
    answers: HashMap<String, Vec<Ipv4Addr>>,
    call_count: Arc<AtomicUsize>,
}

impl FixedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, addrs: &[Ipv4Addr]) -> Self {
        self.answers.insert(name.to_string(), addrs.to_vec());
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TargetResolver for FixedResolver {
    async fn resolve_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.get(name).cloned().unwrap_or_default())
    }
}

/// Public IP lookup returning a fixed address
pub struct FixedPublicIp {
    ip: Ipv4Addr,
    call_count: Arc<AtomicUsize>,
}

impl FixedPublicIp {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            ip: other.ip,
            call_count: Arc::clone(&other.call_count),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PublicIpLookup for FixedPublicIp {
    async fn current_ipv4(&self) -> Result<Ipv4Addr> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to race the lookup
        tokio::task::yield_now().await;
        Ok(self.ip)
    }
}

/// Probe for a hub called `rpi-hub` at 192.168.1.20
pub fn test_probe() -> Arc<StaticHostProbe> {
    Arc::new(StaticHostProbe::new("rpi-hub", [192, 168, 1, 20]))
}

/// Host probe that counts hostname lookups, one per resolution
pub struct CountingProbe {
    inner: StaticHostProbe,
    hostname_calls: Arc<AtomicUsize>,
}

impl CountingProbe {
    pub fn new() -> Self {
        Self {
            inner: StaticHostProbe::new("rpi-hub", [192, 168, 1, 20]),
            hostname_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn hostname_calls(&self) -> usize {
        self.hostname_calls.load(Ordering::SeqCst)
    }
}

impl HostProbe for CountingProbe {
    fn hostname(&self) -> Result<String> {
        self.hostname_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.hostname()
    }

    fn lan_ipv4(&self) -> Result<Ipv4Addr> {
        self.inner.lan_ipv4()
    }
}

/// Resolver over the hub schema with [`test_probe`]
pub fn hub_resolver() -> Resolver {
    Resolver::new(Arc::new(hub_schema().expect("hub schema builds")), test_probe())
}

/// The smallest set of values that satisfies every required hub setting
pub fn minimal_settings(domain: &str) -> RawSource {
    serde_json::from_value(json!({
        "parent_dns_domain": domain,
        "letsencrypt_owner_email": format!("ops@{}", domain),
        "portainer_agent_secret": "0123456789abcdef0123",
        "traefik_dashboard_htpasswd": HTPASSWD,
    }))
    .expect("static settings are a JSON object")
}
