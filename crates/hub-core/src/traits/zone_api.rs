// # Zone API Trait
//
// The account-level view of an authoritative DNS provider that the
// reconciler converges. The reconciler owns every decision (which zone,
// whether a change is needed, what the change is); implementations only
// translate these three calls into provider API requests.
//
// ## Implementations
//
// - Cloudflare: `hub-dns-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use hub_core::dns::DnsReconciler;
//
// let reconciler = DnsReconciler::new(Box::new(zone_api), Box::new(resolver), Box::new(public_ip));
// let outcome = reconciler
//     .create_or_update("ddns.example.com", "203.0.113.9", &DnsPolicy::default())
//     .await?;
// ```

use async_trait::async_trait;

use crate::Result;
use crate::dns::{ChangeBatch, DnsRecord, HostedZone};

/// Read and write access to the zones owned by one provider account
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to the provider's endpoints only
/// - ✅ Parse provider-specific responses into [`DnsRecord`]s
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (the caller decides)
/// - ❌ Decide whether a change is needed (owned by `DnsReconciler`)
/// - ❌ Cache zone or record state between calls
#[async_trait]
pub trait ZoneApi: Send + Sync {
    /// List every zone the account owns
    async fn list_zones(&self) -> Result<Vec<HostedZone>>;

    /// List all records published at exactly `fqdn` (trailing dot, lower case)
    ///
    /// Records of every type are returned; callers filter by type.
    async fn list_records(&self, zone: &HostedZone, fqdn: &str) -> Result<Vec<DnsRecord>>;

    /// Apply a change batch in a single provider call
    ///
    /// # Errors
    ///
    /// Any failure leaves it to the caller to re-read zone state; no partial
    /// success is reported.
    async fn apply_changes(&self, zone: &HostedZone, batch: &ChangeBatch) -> Result<()>;

    /// Short provider name for logs (e.g. `"cloudflare"`)
    fn provider_name(&self) -> &'static str;
}
