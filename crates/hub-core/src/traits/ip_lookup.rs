// # Address Lookup Traits
//
// The DNS reconciler can verify that a record target actually points at the
// hub before writing it. That needs two external lookups:
//
// - the hub's current public IPv4 address (`PublicIpLookup`)
// - what a DNS name resolves to on the public internet (`TargetResolver`)
//
// ## Implementations
//
// - `hub-net-http`: ipify for the public address, DNS-over-HTTPS for resolution
// - `hub_core::net::PublicIpCache`: memoizing wrapper around any lookup

use async_trait::async_trait;
use std::net::Ipv4Addr;

use crate::Result;

/// Looks up the public IPv4 address of this network
///
/// # Errors
///
/// Network failures are returned as-is. Implementations do not retry.
#[async_trait]
pub trait PublicIpLookup: Send + Sync {
    async fn current_ipv4(&self) -> Result<Ipv4Addr>;
}

/// Resolves a DNS name to its public IPv4 addresses
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Resolve `name` to A-record addresses
    ///
    /// # Returns
    ///
    /// - `Ok(vec![])`: the name does not exist
    /// - `Ok(addrs)`: the addresses, CNAME chains already followed
    /// - `Err(Error)`: the lookup itself failed
    async fn resolve_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>>;
}
