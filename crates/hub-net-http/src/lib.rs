// # HTTP Address Lookups
//
// HTTP implementations of the address lookup traits used by the DNS
// reconciler's target verification.
//
// - `HttpPublicIp`: the network's public IPv4 address, from a plain-text
//   "what is my IP" service (ipify by default)
// - `DohResolver`: public resolution of a name through a DNS-over-HTTPS
//   JSON API (Google Public DNS by default)
//
// ## Architecture
//
// Both are single-shot: one request per call, no polling, no caching and
// no retries. Wrap `HttpPublicIp` in `hub_core::net::PublicIpCache` when the
// address is needed more than once.

use async_trait::async_trait;
use hub_core::traits::{PublicIpLookup, TargetResolver};
use hub_core::{Error, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default public IP service; returns the address as plain text
pub const DEFAULT_IP_SERVICE: &str = "https://api.ipify.org";

/// Default DNS-over-HTTPS JSON endpoint
pub const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google/resolve";

/// Timeout for lookups
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// DNS RR type code for A records
const TYPE_A: u16 = 1;

/// DNS RCODE for a name that does not exist
const RCODE_NXDOMAIN: u32 = 3;

fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))
}

/// Public IPv4 lookup over HTTP
#[derive(Debug, Clone)]
pub struct HttpPublicIp {
    url: String,
    client: reqwest::Client,
}

impl HttpPublicIp {
    pub fn new() -> Result<Self> {
        Self::with_url(DEFAULT_IP_SERVICE)
    }

    /// Use another service that answers with the bare address
    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            client: client()?,
        })
    }
}

#[async_trait]
impl PublicIpLookup for HttpPublicIp {
    async fn current_ipv4(&self) -> Result<Ipv4Addr> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "{} answered with status {}",
                self.url,
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;
        let ip = parse_ipv4_text(&text)?;
        tracing::debug!("Public IPv4 address is {}", ip);
        Ok(ip)
    }
}

/// Parse a plain-text IPv4 answer, rejecting IPv6
fn parse_ipv4_text(text: &str) -> Result<Ipv4Addr> {
    let text = text.trim();
    text.parse().map_err(|_| {
        Error::http(format!("Expected an IPv4 address from the IP service, got '{}'", text))
    })
}

/// Resolver backed by a DNS-over-HTTPS JSON API
#[derive(Debug, Clone)]
pub struct DohResolver {
    endpoint: String,
    client: reqwest::Client,
}

impl DohResolver {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_DOH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: client()?,
        })
    }
}

#[async_trait]
impl TargetResolver for DohResolver {
    async fn resolve_ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/dns-json")
            .query(&[("name", name), ("type", "A")])
            .send()
            .await
            .map_err(|e| Error::http(format!("DNS-over-HTTPS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "DNS-over-HTTPS endpoint answered with status {}",
                response.status()
            )));
        }

        let answer: DohResponse = response
            .json()
            .await
            .map_err(|e| Error::http(format!("Failed to parse DNS-over-HTTPS response: {}", e)))?;
        let addrs = answer.ipv4_addresses(name)?;
        tracing::debug!("{} resolves to {:?}", name, addrs);
        Ok(addrs)
    }
}

/// Subset of the JSON API response
#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

impl DohResponse {
    /// A-record addresses; CNAME steps in the chain are skipped
    fn ipv4_addresses(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        match self.status {
            0 => self
                .answer
                .iter()
                .filter(|a| a.record_type == TYPE_A)
                .map(|a| {
                    a.data.parse().map_err(|_| {
                        Error::http(format!("Invalid A record data '{}' for {}", a.data, name))
                    })
                })
                .collect(),
            RCODE_NXDOMAIN => Ok(Vec::new()),
            rcode => Err(Error::http(format!(
                "DNS lookup of {} failed with RCODE {}",
                name, rcode
            ))),
        }
    }
}
