use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use crate::traits::HostProbe;
use crate::{Error, Result};

/// Address used to pick the outbound interface; no packet is ever sent to it
const DEFAULT_EGRESS_PROBE: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

/// Host probe backed by the operating system
///
/// The LAN address is found by "connecting" an unbound UDP socket to a public
/// address and reading back the local address the kernel chose. UDP connect
/// only selects a route, so this works without network traffic.
#[derive(Debug, Clone)]
pub struct SystemHostProbe {
    egress_probe: Ipv4Addr,
}

impl SystemHostProbe {
    pub fn new() -> Self {
        Self {
            egress_probe: DEFAULT_EGRESS_PROBE,
        }
    }

    /// Use a different address for egress-interface selection
    pub fn with_egress_probe(egress_probe: Ipv4Addr) -> Self {
        Self { egress_probe }
    }
}

impl Default for SystemHostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SystemHostProbe {
    fn hostname(&self) -> Result<String> {
        let name = hostname::get()
            .map_err(|e| Error::host_probe(format!("cannot read host name: {}", e)))?
            .into_string()
            .map_err(|_| Error::host_probe("host name is not valid UTF-8"))?;

        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(Error::host_probe("host name is empty"));
        }
        Ok(name)
    }

    fn lan_ipv4(&self) -> Result<Ipv4Addr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| Error::host_probe(format!("cannot open UDP socket: {}", e)))?;
        socket.connect((self.egress_probe, 53)).map_err(|e| {
            Error::host_probe(format!("no route to {}: {}", self.egress_probe, e))
        })?;

        match socket.local_addr() {
            Ok(SocketAddr::V4(addr)) if !addr.ip().is_unspecified() => Ok(*addr.ip()),
            Ok(other) => Err(Error::host_probe(format!(
                "egress interface has no usable IPv4 address ({})",
                other.ip()
            ))),
            Err(e) => Err(Error::host_probe(format!("cannot read local address: {}", e))),
        }
    }
}

/// Host probe with fixed answers
///
/// A `None` answer is reported as a lookup failure, which lets tests cover
/// the error path of host-derived settings.
#[derive(Debug, Clone, Default)]
pub struct StaticHostProbe {
    hostname: Option<String>,
    lan_ipv4: Option<Ipv4Addr>,
}

impl StaticHostProbe {
    pub fn new(hostname: impl Into<String>, lan_ipv4: impl Into<IpAddr>) -> Self {
        let lan_ipv4 = match lan_ipv4.into() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        };
        Self {
            hostname: Some(hostname.into()),
            lan_ipv4,
        }
    }

    /// A probe whose every lookup fails
    pub fn unavailable() -> Self {
        Self::default()
    }
}

impl HostProbe for StaticHostProbe {
    fn hostname(&self) -> Result<String> {
        self.hostname
            .clone()
            .ok_or_else(|| Error::host_probe("host name unavailable"))
    }

    fn lan_ipv4(&self) -> Result<Ipv4Addr> {
        self.lan_ipv4
            .ok_or_else(|| Error::host_probe("LAN address unavailable"))
    }
}
