// # Host Probe Trait
//
// A few settings default to facts about the machine the hub runs on: its
// host name and the LAN address it uses for outbound traffic. Those lookups
// go through this trait so resolution stays deterministic under test.
//
// ## Implementations
//
// - `SystemHostProbe`: asks the operating system (`hub_core::net`)
// - `StaticHostProbe`: fixed answers, for tests and offline use

use std::net::Ipv4Addr;

use crate::Result;

/// Source of local host facts used by derivation rules
///
/// # Errors
///
/// Implementations must return [`Error::HostProbe`](crate::Error::HostProbe)
/// when a lookup fails. They must never substitute a made-up default: the
/// caller needs to tell "used a documented default" apart from "the lookup
/// broke".
pub trait HostProbe: Send + Sync {
    /// Short host name of this machine (e.g. `"rpi-hub"`)
    fn hostname(&self) -> Result<String>;

    /// IPv4 address of the interface used to reach the internet
    fn lan_ipv4(&self) -> Result<Ipv4Addr>;
}
