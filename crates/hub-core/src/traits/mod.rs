// Trait definitions for the injected collaborators of the hub core.
//
// Everything that touches the network or the local host sits behind one of
// these traits so resolution and reconciliation can be exercised with test
// doubles.

pub mod host_probe;
pub mod ip_lookup;
pub mod zone_api;

pub use host_probe::HostProbe;
pub use ip_lookup::{PublicIpLookup, TargetResolver};
pub use zone_api::ZoneApi;
