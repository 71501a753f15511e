//! Local host probes and the public-IP cache handle.

mod host;
mod public_ip;

pub use host::{StaticHostProbe, SystemHostProbe};
pub use public_ip::PublicIpCache;
