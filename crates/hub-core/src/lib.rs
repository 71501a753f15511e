// # hub-core
//
// Core library for the service hub: settings, stack environments and DNS.
//
// ## Architecture Overview
//
// ```text
//   overrides ─┐
//   env vars  ─┤
//   .env file ─┼─▶ Resolver ──▶ ResolvedSettings ──▶ StackEnvCompositor ──▶ EnvironmentDictionary
//   secrets/  ─┤      ▲
//   hub.toml  ─┘      └── Schema (topologically ordered derivation rules)
//      ▲
//      └── SettingsStore (comment-preserving, atomic writes)
//
//   (name, target, policy) ──▶ DnsReconciler ──▶ ZoneApi (provider crate)
// ```
//
// - **settings**: schema, ranked sources, resolver and the `SettingsProvider` handle
// - **stack_env**: layered environment dictionaries for the hub's stacks
// - **store**: the durable settings document
// - **dns**: the record reconciler
// - **traits**: injected collaborators (host probe, IP lookups, zone API)
// - **net**: host probes and the public-IP cache
//
// ## Design Principles
//
// 1. **Explicit handles**: caches are objects passed around, never globals
// 2. **Startup-time schema errors**: cycles and unknown references fail at build
// 3. **No silent fallbacks**: every failure is a typed `Error`
// 4. **Library-first**: `hubctl` is a thin front end over this crate

pub mod config;
pub mod dns;
pub mod error;
pub mod net;
pub mod settings;
pub mod stack_env;
pub mod store;
pub mod traits;

pub use config::{DnsPolicy, HubConfig};
pub use dns::{DnsReconciler, ReconcileOutcome};
pub use error::{Error, Result};
pub use settings::{ResolvedSettings, Resolver, Schema, SettingsProvider, hub_schema};
pub use stack_env::{EnvironmentDictionary, StackEnvCompositor, hub_compositor};
pub use store::SettingsStore;
pub use traits::{HostProbe, PublicIpLookup, TargetResolver, ZoneApi};
