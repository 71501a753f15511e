//! Schema-driven settings resolution.
//!
//! - [`schema`]: setting definitions and the dependency-ordered schema
//! - [`resolver`]: merging ranked sources into a [`ResolvedSettings`] snapshot
//! - [`sources`]: environment, dotenv and secrets-directory layers
//! - [`provider`]: the memoizing [`SettingsProvider`] handle
//! - [`hub`]: the service hub's own schema

pub mod hub;
pub mod provider;
pub mod resolver;
pub mod schema;
pub mod sources;
pub mod validate;
pub mod value;

pub use hub::hub_schema;
pub use provider::SettingsProvider;
pub use resolver::{RawSource, ResolvedSettings, Resolver, SourceLayer};
pub use schema::{Derivation, DerivationContext, Schema, SchemaBuilder, SettingDef};
pub use sources::EnvSource;
pub use value::{SettingKind, SettingValue};
