//! DNS record reconciliation.
//!
//! [`DnsReconciler`] converges a single name in a provider zone to a desired
//! A or CNAME record, idempotently. Provider access is injected through
//! [`crate::traits::ZoneApi`].

pub mod reconciler;
pub mod record;

pub use reconciler::{DnsReconciler, classify_target, normalize_name};
pub use record::{ChangeAction, ChangeBatch, DnsRecord, HostedZone, ReconcileOutcome, RecordChange, RecordType};
