//! Replica maintenance
//!
//! A replica is a best-effort mirror of the authoritative store. It is never
//! a source of truth and may lag or briefly regress when events arrive out of
//! order.

mod synchronizer;

pub use synchronizer::{ApplyMode, BootstrapOutcome, ReplicaSynchronizer};
