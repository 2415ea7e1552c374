//! Change propagation
//!
//! Carries change events from the authoritative write path to every
//! interested subscriber: cache invalidators, replica synchronizers, and
//! forwarders to other processes. Delivery is at-most-once and unordered with
//! respect to other events; nothing is acknowledged, retried or persisted.

mod propagator;

pub use propagator::{ChangePropagator, Subscription, DEFAULT_QUEUE_DEPTH};
