//! Backend dispatch
//!
//! Chooses which backend endpoint serves each request. Rotation state is kept
//! per request class, so search, lookup and purchase traffic each spread over
//! their own endpoint lists.

mod dispatcher;
mod policy;

pub use dispatcher::{Dispatcher, Endpoint, RequestClass};
pub use policy::SelectionPolicy;
