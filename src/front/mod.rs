//! Front tier: dispatch-and-cache layer in front of the backends

mod tier;

pub use tier::{Answer, ClassLoad, FrontStatus, FrontTier, Source};
