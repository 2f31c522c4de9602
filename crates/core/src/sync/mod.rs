//! Offline grade queue domain: models, storage contract, connectivity.

mod connectivity;
mod queue_model;
mod queue_policy;
mod queue_store;

pub use connectivity::*;
pub use queue_model::*;
pub use queue_policy::*;
pub use queue_store::*;
