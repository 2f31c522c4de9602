//! Core domain models and contracts for the kelasi offline grade queue.

pub mod errors;
pub mod sync;
