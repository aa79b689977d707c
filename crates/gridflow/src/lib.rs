#![deny(clippy::await_holding_refcell_ref)]

pub mod batch;
pub mod common;
pub mod workflow;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::GridError;
pub type Result<T> = std::result::Result<T, Error>;

// Re-exports
pub use crate::common::data_structures::{Map, Set};
pub use crate::common::ids::{CapsuleId, JobId, ScopeId, SlotId, TicketId, TransitionId};
