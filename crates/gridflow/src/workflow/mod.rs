pub mod capsule;
pub mod condition;
pub mod context;
pub mod execution;
pub mod ticket;
pub mod transition;
