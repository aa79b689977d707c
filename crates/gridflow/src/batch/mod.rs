pub mod environment;
pub mod job;
pub mod oversubmission;
pub mod pool;
pub mod prober;
pub mod registry;
pub mod service;
pub mod watcher;
