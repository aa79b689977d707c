use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::workflow::capsule::TaskSpec;
use crate::workflow::context::Context;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resource category of a pooled service, used in error reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    JobSubmission,
    Storage,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::JobSubmission => f.write_str("job submission service"),
            ServiceKind::Storage => f.write_str("storage service"),
        }
    }
}

/// Capability interface of a remote endpoint managed by a service pool.
///
/// `test` has to be safe to run concurrently with the probes of all sibling
/// candidates; a failed or timed-out probe maps to `false`, never to a panic.
pub trait BatchService: Send + Sync {
    /// Identity of the endpoint, unique within one environment. Used as the
    /// pool key.
    fn name(&self) -> &str;

    /// Idempotent availability probe.
    fn test(&self) -> BoxFuture<'_, bool>;
}

pub type RemoteJobId = String;

/// Everything a job submission service needs to launch the execution runtime
/// for one job on the target resource.
#[derive(Debug, Clone)]
pub struct RuntimeJobDescription {
    pub runtime_location: PathBuf,
    pub memory_mb: u32,
    pub task: TaskSpec,
    pub inputs: Context,
}

/// A remote endpoint that can launch the execution runtime.
pub trait JobService: BatchService {
    fn submit<'a>(
        &'a self,
        description: &'a RuntimeJobDescription,
    ) -> BoxFuture<'a, anyhow::Result<RemoteJobId>>;
}

/// A remote store the runtime stages files through. The transfer protocol
/// itself lives behind this boundary.
pub trait StorageService: BatchService {
    fn base_uri(&self) -> &str;
}

/// Supplies the candidate service sets of one target infrastructure.
pub trait ServiceDiscovery: Send + Sync {
    fn job_services(&self) -> Vec<Arc<dyn JobService>>;
    fn storages(&self) -> Vec<Arc<dyn StorageService>>;
}
