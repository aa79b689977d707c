use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::batch::job::{BatchExecutionJob, Job};
use crate::batch::pool::{ServiceLease, SharedServicePool};
use crate::batch::prober::probe_into_pool;
use crate::batch::registry::SharedJobRegistry;
use crate::batch::service::{
    BatchService, JobService, ServiceDiscovery, ServiceKind, StorageService,
};
use crate::batch::watcher::WatcherService;
use crate::common::config::GridConfig;
use crate::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Uninitialized,
    Populating,
    Ready,
}

/// Lazily populated service pool of one resource kind.
///
/// The job service cell and the storage cell of an environment are fully
/// independent, so populating one never blocks leases of the other.
pub(crate) struct PoolCell<S: BatchService + ?Sized> {
    kind: ServiceKind,
    state: Mutex<PoolState>,
    populated: Notify,
    pool: SharedServicePool<S>,
}

impl<S: BatchService + ?Sized + 'static> PoolCell<S> {
    fn new(kind: ServiceKind, eviction_threshold: usize) -> Self {
        PoolCell {
            kind,
            state: Mutex::new(PoolState::Uninitialized),
            populated: Notify::new(),
            pool: SharedServicePool::new(eviction_threshold),
        }
    }

    /// Leases a live service, running one populating probe round when the
    /// pool is observed uninitialized or empty. Concurrent callers wait for
    /// the round in flight instead of starting their own.
    async fn lease(
        &self,
        candidates: impl Fn() -> Vec<Arc<S>>,
    ) -> crate::Result<ServiceLease<S>> {
        loop {
            let notified = self.populated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let populate = {
                let mut state = self.state.lock().expect("pool state lock poisoned");
                match *state {
                    PoolState::Ready => match self.pool.lease() {
                        Some(lease) => return Ok(lease),
                        // All services were evicted since the last round.
                        None => {
                            *state = PoolState::Populating;
                            true
                        }
                    },
                    PoolState::Uninitialized => {
                        *state = PoolState::Populating;
                        true
                    }
                    PoolState::Populating => false,
                }
            };

            if populate {
                let candidates = candidates();
                log::debug!(
                    "Populating the {} pool from {} candidates",
                    self.kind,
                    candidates.len()
                );
                let result = probe_into_pool(self.kind, candidates, &self.pool).await;
                {
                    let mut state = self.state.lock().expect("pool state lock poisoned");
                    *state = match result {
                        Ok(()) => PoolState::Ready,
                        Err(_) => PoolState::Uninitialized,
                    };
                }
                self.populated.notify_waiters();
                result?;
            } else {
                notified.await;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SharedServicePool<S> {
        &self.pool
    }
}

/// Execution environment of one target infrastructure. Owns one pool of job
/// submission services and one pool of storage services, both (re)built on
/// demand, and hands submitted jobs over to the registry and the watcher.
pub struct BatchEnvironment {
    name: String,
    discovery: Arc<dyn ServiceDiscovery>,
    runtime_location: PathBuf,
    runtime_memory_mb: u32,
    job_services: PoolCell<dyn JobService>,
    storages: PoolCell<dyn StorageService>,
    registry: SharedJobRegistry,
    watcher: WatcherService,
}

impl Debug for BatchEnvironment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEnvironment")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BatchEnvironment {
    pub fn new(
        name: impl Into<String>,
        discovery: Arc<dyn ServiceDiscovery>,
        config: &GridConfig,
        registry: SharedJobRegistry,
        watcher: WatcherService,
    ) -> Arc<Self> {
        let threshold = config.pools.eviction_threshold;
        let environment = Arc::new(BatchEnvironment {
            name: name.into(),
            discovery,
            runtime_location: config.runtime.location.clone(),
            runtime_memory_mb: config.runtime.memory_mb,
            job_services: PoolCell::new(ServiceKind::JobSubmission, threshold),
            storages: PoolCell::new(ServiceKind::Storage, threshold),
            registry,
            watcher,
        });
        environment
            .watcher
            .on_environment_registered(environment.clone());
        environment
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runtime_location(&self) -> &Path {
        &self.runtime_location
    }

    pub fn runtime_memory_mb(&self) -> u32 {
        self.runtime_memory_mb
    }

    pub fn registry(&self) -> &SharedJobRegistry {
        &self.registry
    }

    /// Accepts a job for execution on this environment: the job is wrapped
    /// with its batch lifecycle, registered, and a deferred dispatch is
    /// scheduled through the watcher. Never blocks on I/O.
    pub fn submit(&self, job: Job) -> JobId {
        let id = job.id;
        log::debug!(
            "Submitting job {id} for capsule {} to environment {}",
            job.capsule,
            self.name
        );
        self.registry
            .register(BatchExecutionJob::new(self.name.clone(), job));
        self.watcher.on_job_submitted(id);
        id
    }

    /// Leases a live job submission service, probing the candidate set first
    /// when the pool is uninitialized or was emptied.
    pub async fn job_service(&self) -> crate::Result<ServiceLease<dyn JobService>> {
        let discovery = &self.discovery;
        self.job_services
            .lease(|| discovery.job_services())
            .await
    }

    /// Leases a live storage service, see [`BatchEnvironment::job_service`].
    pub async fn storage(&self) -> crate::Result<ServiceLease<dyn StorageService>> {
        let discovery = &self.discovery;
        self.storages.lease(|| discovery.storages()).await
    }

    #[cfg(test)]
    pub(crate) fn job_service_pool(&self) -> &SharedServicePool<dyn JobService> {
        self.job_services.pool()
    }
}
