use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::batch::oversubmission::DichotomicStrategy;
use crate::batch::registry::SharedJobRegistry;
use crate::batch::service::{
    BatchService, BoxFuture, JobService, RemoteJobId, RuntimeJobDescription, ServiceDiscovery,
    StorageService,
};
use crate::batch::watcher::{create_watcher, WatcherService};
use crate::common::config::GridConfig;
use crate::batch::job::Job;
use crate::workflow::capsule::TaskSpec;
use crate::workflow::context::Context;
use crate::workflow::ticket::Ticket;
use crate::{CapsuleId, JobId, ScopeId, TicketId};

/// Scriptable in-memory service usable as a job submission or a storage
/// endpoint.
pub struct TestService {
    name: String,
    alive: bool,
    probe_delay: Duration,
    probes: Arc<AtomicU32>,
    submissions: Arc<Mutex<Vec<RuntimeJobDescription>>>,
}

impl TestService {
    pub fn alive(name: &str) -> Arc<Self> {
        Self::build(name, true)
    }

    pub fn dead(name: &str) -> Arc<Self> {
        Self::build(name, false)
    }

    fn build(name: &str, alive: bool) -> Arc<Self> {
        Arc::new(TestService {
            name: name.to_string(),
            alive,
            probe_delay: Duration::ZERO,
            probes: Arc::new(AtomicU32::new(0)),
            submissions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn with_probe_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        Arc::new(TestService {
            name: self.name.clone(),
            alive: self.alive,
            probe_delay: delay,
            probes: self.probes.clone(),
            submissions: self.submissions.clone(),
        })
    }

    pub fn probe_counter(&self) -> Arc<AtomicU32> {
        self.probes.clone()
    }

    pub fn submission_log(&self) -> Arc<Mutex<Vec<RuntimeJobDescription>>> {
        self.submissions.clone()
    }
}

impl BatchService for TestService {
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if !self.probe_delay.is_zero() {
                tokio::time::sleep(self.probe_delay).await;
            }
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.alive
        })
    }
}

impl JobService for TestService {
    fn submit<'a>(
        &'a self,
        description: &'a RuntimeJobDescription,
    ) -> BoxFuture<'a, anyhow::Result<RemoteJobId>> {
        Box::pin(async move {
            if !self.alive {
                anyhow::bail!("service {} refused the job", self.name);
            }
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push(description.clone());
            Ok(format!("{}-{}", self.name, submissions.len()))
        })
    }
}

impl StorageService for TestService {
    fn base_uri(&self) -> &str {
        "test://store"
    }
}

/// Discovery over fixed candidate sets.
pub struct StaticDiscovery {
    job_services: Vec<Arc<dyn JobService>>,
    storages: Vec<Arc<dyn StorageService>>,
}

impl StaticDiscovery {
    pub fn new(job_services: Vec<Arc<TestService>>, storages: Vec<Arc<TestService>>) -> Self {
        StaticDiscovery {
            job_services: job_services
                .into_iter()
                .map(|s| s as Arc<dyn JobService>)
                .collect(),
            storages: storages
                .into_iter()
                .map(|s| s as Arc<dyn StorageService>)
                .collect(),
        }
    }

    pub fn with_job_services(job_services: Vec<Arc<TestService>>) -> Self {
        Self::new(job_services, Vec::new())
    }
}

impl ServiceDiscovery for StaticDiscovery {
    fn job_services(&self) -> Vec<Arc<dyn JobService>> {
        self.job_services.clone()
    }

    fn storages(&self) -> Vec<Arc<dyn StorageService>> {
        self.storages.clone()
    }
}

pub fn test_config() -> GridConfig {
    GridConfig::default()
}

/// Watcher handle whose process is not running; messages sent to it are
/// dropped.
pub fn detached_watcher() -> WatcherService {
    let (service, _process) = create_watcher(
        SharedJobRegistry::new(),
        Box::new(DichotomicStrategy::default()),
        Duration::from_secs(3600),
    );
    service
}

pub fn make_job(id: u64, capsule: u32) -> Job {
    Job {
        id: JobId::new(id),
        capsule: CapsuleId::new(capsule),
        task: TaskSpec::new(format!("task-{capsule}")),
        global: Context::new(),
        inputs: Context::new(),
        ticket: Ticket::root(TicketId::new(id)),
        scope: ScopeId::new(0),
        resubmission_of: None,
    }
}

pub fn context_of(values: &[(&str, Value)]) -> Context {
    let mut context = Context::new();
    for (name, value) in values {
        context.insert(*name, value.clone());
    }
    context
}
