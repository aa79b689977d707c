use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::environment::BatchEnvironment;
use crate::batch::job::SampleClass;
use crate::batch::oversubmission::WorkloadStrategy;
use crate::batch::registry::SharedJobRegistry;
use crate::batch::service::RuntimeJobDescription;
use crate::common::error::GridError;
use crate::common::rpc::{make_rpc_queue, ResponseToken, RpcReceiver, RpcSender};
use crate::{JobId, Map};

#[derive(Debug)]
pub enum WatcherMessage {
    EnvironmentRegistered(Arc<BatchEnvironment>),
    JobSubmitted(JobId),
    JobStateChanged(JobId),
    Stats(ResponseToken<WatcherStats>),
    Quit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub environments: usize,
    pub resubmissions: u64,
}

/// Handle used by environments and embedders to talk to the watcher process.
#[derive(Clone)]
pub struct WatcherService {
    sender: RpcSender<WatcherMessage>,
}

impl WatcherService {
    pub fn on_environment_registered(&self, environment: Arc<BatchEnvironment>) {
        self.send(WatcherMessage::EnvironmentRegistered(environment));
    }

    pub fn on_job_submitted(&self, id: JobId) {
        self.send(WatcherMessage::JobSubmitted(id));
    }

    pub fn on_job_state_changed(&self, id: JobId) {
        self.send(WatcherMessage::JobStateChanged(id));
    }

    pub async fn stats(&self) -> crate::Result<WatcherStats> {
        let (token, response) = ResponseToken::new();
        self.send(WatcherMessage::Stats(token));
        response
            .await
            .map_err(|_| GridError::InternalProcessing("the watcher is gone".to_string()))
    }

    pub fn quit(&self) {
        self.send(WatcherMessage::Quit);
    }

    fn send(&self, message: WatcherMessage) {
        let _ = self.sender.send(message);
    }
}

pub fn create_watcher(
    registry: SharedJobRegistry,
    strategy: Box<dyn WorkloadStrategy>,
    check_interval: Duration,
) -> (WatcherService, impl Future<Output = ()>) {
    let (tx, rx) = make_rpc_queue();
    let process = watcher_process(registry, strategy, check_interval, rx);
    (WatcherService { sender: tx }, process)
}

/// Watcher event loop: reacts to submissions by dispatching jobs to a leased
/// job service, and periodically checks running jobs against the
/// oversubmission threshold of their sample class.
async fn watcher_process(
    registry: SharedJobRegistry,
    strategy: Box<dyn WorkloadStrategy>,
    check_interval: Duration,
    mut receiver: RpcReceiver<WatcherMessage>,
) {
    let mut environments: Map<String, Arc<BatchEnvironment>> = Map::default();
    let mut resubmissions: u64 = 0;

    let mut interval = tokio::time::interval(check_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for environment in environments.values() {
                    resubmissions +=
                        check_environment(environment, &registry, strategy.as_ref());
                }
            }
            message = receiver.recv() => {
                match message {
                    None | Some(WatcherMessage::Quit) => break,
                    Some(WatcherMessage::EnvironmentRegistered(environment)) => {
                        log::debug!("Watching environment {}", environment.name());
                        environments.insert(environment.name().to_string(), environment);
                    }
                    Some(WatcherMessage::JobSubmitted(id)) => {
                        schedule_dispatch(&environments, &registry, id);
                    }
                    Some(WatcherMessage::JobStateChanged(id)) => {
                        log::debug!("Job {id} changed state");
                    }
                    Some(WatcherMessage::Stats(token)) => {
                        token.respond(WatcherStats {
                            environments: environments.len(),
                            resubmissions,
                        });
                    }
                }
            }
        }
    }
    log::debug!("Ending the batch job watcher");
}

/// One oversubmission round over a single environment. Returns the number of
/// backup submissions issued.
fn check_environment(
    environment: &Arc<BatchEnvironment>,
    registry: &SharedJobRegistry,
    strategy: &dyn WorkloadStrategy,
) -> u64 {
    let mut issued = 0;
    for class in SampleClass::ALL {
        let samples = registry.duration_samples(environment.name(), class);
        let threshold = strategy.resubmit_after(class, &samples.finished, &samples.running);

        for (job_id, age) in registry.resubmission_candidates(environment.name(), class) {
            if !threshold.exceeded_by(age) {
                continue;
            }
            match registry.make_backup(job_id) {
                Some(backup) => {
                    let backup_id = environment.submit(backup);
                    log::info!(
                        "Oversubmitting {class} job {job_id} (age {age} ms) as job {backup_id} \
                         on environment {}",
                        environment.name()
                    );
                    issued += 1;
                }
                None => log::warn!("Job {job_id} disappeared before its backup was built"),
            }
        }
    }
    issued
}

/// Spawns the deferred dispatch of a freshly submitted job.
fn schedule_dispatch(
    environments: &Map<String, Arc<BatchEnvironment>>,
    registry: &SharedJobRegistry,
    id: JobId,
) {
    let Some(environment_name) = registry.with_job(id, |job| job.environment.clone()) else {
        log::warn!("Submitted job {id} is not registered, not dispatching it");
        return;
    };
    let Some(environment) = environments.get(&environment_name) else {
        log::warn!("Job {id} belongs to unknown environment {environment_name}");
        return;
    };
    tokio::spawn(dispatch_job(environment.clone(), registry.clone(), id));
}

/// Hands one job over to a leased job submission service and records the
/// outcome in the registry. A failed dispatch fails only this job.
async fn dispatch_job(
    environment: Arc<BatchEnvironment>,
    registry: SharedJobRegistry,
    id: JobId,
) {
    let Some(description) = registry.with_job(id, |job| RuntimeJobDescription {
        runtime_location: environment.runtime_location().to_path_buf(),
        memory_mb: environment.runtime_memory_mb(),
        task: job.job.task.clone(),
        inputs: job.job.inputs.clone(),
    }) else {
        log::warn!("Job {id} disappeared before dispatch");
        return;
    };

    let lease = match environment.job_service().await {
        Ok(lease) => lease,
        Err(error) => {
            log::error!("Could not lease a job service for job {id}: {error}");
            registry.mark_failed(id, error.to_string());
            return;
        }
    };

    match lease.submit(&description).await {
        Ok(remote_id) => {
            log::debug!("Job {id} dispatched to {} as {remote_id}", lease.name());
            registry.mark_waiting(id, remote_id);
        }
        Err(error) => {
            log::error!("Dispatch of job {id} to {} failed: {error:?}", lease.name());
            registry.mark_failed(id, error.to_string());
        }
    }
}
