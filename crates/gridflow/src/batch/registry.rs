use std::sync::{Arc, Mutex, MutexGuard};

use itertools::Itertools;

use crate::batch::job::{BatchExecutionJob, Job, SampleClass};
use crate::batch::service::RemoteJobId;
use crate::common::ids::IdCounter;
use crate::{JobId, Map};

/// The two empirical samples of one class, rebuilt on every watcher tick.
/// Both sequences are sorted ascending and expressed in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurationSamples {
    pub finished: Vec<u64>,
    pub running: Vec<u64>,
}

pub struct JobRegistry {
    jobs: Map<JobId, BatchExecutionJob>,
    /// Original job to its backup copy.
    backups: Map<JobId, JobId>,
    job_id_counter: IdCounter,
}

impl Default for JobRegistry {
    fn default() -> Self {
        JobRegistry {
            jobs: Map::default(),
            backups: Map::default(),
            job_id_counter: IdCounter::new(1),
        }
    }
}

impl JobRegistry {
    pub fn allocate_job_id(&mut self) -> JobId {
        JobId::new(self.job_id_counter.increment())
    }

    pub fn register(&mut self, execution_job: BatchExecutionJob) {
        let id = execution_job.job.id;
        if let Some(original) = execution_job.job.resubmission_of {
            self.backups.insert(original, id);
        }
        if self.jobs.insert(id, execution_job).is_some() {
            log::warn!("Job {id} was registered twice");
        }
    }

    pub fn get(&self, id: JobId) -> Option<&BatchExecutionJob> {
        self.jobs.get(&id)
    }

    fn get_mut_or_warn(&mut self, id: JobId) -> Option<&mut BatchExecutionJob> {
        let job = self.jobs.get_mut(&id);
        if job.is_none() {
            log::warn!("State change requested for unknown job {id}");
        }
        job
    }

    pub fn mark_waiting(&mut self, id: JobId, remote_id: RemoteJobId) {
        if let Some(job) = self.get_mut_or_warn(id) {
            job.set_waiting(remote_id);
        }
    }

    pub fn mark_running(&mut self, id: JobId) {
        if let Some(job) = self.get_mut_or_warn(id) {
            job.set_running();
        }
    }

    pub fn mark_finished(&mut self, id: JobId) {
        if let Some(job) = self.get_mut_or_warn(id) {
            job.set_finished();
        }
    }

    pub fn mark_failed(&mut self, id: JobId, reason: String) {
        if let Some(job) = self.get_mut_or_warn(id) {
            job.set_failed(reason);
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    fn environment_jobs<'a>(
        &'a self,
        environment: &'a str,
    ) -> impl Iterator<Item = &'a BatchExecutionJob> + 'a {
        self.jobs.values().filter(move |j| j.environment == environment)
    }

    pub fn duration_samples(&self, environment: &str, class: SampleClass) -> DurationSamples {
        let finished = self
            .environment_jobs(environment)
            .filter_map(|j| j.completed_duration(class))
            .sorted()
            .collect();
        let running = self
            .environment_jobs(environment)
            .filter(|j| j.sample_class() == Some(class))
            .filter_map(|j| j.age_in_class())
            .sorted()
            .collect();
        DurationSamples { finished, running }
    }

    fn has_live_backup(&self, id: JobId) -> bool {
        self.backups
            .get(&id)
            .and_then(|backup| self.jobs.get(backup))
            .is_some_and(|backup| !backup.is_terminated())
    }

    /// Jobs of the given class that may still receive a backup submission,
    /// with their current ages in milliseconds.
    pub fn resubmission_candidates(
        &self,
        environment: &str,
        class: SampleClass,
    ) -> Vec<(JobId, u64)> {
        self.environment_jobs(environment)
            .filter(|j| j.sample_class() == Some(class))
            .filter(|j| !j.job.is_resubmission())
            .filter(|j| !self.has_live_backup(j.job.id))
            .filter_map(|j| j.age_in_class().map(|age| (j.job.id, age)))
            .collect()
    }

    /// Builds the backup copy of a registered job under a fresh id.
    pub fn make_backup(&mut self, id: JobId) -> Option<Job> {
        let template = self.jobs.get(&id)?.job.clone();
        let backup_id = self.allocate_job_id();
        Some(Job {
            id: backup_id,
            resubmission_of: Some(id),
            ..template
        })
    }
}

/// Registry handle shared between environments, the watcher and the workflow
/// engine.
#[derive(Clone)]
pub struct SharedJobRegistry {
    inner: Arc<Mutex<JobRegistry>>,
}

impl Default for SharedJobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedJobRegistry {
    pub fn new() -> Self {
        SharedJobRegistry {
            inner: Arc::new(Mutex::new(JobRegistry::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobRegistry> {
        self.inner.lock().expect("job registry lock poisoned")
    }

    pub fn allocate_job_id(&self) -> JobId {
        self.lock().allocate_job_id()
    }

    pub fn register(&self, execution_job: BatchExecutionJob) {
        self.lock().register(execution_job)
    }

    pub fn mark_waiting(&self, id: JobId, remote_id: RemoteJobId) {
        self.lock().mark_waiting(id, remote_id)
    }

    pub fn mark_running(&self, id: JobId) {
        self.lock().mark_running(id)
    }

    pub fn mark_finished(&self, id: JobId) {
        self.lock().mark_finished(id)
    }

    pub fn mark_failed(&self, id: JobId, reason: String) {
        self.lock().mark_failed(id, reason)
    }

    pub fn job_count(&self) -> usize {
        self.lock().job_count()
    }

    pub fn duration_samples(&self, environment: &str, class: SampleClass) -> DurationSamples {
        self.lock().duration_samples(environment, class)
    }

    pub fn resubmission_candidates(
        &self,
        environment: &str,
        class: SampleClass,
    ) -> Vec<(JobId, u64)> {
        self.lock().resubmission_candidates(environment, class)
    }

    pub fn make_backup(&self, id: JobId) -> Option<Job> {
        self.lock().make_backup(id)
    }

    /// Reads one registered job under the registry lock.
    pub fn with_job<R>(&self, id: JobId, f: impl FnOnce(&BatchExecutionJob) -> R) -> Option<R> {
        self.lock().get(id).map(f)
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, id: JobId, state: crate::batch::job::BatchJobState) {
        if let Some(job) = self.lock().jobs.get_mut(&id) {
            job.force_state(state);
        }
    }
}
