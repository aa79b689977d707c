use std::fmt;
use std::time::{Duration, Instant};

use crate::batch::service::RemoteJobId;
use crate::common::timeutils::{duration_millis, elapsed_millis, now_monotonic};
use crate::workflow::capsule::TaskSpec;
use crate::workflow::context::Context;
use crate::workflow::ticket::Ticket;
use crate::{CapsuleId, JobId, ScopeId};

/// One unit of work produced by the workflow layer.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub capsule: CapsuleId,
    pub task: TaskSpec,
    pub global: Context,
    pub inputs: Context,
    pub ticket: Ticket,
    pub scope: ScopeId,
    /// Set on backup copies issued by the oversubmission watcher.
    pub resubmission_of: Option<JobId>,
}

impl Job {
    pub fn is_resubmission(&self) -> bool {
        self.resubmission_of.is_some()
    }
}

/// Stage of a job whose duration distribution is tracked and thresholded
/// independently: time spent in the queue vs time spent executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleClass {
    Waiting,
    Running,
}

impl SampleClass {
    pub const ALL: [SampleClass; 2] = [SampleClass::Waiting, SampleClass::Running];
}

impl fmt::Display for SampleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleClass::Waiting => f.write_str("waiting"),
            SampleClass::Running => f.write_str("running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchJobState {
    /// Accepted by the environment, not yet handed to a remote service.
    Submitted,
    /// Queued on the remote infrastructure.
    Waiting { since: Instant },
    /// Executing on the remote infrastructure.
    Running { since: Instant, waited: Duration },
    Finished { waited: Duration, ran: Duration },
    Failed { reason: String },
}

/// A [`Job`] bound to the environment it runs on, together with its remote
/// lifecycle.
#[derive(Debug, Clone)]
pub struct BatchExecutionJob {
    pub job: Job,
    pub environment: String,
    pub remote_id: Option<RemoteJobId>,
    state: BatchJobState,
}

impl BatchExecutionJob {
    pub fn new(environment: String, job: Job) -> Self {
        BatchExecutionJob {
            job,
            environment,
            remote_id: None,
            state: BatchJobState::Submitted,
        }
    }

    pub fn state(&self) -> &BatchJobState {
        &self.state
    }

    pub fn is_terminated(&self) -> bool {
        matches!(
            self.state,
            BatchJobState::Finished { .. } | BatchJobState::Failed { .. }
        )
    }

    pub(crate) fn set_waiting(&mut self, remote_id: RemoteJobId) {
        match self.state {
            BatchJobState::Submitted => {
                self.remote_id = Some(remote_id);
                self.state = BatchJobState::Waiting {
                    since: now_monotonic(),
                };
            }
            ref state => self.invalid_transition("waiting", state.clone()),
        }
    }

    pub(crate) fn set_running(&mut self) {
        match self.state {
            BatchJobState::Waiting { since } => {
                self.state = BatchJobState::Running {
                    since: now_monotonic(),
                    waited: since.elapsed(),
                };
            }
            ref state => self.invalid_transition("running", state.clone()),
        }
    }

    pub(crate) fn set_finished(&mut self) {
        match self.state {
            BatchJobState::Running { since, waited } => {
                self.state = BatchJobState::Finished {
                    waited,
                    ran: since.elapsed(),
                };
            }
            ref state => self.invalid_transition("finished", state.clone()),
        }
    }

    pub(crate) fn set_failed(&mut self, reason: String) {
        if self.is_terminated() {
            self.invalid_transition("failed", self.state.clone());
            return;
        }
        self.state = BatchJobState::Failed { reason };
    }

    fn invalid_transition(&self, target: &str, state: BatchJobState) {
        log::warn!(
            "Ignoring an invalid state transition of job {} to {target} from {state:?}",
            self.job.id
        );
    }

    /// Sample class this job currently contributes a running age to.
    pub fn sample_class(&self) -> Option<SampleClass> {
        match self.state {
            BatchJobState::Waiting { .. } => Some(SampleClass::Waiting),
            BatchJobState::Running { .. } => Some(SampleClass::Running),
            _ => None,
        }
    }

    /// Age of the job within its current sample class, in milliseconds.
    pub fn age_in_class(&self) -> Option<u64> {
        match self.state {
            BatchJobState::Waiting { since } | BatchJobState::Running { since, .. } => {
                Some(elapsed_millis(since))
            }
            _ => None,
        }
    }

    /// Completed duration of the given stage, in milliseconds, once the job
    /// has moved past it.
    pub fn completed_duration(&self, class: SampleClass) -> Option<u64> {
        match (class, &self.state) {
            (SampleClass::Waiting, BatchJobState::Running { waited, .. })
            | (SampleClass::Waiting, BatchJobState::Finished { waited, .. }) => {
                Some(duration_millis(*waited))
            }
            (SampleClass::Running, BatchJobState::Finished { ran, .. }) => {
                Some(duration_millis(*ran))
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: BatchJobState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::batch::job::{BatchExecutionJob, BatchJobState, SampleClass};
    use crate::tests::utils::make_job;

    fn execution_job() -> BatchExecutionJob {
        BatchExecutionJob::new("test-env".to_string(), make_job(1, 0))
    }

    #[test]
    fn test_lifecycle_durations() {
        let mut job = execution_job();
        assert_eq!(job.sample_class(), None);

        job.set_waiting("remote-1".to_string());
        assert_eq!(job.sample_class(), Some(SampleClass::Waiting));
        assert_eq!(job.completed_duration(SampleClass::Waiting), None);

        job.set_running();
        assert_eq!(job.sample_class(), Some(SampleClass::Running));
        assert!(job.completed_duration(SampleClass::Waiting).is_some());

        job.set_finished();
        assert_eq!(job.sample_class(), None);
        assert!(job.is_terminated());
        assert!(job.completed_duration(SampleClass::Running).is_some());
    }

    #[test]
    fn test_invalid_transition_is_ignored() {
        let mut job = execution_job();
        job.set_running();
        assert_eq!(*job.state(), BatchJobState::Submitted);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut job = execution_job();
        job.set_failed("submission refused".to_string());
        assert!(job.is_terminated());
        job.set_waiting("remote-1".to_string());
        assert!(matches!(job.state(), BatchJobState::Failed { .. }));
    }

    #[test]
    fn test_forced_ages() {
        let mut job = execution_job();
        job.force_state(BatchJobState::Waiting {
            since: std::time::Instant::now() - Duration::from_millis(250),
        });
        assert!(job.age_in_class().unwrap() >= 250);
    }
}
