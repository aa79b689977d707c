use std::sync::Arc;

use crate::batch::environment::BatchEnvironment;
use crate::batch::job::Job;
use crate::batch::registry::SharedJobRegistry;
use crate::common::error::{internal_error, user_error};
use crate::common::ids::IdCounter;
use crate::workflow::capsule::Workflow;
use crate::workflow::context::Context;
use crate::workflow::ticket::Ticket;
use crate::workflow::transition::TransitionTarget;
use crate::{CapsuleId, JobId, Map, ScopeId, TicketId, TransitionId};

/// Lineage scope results of nested sub-workflows are routed into.
#[derive(Debug)]
pub struct SubWorkflowScope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    running_jobs: u32,
}

impl SubWorkflowScope {
    pub fn running_jobs(&self) -> u32 {
        self.running_jobs
    }
}

/// Completion event of one job, as reported by the embedder.
#[derive(Debug, Clone)]
pub struct FinishedJob {
    pub job: Job,
    /// Output context of the finished task.
    pub outputs: Context,
}

/// Result of firing one outgoing transition: `Ok(None)` when the condition
/// was false, `Ok(Some(id))` when a downstream job was submitted.
#[derive(Debug)]
pub struct TransitionFiring {
    pub transition: TransitionId,
    pub result: crate::Result<Option<JobId>>,
}

/// Drives the workflow graph: reacts to job completions by firing the
/// outgoing transitions of the finished capsule, each of which may submit the
/// next job through the batch environment.
pub struct WorkflowEngine {
    workflow: Workflow,
    global: Context,
    environment: Arc<BatchEnvironment>,
    registry: SharedJobRegistry,
    scopes: Map<ScopeId, SubWorkflowScope>,
    scope_counter: IdCounter,
    ticket_counter: IdCounter,
    root_scope: ScopeId,
}

impl WorkflowEngine {
    pub fn new(workflow: Workflow, global: Context, environment: Arc<BatchEnvironment>) -> Self {
        let registry = environment.registry().clone();
        let mut engine = WorkflowEngine {
            workflow,
            global,
            environment,
            registry,
            scopes: Map::default(),
            scope_counter: IdCounter::new(0),
            ticket_counter: IdCounter::new(1),
            root_scope: ScopeId::new(0),
        };
        engine.root_scope = engine.create_scope(None);
        engine
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    pub fn global(&self) -> &Context {
        &self.global
    }

    pub fn root_scope(&self) -> ScopeId {
        self.root_scope
    }

    pub fn scope(&self, id: ScopeId) -> Option<&SubWorkflowScope> {
        self.scopes.get(&id)
    }

    pub fn create_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId::new(self.scope_counter.increment() as u32);
        self.scopes.insert(
            id,
            SubWorkflowScope {
                id,
                parent,
                running_jobs: 0,
            },
        );
        id
    }

    pub fn new_ticket(&mut self, parent: Option<&Ticket>) -> Ticket {
        let id = TicketId::new(self.ticket_counter.increment());
        match parent {
            Some(parent) => Ticket::child(id, parent.clone()),
            None => Ticket::root(id),
        }
    }

    /// Submits the first job of an execution, under a fresh root ticket.
    pub fn start(&mut self, capsule: CapsuleId, inputs: Context) -> crate::Result<JobId> {
        let ticket = self.new_ticket(None);
        let scope = self.root_scope;
        self.submit_capsule(capsule, inputs, ticket, scope)
    }

    /// Fires every outgoing transition of the finished job's capsule.
    ///
    /// Transitions are evaluated independently: a condition error aborts only
    /// its own firing and is reported alongside the outcomes of its siblings.
    pub fn on_job_finished(&mut self, finished: &FinishedJob) -> Vec<TransitionFiring> {
        if let Some(scope) = self.scopes.get_mut(&finished.job.scope) {
            scope.running_jobs = scope.running_jobs.saturating_sub(1);
        }

        let outgoing: Vec<TransitionId> =
            self.workflow.outgoing(finished.job.capsule).to_vec();
        log::debug!(
            "Job {} of capsule {} finished, firing {} transitions",
            finished.job.id,
            finished.job.capsule,
            outgoing.len()
        );

        outgoing
            .into_iter()
            .map(|transition| TransitionFiring {
                transition,
                result: self.fire(transition, finished),
            })
            .collect()
    }

    fn fire(&mut self, id: TransitionId, finished: &FinishedJob) -> crate::Result<Option<JobId>> {
        let Some(transition) = self.workflow.transition(id).cloned() else {
            return internal_error(format!("transition {id} disappeared from the workflow"));
        };
        let global = self.global.clone();
        transition.perform(
            &global,
            &finished.outputs,
            &finished.job.ticket,
            finished.job.scope,
            self,
        )
    }
}

impl TransitionTarget for WorkflowEngine {
    fn submit_capsule(
        &mut self,
        capsule: CapsuleId,
        inputs: Context,
        ticket: Ticket,
        scope: ScopeId,
    ) -> crate::Result<JobId> {
        let Some(entry) = self.workflow.capsule(capsule) else {
            return user_error(format!("capsule {capsule} does not exist"));
        };
        let task = entry.task.clone();
        let id = self.registry.allocate_job_id();
        if let Some(scope_state) = self.scopes.get_mut(&scope) {
            scope_state.running_jobs += 1;
        }
        let job = Job {
            id,
            capsule,
            task,
            global: self.global.clone(),
            inputs,
            ticket,
            scope,
            resubmission_of: None,
        };
        Ok(self.environment.submit(job))
    }
}
