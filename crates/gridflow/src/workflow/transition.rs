use crate::workflow::capsule::SlotRef;
use crate::workflow::condition::Condition;
use crate::workflow::context::Context;
use crate::workflow::ticket::Ticket;
use crate::{CapsuleId, JobId, ScopeId, Set, TransitionId};

/// Where a fired transition submits the job of the destination capsule.
pub trait TransitionTarget {
    fn submit_capsule(
        &mut self,
        capsule: CapsuleId,
        inputs: Context,
        ticket: Ticket,
        scope: ScopeId,
    ) -> crate::Result<JobId>;
}

/// Directed edge of the workflow graph. Fires at most once per completion
/// event of its start capsule; a transition without a condition always fires.
#[derive(Debug, Clone)]
pub struct Transition {
    id: TransitionId,
    start: CapsuleId,
    end: SlotRef,
    condition: Option<Condition>,
    filtered: Set<String>,
}

impl Transition {
    pub(crate) fn new(id: TransitionId, start: CapsuleId, end: SlotRef) -> Self {
        Transition {
            id,
            start,
            end,
            condition: None,
            filtered: Set::default(),
        }
    }

    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn start(&self) -> CapsuleId {
        self.start
    }

    pub fn end(&self) -> SlotRef {
        self.end
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn set_condition(&mut self, condition: Condition) {
        self.condition = Some(condition);
    }

    pub fn clear_condition(&mut self) {
        self.condition = None;
    }

    /// Excludes a named variable from propagation along this transition.
    /// Filters are transition-local and idempotent.
    pub fn add_filter(&mut self, name: impl Into<String>) {
        self.filtered.insert(name.into());
    }

    pub fn remove_filter(&mut self, name: &str) {
        self.filtered.remove(name);
    }

    pub fn filtered(&self) -> &Set<String> {
        &self.filtered
    }

    pub fn evaluate(&self, global: &Context, local: &Context) -> crate::Result<bool> {
        match &self.condition {
            Some(condition) => condition.evaluate(global, local),
            None => Ok(true),
        }
    }

    /// Context forwarded to the destination: the local context minus the
    /// filtered variables, duplicated so sibling transitions stay
    /// independent.
    pub fn outbound_context(&self, local: &Context) -> Context {
        local.without(&self.filtered)
    }

    /// Evaluates the condition and, when it holds, submits a job for the
    /// capsule owning the destination slot. The ticket is passed through
    /// unchanged.
    pub fn perform(
        &self,
        global: &Context,
        local: &Context,
        ticket: &Ticket,
        scope: ScopeId,
        target: &mut dyn TransitionTarget,
    ) -> crate::Result<Option<JobId>> {
        if !self.evaluate(global, local)? {
            log::debug!("Transition {} does not fire, its condition is false", self.id);
            return Ok(None);
        }
        let outbound = self.outbound_context(local);
        let job = target.submit_capsule(self.end.capsule, outbound, ticket.clone(), scope)?;
        log::debug!(
            "Transition {} fired towards capsule {} as job {job}",
            self.id,
            self.end.capsule
        );
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tests::utils::context_of;
    use crate::workflow::capsule::{SlotRef, TaskSpec, Workflow};
    use crate::workflow::context::Prototype;

    fn transition_between_two_capsules() -> (Workflow, crate::TransitionId) {
        let mut workflow = Workflow::new();
        let a = workflow.add_capsule(TaskSpec::new("a"));
        let b = workflow.add_capsule(TaskSpec::new("b"));
        let end: SlotRef = workflow.default_slot(b).unwrap();
        let id = workflow.add_transition(a, end).unwrap();
        (workflow, id)
    }

    #[test]
    fn test_filters_are_a_set() {
        let (mut workflow, id) = transition_between_two_capsules();
        let transition = workflow.transition_mut(id).unwrap();

        transition.add_filter("b");
        transition.add_filter("b");
        transition.add_filter(&Prototype::new("c"));
        assert_eq!(transition.filtered().len(), 2);

        transition.remove_filter("c");
        assert_eq!(transition.filtered().len(), 1);
    }

    #[test]
    fn test_outbound_context_applies_filters() {
        let (mut workflow, id) = transition_between_two_capsules();
        let local = context_of(&[("a", json!(1)), ("b", json!(2)), ("c", json!(3))]);

        let transition = workflow.transition_mut(id).unwrap();
        transition.add_filter("b");
        let outbound = transition.outbound_context(&local);
        assert!(outbound.contains("a"));
        assert!(!outbound.contains("b"));
        assert!(outbound.contains("c"));

        // Removing the filter restores the variable on the next firing
        transition.remove_filter("b");
        let outbound = transition.outbound_context(&local);
        assert!(outbound.contains("b"));
    }
}
