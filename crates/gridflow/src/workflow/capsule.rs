use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::common::error::user_error;
use crate::common::ids::IdCounter;
use crate::workflow::transition::Transition;
use crate::{CapsuleId, Map, SlotId, TransitionId};

/// What the batch layer needs to know to launch one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        TaskSpec { name: name.into() }
    }
}

/// Address of one input slot of a capsule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub capsule: CapsuleId,
    pub slot: SlotId,
}

/// An input port of a capsule; several transitions may end here (fan-in).
#[derive(Debug)]
pub struct Slot {
    pub id: SlotId,
    pub incoming: SmallVec<[TransitionId; 2]>,
}

/// A node of the workflow graph, wrapping one task.
#[derive(Debug)]
pub struct TaskCapsule {
    pub id: CapsuleId,
    pub task: TaskSpec,
    slots: SmallVec<[Slot; 2]>,
    outgoing: SmallVec<[TransitionId; 2]>,
}

impl TaskCapsule {
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }
}

/// Id-addressed workflow graph arena. Transitions always carry both their
/// endpoints; wiring them through the arena keeps that invariant by
/// construction.
#[derive(Default)]
pub struct Workflow {
    capsules: Map<CapsuleId, TaskCapsule>,
    transitions: Map<TransitionId, Transition>,
    capsule_counter: IdCounter,
    transition_counter: IdCounter,
}

impl Workflow {
    pub fn new() -> Self {
        Workflow::default()
    }

    /// Adds a capsule with one default input slot.
    pub fn add_capsule(&mut self, task: TaskSpec) -> CapsuleId {
        let id = CapsuleId::new(self.capsule_counter.increment() as u32);
        let capsule = TaskCapsule {
            id,
            task,
            slots: smallvec::smallvec![Slot {
                id: SlotId::new(0),
                incoming: SmallVec::new(),
            }],
            outgoing: SmallVec::new(),
        };
        self.capsules.insert(id, capsule);
        id
    }

    /// Adds an extra input slot to an existing capsule.
    pub fn add_slot(&mut self, capsule: CapsuleId) -> crate::Result<SlotRef> {
        let Some(entry) = self.capsules.get_mut(&capsule) else {
            return user_error(format!("capsule {capsule} does not exist"));
        };
        let slot = SlotId::new(entry.slots.len() as u32);
        entry.slots.push(Slot {
            id: slot,
            incoming: SmallVec::new(),
        });
        Ok(SlotRef { capsule, slot })
    }

    pub fn default_slot(&self, capsule: CapsuleId) -> crate::Result<SlotRef> {
        match self.capsules.contains_key(&capsule) {
            true => Ok(SlotRef {
                capsule,
                slot: SlotId::new(0),
            }),
            false => user_error(format!("capsule {capsule} does not exist")),
        }
    }

    /// Wires a transition from `start` to the destination slot `end`.
    pub fn add_transition(
        &mut self,
        start: CapsuleId,
        end: SlotRef,
    ) -> crate::Result<TransitionId> {
        if !self.capsules.contains_key(&start) {
            return user_error(format!("start capsule {start} does not exist"));
        }
        let Some(end_capsule) = self.capsules.get_mut(&end.capsule) else {
            return user_error(format!("end capsule {} does not exist", end.capsule));
        };
        let Some(slot) = end_capsule.slots.iter_mut().find(|s| s.id == end.slot) else {
            return user_error(format!(
                "capsule {} has no slot {}",
                end.capsule, end.slot
            ));
        };

        let id = TransitionId::new(self.transition_counter.increment() as u32);
        slot.incoming.push(id);
        self.capsules
            .get_mut(&start)
            .expect("start capsule existence was checked above")
            .outgoing
            .push(id);
        self.transitions.insert(id, Transition::new(id, start, end));
        Ok(id)
    }

    pub fn capsule(&self, id: CapsuleId) -> Option<&TaskCapsule> {
        self.capsules.get(&id)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    pub fn transition_mut(&mut self, id: TransitionId) -> Option<&mut Transition> {
        self.transitions.get_mut(&id)
    }

    pub fn outgoing(&self, capsule: CapsuleId) -> &[TransitionId] {
        self.capsules
            .get(&capsule)
            .map(|c| c.outgoing())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use crate::workflow::capsule::{SlotRef, TaskSpec, Workflow};
    use crate::Error;

    #[test]
    fn test_graph_wiring() {
        let mut workflow = Workflow::new();
        let a = workflow.add_capsule(TaskSpec::new("a"));
        let b = workflow.add_capsule(TaskSpec::new("b"));

        let end = workflow.default_slot(b).unwrap();
        let transition = workflow.add_transition(a, end).unwrap();

        assert_eq!(workflow.outgoing(a), &[transition]);
        let slot = workflow.capsule(b).unwrap().slot(end.slot).unwrap();
        assert_eq!(slot.incoming.as_slice(), &[transition]);
        let stored = workflow.transition(transition).unwrap();
        assert_eq!(stored.start(), a);
        assert_eq!(stored.end(), end);
    }

    #[test]
    fn test_fan_in_on_one_slot() {
        let mut workflow = Workflow::new();
        let a = workflow.add_capsule(TaskSpec::new("a"));
        let b = workflow.add_capsule(TaskSpec::new("b"));
        let c = workflow.add_capsule(TaskSpec::new("c"));

        let end = workflow.default_slot(c).unwrap();
        workflow.add_transition(a, end).unwrap();
        workflow.add_transition(b, end).unwrap();

        let slot = workflow.capsule(c).unwrap().slot(end.slot).unwrap();
        assert_eq!(slot.incoming.len(), 2);
    }

    #[test]
    fn test_extra_slots_keep_their_own_fan_in() {
        let mut workflow = Workflow::new();
        let a = workflow.add_capsule(TaskSpec::new("a"));
        let b = workflow.add_capsule(TaskSpec::new("b"));

        let extra = workflow.add_slot(b).unwrap();
        assert_ne!(extra.slot, workflow.default_slot(b).unwrap().slot);
        workflow.add_transition(a, extra).unwrap();

        let capsule = workflow.capsule(b).unwrap();
        assert_eq!(capsule.slots().len(), 2);
        assert!(capsule.slot(extra.slot).unwrap().incoming.len() == 1);
        assert!(capsule
            .slot(workflow.default_slot(b).unwrap().slot)
            .unwrap()
            .incoming
            .is_empty());
    }

    #[test]
    fn test_transition_endpoints_are_validated() {
        let mut workflow = Workflow::new();
        let a = workflow.add_capsule(TaskSpec::new("a"));
        let b = workflow.add_capsule(TaskSpec::new("b"));

        let missing_slot = SlotRef {
            capsule: b,
            slot: crate::SlotId::new(7),
        };
        let error = workflow.add_transition(a, missing_slot).unwrap_err();
        assert!(matches!(error, Error::UserConfiguration(_)));

        let missing_capsule = SlotRef {
            capsule: crate::CapsuleId::new(99),
            slot: crate::SlotId::new(0),
        };
        let error = workflow.add_transition(a, missing_capsule).unwrap_err();
        assert!(matches!(error, Error::UserConfiguration(_)));
        assert!(workflow.outgoing(a).is_empty());
    }
}
