use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::TicketId;

/// Lineage identifier of a running job. A transition passes the ticket of the
/// finished job through unchanged, which is what routes results into the
/// right, possibly nested, sub-workflow scope.
#[derive(Debug, Clone)]
pub struct Ticket {
    id: TicketId,
    parent: Option<Arc<Ticket>>,
}

impl Ticket {
    pub fn root(id: TicketId) -> Self {
        Ticket { id, parent: None }
    }

    pub fn child(id: TicketId, parent: Ticket) -> Self {
        Ticket {
            id,
            parent: Some(Arc::new(parent)),
        }
    }

    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn parent(&self) -> Option<&Ticket> {
        self.parent.as_deref()
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(ticket) = current {
            depth += 1;
            current = ticket.parent();
        }
        depth
    }

    /// True when `ancestor` appears in this ticket's parent chain (or is the
    /// ticket itself).
    pub fn descends_from(&self, ancestor: &Ticket) -> bool {
        let mut current = Some(self);
        while let Some(ticket) = current {
            if ticket.id == ancestor.id {
                return true;
            }
            current = ticket.parent();
        }
        false
    }
}

impl PartialEq for Ticket {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Ticket {}

impl Hash for Ticket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use crate::workflow::ticket::Ticket;
    use crate::TicketId;

    #[test]
    fn test_lineage() {
        let root = Ticket::root(TicketId::new(1));
        let child = Ticket::child(TicketId::new(2), root.clone());
        let grandchild = Ticket::child(TicketId::new(3), child.clone());

        assert_eq!(root.depth(), 0);
        assert_eq!(grandchild.depth(), 2);
        assert!(grandchild.descends_from(&root));
        assert!(grandchild.descends_from(&grandchild));
        assert!(!root.descends_from(&child));
    }
}
