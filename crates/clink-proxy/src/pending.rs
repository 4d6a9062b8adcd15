use std::collections::BTreeSet;

use crate::types::ActionId;

/// One-shot actions requested by the supervisor and not yet handed to a
/// remote since the last successful hand-off.
#[derive(Debug, Clone, Default)]
pub struct PendingActionSet {
    pending: BTreeSet<ActionId>,
}

impl PendingActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, action: ActionId) {
        self.pending.insert(action);
    }

    pub fn clear(&mut self, action: ActionId) {
        self.pending.remove(&action);
    }

    pub fn is_pending(&self, action: ActionId) -> bool {
        self.pending.contains(&action)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending actions in declaration order.
    pub fn snapshot(&self) -> Vec<ActionId> {
        self.pending.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent_and_clear_removes() {
        let mut pending = PendingActionSet::new();
        assert!(pending.is_empty());
        pending.mark(ActionId::PreCreateUsers);
        pending.mark(ActionId::InitBootUser);
        pending.mark(ActionId::PreCreateUsers);
        assert_eq!(
            pending.snapshot(),
            vec![ActionId::InitBootUser, ActionId::PreCreateUsers]
        );

        pending.clear(ActionId::InitBootUser);
        assert!(!pending.is_pending(ActionId::InitBootUser));
        assert!(pending.is_pending(ActionId::PreCreateUsers));

        pending.clear(ActionId::InitBootUser);
        assert_eq!(pending.snapshot(), vec![ActionId::PreCreateUsers]);
    }
}
