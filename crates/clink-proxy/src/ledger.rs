//! Per-user lifecycle ledger.
//!
//! The ledger keeps only the furthest stage observed for each running user,
//! plus the last switch (`current_user`, `previous_user`). That is enough to
//! rebuild the catch-up sequence a freshly connected companion needs, without
//! retaining an event log.

use std::collections::BTreeMap;

use crate::types::{LifecycleStage, UserId};

/// Outcome of recording a single event into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// The user's stored stage moved forward (or the user was added).
    Advanced,
    /// The event did not move the stored stage; the entry is unchanged.
    Ignored,
    /// The user was removed from the ledger.
    Erased,
}

/// A notification the replay wants delivered, before it is timestamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayItem {
    pub stage: LifecycleStage,
    pub from: UserId,
    pub to: UserId,
}

impl ReplayItem {
    fn new(stage: LifecycleStage, from: UserId, to: UserId) -> Self {
        Self { stage, from, to }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleLedger {
    stage_by_user: BTreeMap<UserId, LifecycleStage>,
    system_user: UserId,
    current_user: UserId,
    previous_user: UserId,
}

impl LifecycleLedger {
    pub fn new(system_user: UserId) -> Self {
        Self {
            stage_by_user: BTreeMap::new(),
            system_user,
            current_user: system_user,
            previous_user: UserId::NULL,
        }
    }

    pub fn system_user(&self) -> UserId {
        self.system_user
    }

    pub fn current_user(&self) -> UserId {
        self.current_user
    }

    pub fn previous_user(&self) -> UserId {
        self.previous_user
    }

    pub fn stage_of(&self, user: UserId) -> Option<LifecycleStage> {
        self.stage_by_user.get(&user).copied()
    }

    pub fn len(&self) -> usize {
        self.stage_by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stage_by_user.is_empty()
    }

    /// Users with a recorded stage, ascending by id.
    pub fn users(&self) -> impl Iterator<Item = (UserId, LifecycleStage)> + '_ {
        self.stage_by_user.iter().map(|(user, stage)| (*user, *stage))
    }

    pub fn record(&mut self, stage: LifecycleStage, from: UserId, to: UserId) -> LedgerUpdate {
        if !stage.is_progress() {
            return match self.stage_by_user.remove(&to) {
                Some(_) => LedgerUpdate::Erased,
                None => LedgerUpdate::Ignored,
            };
        }
        if stage == LifecycleStage::Switching {
            self.current_user = to;
            self.previous_user = from;
        }
        self.advance(to, stage)
    }

    fn advance(&mut self, user: UserId, stage: LifecycleStage) -> LedgerUpdate {
        match self.stage_by_user.get(&user) {
            Some(stored) if *stored >= stage => LedgerUpdate::Ignored,
            _ => {
                self.stage_by_user.insert(user, stage);
                LedgerUpdate::Advanced
            }
        }
    }

    /// Catch-up sequence for a newly connected remote: system user first, then
    /// the current user (with its switch), then every other user by id.
    pub fn replay_plan(&self) -> Vec<ReplayItem> {
        let mut plan = Vec::new();

        if let Some(stage) = self.stage_of(self.system_user) {
            push_progress(&mut plan, self.system_user, stage, None);
        }

        let current = self.current_user;
        if current != self.system_user {
            if let Some(stage) = self.stage_of(current) {
                let switch = (stage >= LifecycleStage::Switching).then_some(self.previous_user);
                push_progress(&mut plan, current, stage, switch);
            }
        }

        for (user, stage) in self.users() {
            if user == self.system_user || user == current {
                continue;
            }
            push_progress(&mut plan, user, stage, None);
        }

        plan
    }
}

/// STARTING, optional SWITCHING, UNLOCKING, UNLOCKED, cut off at `stage`.
fn push_progress(
    plan: &mut Vec<ReplayItem>,
    user: UserId,
    stage: LifecycleStage,
    switched_from: Option<UserId>,
) {
    plan.push(ReplayItem::new(LifecycleStage::Starting, UserId::NULL, user));
    if let Some(from) = switched_from {
        plan.push(ReplayItem::new(LifecycleStage::Switching, from, user));
    }
    if stage >= LifecycleStage::Unlocking {
        plan.push(ReplayItem::new(LifecycleStage::Unlocking, UserId::NULL, user));
    }
    if stage >= LifecycleStage::Unlocked {
        plan.push(ReplayItem::new(LifecycleStage::Unlocked, UserId::NULL, user));
    }
}
