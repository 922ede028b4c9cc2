// queue.rs — Goals waiting for other goals to finish.
//
// Entries are kept in arrival order. Each queued goal has a lock mask (the
// active goals it is waiting on) and the decision that requested it. A lock
// mask only ever shrinks when a goal is cleared; it is re-derived wholesale
// after every goal start.

use std::collections::VecDeque;

use tws_procedure::Payload;

use crate::decision::DecisionId;
use crate::goal::{GoalId, GoalMask, GOAL_COUNT};

/// A request parked until its lock mask empties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGoal {
    pub goal: GoalId,
    pub decision: DecisionId,
    pub payload: Payload,
}

#[derive(Debug)]
pub struct PendingQueue {
    entries: VecDeque<PendingGoal>,
    lock_mask: [GoalMask; GOAL_COUNT],
    lock_id: [Option<DecisionId>; GOAL_COUNT],
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            lock_mask: [GoalMask::EMPTY; GOAL_COUNT],
            lock_id: [None; GOAL_COUNT],
        }
    }

    /// Park `goal` behind `wait_mask`. An earlier queued request for the
    /// same goal is dropped; the new one goes to the back.
    pub fn enqueue(
        &mut self,
        goal: GoalId,
        decision: DecisionId,
        payload: Payload,
        wait_mask: GoalMask,
    ) -> bool {
        let replaced = self.remove_entry(goal);
        self.lock_mask[goal.index()] = wait_mask;
        self.lock_id[goal.index()] = Some(decision);
        self.entries.push_back(PendingGoal {
            goal,
            decision,
            payload,
        });
        replaced
    }

    /// Drop any queued request for `goal`. Returns whether one was queued.
    pub fn dequeue(&mut self, goal: GoalId) -> bool {
        let removed = self.remove_entry(goal);
        if removed {
            self.lock_mask[goal.index()] = GoalMask::EMPTY;
            self.lock_id[goal.index()] = None;
        }
        removed
    }

    fn remove_entry(&mut self, goal: GoalId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.goal != goal);
        self.entries.len() != before
    }

    /// Drop every queued request, returning them in arrival order.
    pub fn flush(&mut self) -> Vec<PendingGoal> {
        let flushed: Vec<PendingGoal> = self.entries.drain(..).collect();
        self.reset();
        flushed
    }

    /// `goal` is no longer active: nothing waits on it any more.
    pub fn clear_goal(&mut self, goal: GoalId) {
        for mask in self.lock_mask.iter_mut() {
            mask.remove(goal);
        }
    }

    /// Re-derive the lock mask of every goal with a live lock id.
    pub fn update_masks(&mut self, mut wait_mask_for: impl FnMut(GoalId) -> GoalMask) {
        for goal in GoalId::ALL {
            if self.lock_id[goal.index()].is_some() {
                self.lock_mask[goal.index()] = wait_mask_for(goal);
            }
        }
    }

    /// Remove and return the first request, in arrival order, that is no
    /// longer waiting on anything.
    pub fn take_next_ready(&mut self) -> Option<PendingGoal> {
        let position = self
            .entries
            .iter()
            .position(|entry| self.lock_mask[entry.goal.index()].is_empty())?;
        self.entries.remove(position)
    }

    /// Forget all lock bookkeeping once nothing is queued.
    pub fn reset_if_empty(&mut self) {
        if self.entries.is_empty() {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.lock_mask = [GoalMask::EMPTY; GOAL_COUNT];
        self.lock_id = [None; GOAL_COUNT];
    }

    pub fn contains(&self, goal: GoalId) -> bool {
        self.entries.iter().any(|entry| entry.goal == goal)
    }

    /// Lock mask of a queued goal.
    pub fn wait_mask(&self, goal: GoalId) -> Option<GoalMask> {
        self.contains(goal).then(|| self.lock_mask[goal.index()])
    }

    /// Queued goals in arrival order.
    pub fn goals(&self) -> Vec<GoalId> {
        self.entries.iter().map(|entry| entry.goal).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
