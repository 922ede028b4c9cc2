// orchestrator.rs — Goal admission, contention resolution and completion
// routing.
//
// Every public entry point runs to completion: admission or confirmation
// handling first, then queued goals whose wait masks have emptied are
// re-delivered one at a time in arrival order. After each goal start the
// wait mask of every queued goal is re-derived from the active set, which is
// what keeps a second waiter behind a goal released just before it.
//
// The first invariant violation latches a fault; after that every mutating
// call fails with GoalError::Faulted and leaves state untouched.

use std::collections::{HashMap, VecDeque};

use tws_procedure::{
    Confirmation, Payload, ProcResult, ProcedureContext, ProcedureError, ProcedureEvent,
    ProcedureHandle, ProcedureRegistry, ProcedureRunner, RunnerState,
};

use crate::config::TopologyConfig;
use crate::decision::{DecisionId, TopologyDecision};
use crate::error::GoalError;
use crate::events::{GoalEvent, GoalTrail};
use crate::goal::{GoalId, GoalMask};
use crate::procedures::ProcedureKind;
use crate::queue::PendingQueue;
use crate::rules::RulesEngine;
use crate::table::{Contention, GoalTable};

struct GoalSlot {
    runner: ProcedureRunner<ProcedureKind>,
    handle: Option<ProcedureHandle>,
}

#[derive(Debug, Clone, Copy)]
struct RunRecord {
    goal: GoalId,
    cancel_requested: bool,
    /// Set once the run has cleared its goal while the procedure may still
    /// owe a confirmation for it.
    retired: Option<Retirement>,
}

/// How a retired run ended, which decides the one late confirmation it can
/// still absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retirement {
    /// Completed while its cancel-cfm was outstanding.
    Completed,
    /// Cancelled while a completion may already be queued.
    Cancelled,
}

pub struct GoalOrchestrator<R: RulesEngine> {
    table: GoalTable,
    config: TopologyConfig,
    registry: ProcedureRegistry<ProcedureKind>,
    rules: R,
    trail: GoalTrail,
    active: GoalMask,
    queue: PendingQueue,
    slots: Vec<GoalSlot>,
    runs: HashMap<ProcedureHandle, RunRecord>,
    next_handle: u32,
    deferred: VecDeque<ProcedureEvent>,
    fault: Option<String>,
}

impl<R: RulesEngine> GoalOrchestrator<R> {
    /// Build an orchestrator over `table`. Fails when the table is invalid or
    /// names a procedure that `registry` cannot run.
    pub fn new(
        table: GoalTable,
        registry: ProcedureRegistry<ProcedureKind>,
        rules: R,
    ) -> Result<Self, GoalError> {
        table.validate()?;
        let missing = registry.missing(table.procedures());
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|kind| kind.as_str()).collect();
            return Err(GoalError::MissingProcedures(names.join(", ")));
        }

        let slots = table
            .entries()
            .map(|entry| GoalSlot {
                runner: ProcedureRunner::new(entry.procedure),
                handle: None,
            })
            .collect();

        Ok(Self {
            table,
            config: TopologyConfig::default(),
            registry,
            rules,
            trail: GoalTrail::new(),
            active: GoalMask::EMPTY,
            queue: PendingQueue::new(),
            slots,
            runs: HashMap::new(),
            next_handle: 1,
            deferred: VecDeque::new(),
            fault: None,
        })
    }

    pub fn with_config(mut self, config: TopologyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_trail(mut self, trail: GoalTrail) -> Self {
        self.trail = trail;
        self
    }

    // ── Rules-engine interface ──────────────────────────────────

    /// Ask for `goal` to be achieved on behalf of `decision`. Returns once
    /// the goal has been started, queued, or has finished synchronously.
    pub fn request_goal(
        &mut self,
        goal: GoalId,
        decision: DecisionId,
        payload: Payload,
    ) -> Result<(), GoalError> {
        self.check_fault()?;
        let result = self
            .admit(goal, decision, payload, true)
            .and_then(|_| self.release_ready());
        self.latch(result)
    }

    /// Map a rules-engine decision to its goal and request it. The decision
    /// is marked complete once admission has run.
    pub fn handle_decision(
        &mut self,
        decision: TopologyDecision,
        payload: Payload,
    ) -> Result<GoalId, GoalError> {
        self.check_fault()?;
        let goal = decision.goal(&self.config);
        let payload = if payload.is_empty() {
            Payload::from(decision.default_payload())
        } else {
            payload
        };
        tracing::debug!("decision {} ({}) -> goal {}", decision, decision.id(), goal);

        let result = self.request_goal(goal, decision.id(), payload);
        self.rules.mark_complete(decision.id());
        result.map(|_| goal)
    }

    pub fn is_goal_active(&self, goal: GoalId) -> bool {
        self.active.contains(goal)
    }

    pub fn active_goals(&self) -> GoalMask {
        self.active
    }

    /// Queued goals in release order.
    pub fn queued_goals(&self) -> Vec<GoalId> {
        self.queue.goals()
    }

    pub fn pending_wait_mask(&self, goal: GoalId) -> Option<GoalMask> {
        self.queue.wait_mask(goal)
    }

    /// Handle of the goal's current run, if it is active.
    pub fn current_handle(&self, goal: GoalId) -> Option<ProcedureHandle> {
        self.slots[goal.index()].handle
    }

    /// True when a cancel has been issued to the goal and not yet confirmed.
    pub fn is_cancelling(&self, goal: GoalId) -> bool {
        self.slots[goal.index()].runner.state() == RunnerState::Cancelling
    }

    // ── Procedure interface ─────────────────────────────────────

    /// Deliver a procedure confirmation now.
    pub fn on_procedure_event(&mut self, event: ProcedureEvent) -> Result<(), GoalError> {
        self.check_fault()?;
        let result = self
            .deliver(event)
            .and_then(|_| self.release_ready());
        self.latch(result)
    }

    /// Queue a procedure confirmation for a later dispatch turn.
    pub fn post(&mut self, event: ProcedureEvent) {
        self.deferred.push_back(event);
    }

    pub fn has_pending_events(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Deliver the oldest deferred confirmation. Returns `false` when none
    /// was waiting.
    pub fn dispatch_next(&mut self) -> Result<bool, GoalError> {
        self.check_fault()?;
        match self.deferred.pop_front() {
            Some(event) => {
                self.on_procedure_event(event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deliver deferred confirmations until none are left, including any
    /// queued while delivering. Returns how many were delivered.
    pub fn run_until_idle(&mut self) -> Result<usize, GoalError> {
        let mut delivered = 0;
        while self.dispatch_next()? {
            delivered += 1;
        }
        Ok(delivered)
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn table(&self) -> &GoalTable {
        &self.table
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut R {
        &mut self.rules
    }

    /// The latched fault, if an invariant violation has occurred.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    // ── Admission ───────────────────────────────────────────────

    fn can_run_now(&self, is_new: bool) -> bool {
        self.active.is_empty() && (self.queue.is_empty() || !is_new)
    }

    fn admit(
        &mut self,
        goal: GoalId,
        decision: DecisionId,
        payload: Payload,
        is_new: bool,
    ) -> Result<(), GoalError> {
        let entry = *self.table.entry(goal);
        self.trail.record(GoalEvent::requested(goal, decision, !is_new));

        if self.active.contains(goal) {
            return Err(GoalError::GoalAlreadyActive { goal });
        }

        if self.can_run_now(is_new) {
            self.start_goal(goal, decision, payload)?;
            self.queue.reset_if_empty();
            return Ok(());
        }

        let mut wait = self.active;
        match entry.contention {
            Contention::Cancel => {
                for flushed in self.queue.flush() {
                    tracing::debug!("{} flushes queued goal {}", goal, flushed.goal);
                    self.trail.record(GoalEvent::flushed(flushed.goal, flushed.decision, goal));
                }
                for active in self.active.iter() {
                    self.cancel_goal(active, goal)?;
                }
                wait = self.active;
                if wait.is_empty() && self.can_run_now(is_new) {
                    self.start_goal(goal, decision, payload)?;
                } else {
                    self.enqueue(goal, decision, payload, wait);
                }
            }
            Contention::Concurrent | Contention::Wait => {
                let concurrent = entry.contention == Contention::Concurrent;
                if concurrent {
                    wait = wait.difference(entry.concurrent);
                }
                if let Some(exclusive) = entry.exclusive {
                    if self.active.contains(exclusive) {
                        self.queue.dequeue(exclusive);
                        self.cancel_goal(exclusive, goal)?;
                        if !self.active.contains(exclusive) {
                            wait.remove(exclusive);
                        }
                    }
                }
                if (concurrent && wait.is_empty()) || self.can_run_now(is_new) {
                    self.start_goal(goal, decision, payload)?;
                } else {
                    self.enqueue(goal, decision, payload, wait);
                }
            }
        }

        self.queue.reset_if_empty();
        Ok(())
    }

    fn enqueue(&mut self, goal: GoalId, decision: DecisionId, payload: Payload, wait: GoalMask) {
        if self.queue.enqueue(goal, decision, payload, wait) {
            tracing::debug!("goal {} re-queued, earlier request dropped", goal);
        }
        tracing::debug!("goal {} queued, waiting on {}", goal, wait);
        self.trail.record(GoalEvent::queued(goal, wait));
    }

    fn release_ready(&mut self) -> Result<(), GoalError> {
        while let Some(pending) = self.queue.take_next_ready() {
            tracing::debug!("releasing queued goal {}", pending.goal);
            self.admit(pending.goal, pending.decision, pending.payload, false)?;
        }
        self.queue.reset_if_empty();
        Ok(())
    }

    fn update_queue_masks(&mut self) {
        let active = self.active;
        let table = &self.table;
        self.queue
            .update_masks(|goal| active.difference(table.entry(goal).concurrent_set()));
    }

    // ── Starting and cancelling ─────────────────────────────────

    fn mint_handle(&mut self) -> ProcedureHandle {
        loop {
            let handle = ProcedureHandle::new(self.next_handle);
            self.next_handle = self.next_handle.wrapping_add(1).max(1);
            if !self.runs.contains_key(&handle) {
                return handle;
            }
        }
    }

    fn start_goal(
        &mut self,
        goal: GoalId,
        decision: DecisionId,
        payload: Payload,
    ) -> Result<(), GoalError> {
        self.prune_cancelled_runs(goal);
        let handle = self.mint_handle();
        self.active.insert(goal);
        self.runs.insert(
            handle,
            RunRecord {
                goal,
                cancel_requested: false,
                retired: None,
            },
        );
        let slot = &mut self.slots[goal.index()];
        slot.handle = Some(handle);
        tracing::info!(
            "starting goal {} via {} ({}, decision {})",
            goal,
            slot.runner.procedure(),
            handle,
            decision
        );
        self.trail.record(GoalEvent::started(goal, handle));

        let confirmations = {
            let mut cx = ProcedureContext::new(handle, &mut self.deferred);
            slot.runner
                .start(&mut self.registry, payload.as_bytes(), &mut cx)?;
            cx.take_immediate()
        };
        self.apply(goal, handle, confirmations)?;
        self.update_queue_masks();
        Ok(())
    }

    /// Forget cancelled runs of `goal` before it runs again, keeping any
    /// whose late completion is still queued for delivery.
    fn prune_cancelled_runs(&mut self, goal: GoalId) {
        let deferred = &self.deferred;
        self.runs.retain(|handle, record| {
            record.goal != goal
                || record.retired != Some(Retirement::Cancelled)
                || deferred.iter().any(|event| event.handle == *handle)
        });
    }

    fn cancel_goal(&mut self, goal: GoalId, by: GoalId) -> Result<(), GoalError> {
        let Some(handle) = self.slots[goal.index()].handle else {
            return Ok(());
        };
        match self.runs.get_mut(&handle) {
            Some(record) if record.cancel_requested => return Ok(()),
            Some(record) => record.cancel_requested = true,
            None => return Err(GoalError::UnknownProcedure { handle }),
        }
        tracing::debug!("{} cancels active goal {}", by, goal);
        self.trail.record(GoalEvent::cancel_requested(goal, by));

        let slot = &mut self.slots[goal.index()];
        let (issued, confirmations) = {
            let mut cx = ProcedureContext::new(handle, &mut self.deferred);
            let issued = slot.runner.cancel(&mut self.registry, &mut cx)?;
            (issued, cx.take_immediate())
        };
        if !issued {
            if let Some(record) = self.runs.get_mut(&handle) {
                record.cancel_requested = false;
            }
        }
        self.apply(goal, handle, confirmations)
    }

    // ── Completion ──────────────────────────────────────────────

    fn deliver(&mut self, event: ProcedureEvent) -> Result<(), GoalError> {
        let handle = event.handle;
        let Some(record) = self.runs.get(&handle).copied() else {
            return Err(GoalError::UnknownProcedure { handle });
        };
        let goal = record.goal;

        if let Some(retirement) = record.retired {
            return self.deliver_retired(goal, handle, retirement, event.confirmation);
        }

        let slot = &mut self.slots[goal.index()];
        let confirmations = {
            let mut cx = ProcedureContext::new(handle, &mut self.deferred);
            slot.runner
                .deliver(&mut self.registry, event.confirmation, &mut cx)
                .map_err(|e| match e {
                    ProcedureError::UnexpectedConfirmation { .. } => {
                        GoalError::UnexpectedConfirmation {
                            goal,
                            handle,
                            confirmation: event.confirmation.to_string(),
                        }
                    }
                    other => GoalError::Procedure(other),
                })?;
            cx.take_immediate()
        };
        self.apply(goal, handle, confirmations)
    }

    /// Absorb the confirmation a retired run still owes. Nothing it carries
    /// reaches the goal, the rules or the queue.
    fn deliver_retired(
        &mut self,
        goal: GoalId,
        handle: ProcedureHandle,
        retirement: Retirement,
        confirmation: Confirmation,
    ) -> Result<(), GoalError> {
        match (retirement, confirmation) {
            (_, Confirmation::Started(_)) => {
                tracing::debug!("ignoring late start-cfm for goal {} ({})", goal, handle);
                Ok(())
            }
            (Retirement::Completed, Confirmation::Cancelled(_)) => {
                tracing::warn!(
                    "dropping late cancel-cfm for finished goal {} ({})",
                    goal,
                    handle
                );
                self.runs.remove(&handle);
                Ok(())
            }
            (Retirement::Cancelled, Confirmation::Completed(result)) => {
                tracing::warn!(
                    "dropping late completion ({}) for cancelled goal {} ({})",
                    result,
                    goal,
                    handle
                );
                self.runs.remove(&handle);
                Ok(())
            }
            _ => Err(GoalError::UnexpectedConfirmation {
                goal,
                handle,
                confirmation: confirmation.to_string(),
            }),
        }
    }

    fn apply(
        &mut self,
        goal: GoalId,
        handle: ProcedureHandle,
        confirmations: Vec<Confirmation>,
    ) -> Result<(), GoalError> {
        for confirmation in confirmations {
            match confirmation {
                Confirmation::Started(ProcResult::Success) => {
                    tracing::debug!("goal {} start confirmed", goal);
                }
                Confirmation::Started(result) => {
                    tracing::warn!("goal {} start confirmed with {}", goal, result);
                }
                Confirmation::Completed(result) => self.on_goal_completed(goal, handle, result),
                Confirmation::Cancelled(result) => self.on_goal_cancelled(goal, handle, result),
            }
        }
        Ok(())
    }

    fn on_goal_completed(&mut self, goal: GoalId, handle: ProcedureHandle, result: ProcResult) {
        match self.runs.get_mut(&handle) {
            Some(record) if record.cancel_requested => {
                tracing::debug!("keeping {} for goal {} until its cancel-cfm", handle, goal);
                record.retired = Some(Retirement::Completed);
            }
            _ => {
                self.runs.remove(&handle);
            }
        }
        tracing::info!("goal {} completed: {}", goal, result);
        self.clear_goal(goal, handle);
        self.trail.record(GoalEvent::completed(goal, result));

        if let Some(event) = self.table.entry(goal).event_for(result) {
            tracing::debug!("goal {} raises {}", goal, event);
            self.rules.set_event(event);
            self.trail.record(GoalEvent::rule_event(goal, event));
        }
    }

    fn on_goal_cancelled(&mut self, goal: GoalId, handle: ProcedureHandle, result: ProcResult) {
        if let Some(record) = self.runs.get_mut(&handle) {
            record.retired = Some(Retirement::Cancelled);
        }
        tracing::info!("goal {} cancelled: {}", goal, result);
        self.clear_goal(goal, handle);
        self.trail.record(GoalEvent::cancelled(goal, result));
    }

    /// Remove `goal` from the active set and from every wait mask. Clearing
    /// a goal that is not active is a no-op.
    fn clear_goal(&mut self, goal: GoalId, handle: ProcedureHandle) {
        let slot = &mut self.slots[goal.index()];
        if slot.handle == Some(handle) {
            slot.handle = None;
        }
        if !self.active.contains(goal) {
            tracing::debug!("goal {} already clear", goal);
            return;
        }
        self.active.remove(goal);
        self.queue.clear_goal(goal);
    }

    // ── Fault latch ─────────────────────────────────────────────

    fn check_fault(&self) -> Result<(), GoalError> {
        match &self.fault {
            Some(reason) => Err(GoalError::Faulted(reason.clone())),
            None => Ok(()),
        }
    }

    fn latch<T>(&mut self, result: Result<T, GoalError>) -> Result<T, GoalError> {
        if let Err(e) = &result {
            if e.is_invariant_violation() && self.fault.is_none() {
                tracing::error!("goal orchestrator faulted: {}", e);
                self.fault = Some(e.to_string());
            }
        }
        result
    }
}
