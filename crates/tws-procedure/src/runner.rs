// runner.rs — Drives a single procedure or a script as one unit.
//
// The runner sits between a client and the procedures it owns. Every
// confirmation a procedure produces, synchronous or deferred, is fed back
// through `deliver`, and the runner turns step-level confirmations into
// run-level ones in the caller's context.
//
// Script state machine:
//
//   Idle ──start──▶ Active ──step Completed(Success)──▶ next step / Completed(Success)
//                     │   ──step Completed(Failed|Timeout)──▶ Idle, Completed(result)
//                     └──cancel──▶ Cancelling ──step Cancelled(r)──▶ Idle, Cancelled(r)
//
// While Cancelling a step's completion is dropped: the step still owes its
// cancel confirmation and no later step may start.

use std::fmt;

use crate::error::ProcedureError;
use crate::procedure::{Confirmation, ProcResult, ProcedureContext, ProcedureKey};
use crate::registry::ProcedureRegistry;
use crate::script::Script;

/// What a runner executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerProcedure<K: 'static> {
    Single(K),
    Script(&'static Script<K>),
}

impl<K: ProcedureKey> fmt::Display for RunnerProcedure<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerProcedure::Single(key) => write!(f, "{}", key),
            RunnerProcedure::Script(script) => write!(f, "script:{}", script.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Active,
    Cancelling,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::Idle => write!(f, "idle"),
            RunnerState::Active => write!(f, "active"),
            RunnerState::Cancelling => write!(f, "cancelling"),
        }
    }
}

pub struct ProcedureRunner<K: 'static> {
    procedure: RunnerProcedure<K>,
    state: RunnerState,
    next_step: usize,
}

impl<K: ProcedureKey> ProcedureRunner<K> {
    pub fn new(procedure: RunnerProcedure<K>) -> Self {
        Self {
            procedure,
            state: RunnerState::Idle,
            next_step: 0,
        }
    }

    pub fn procedure(&self) -> RunnerProcedure<K> {
        self.procedure
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != RunnerState::Idle
    }

    /// Index of the step currently executing, for scripts.
    pub fn current_step(&self) -> Option<usize> {
        match self.procedure {
            RunnerProcedure::Script(_) if self.is_running() => Some(self.next_step),
            _ => None,
        }
    }

    /// Start a run. Run-level confirmations produced synchronously land in
    /// `cx`; deferred ones are queued on its deferred queue.
    pub fn start(
        &mut self,
        registry: &mut ProcedureRegistry<K>,
        payload: &[u8],
        cx: &mut ProcedureContext<'_>,
    ) -> Result<(), ProcedureError> {
        if self.state != RunnerState::Idle {
            return Err(ProcedureError::AlreadyRunning {
                procedure: self.procedure.to_string(),
                state: self.state.to_string(),
            });
        }

        match self.procedure {
            RunnerProcedure::Single(key) => {
                let procedure = registry.get_mut(key)?;
                self.state = RunnerState::Active;
                let mut child = cx.child();
                procedure.start(payload, &mut child);
                let confirmations = child.take_immediate();
                for confirmation in confirmations {
                    self.deliver(registry, confirmation, cx)?;
                }
                Ok(())
            }
            RunnerProcedure::Script(script) => {
                tracing::debug!("starting script {} ({} steps)", script.name, script.len());
                self.state = RunnerState::Active;
                self.next_step = 0;
                cx.confirm_start(ProcResult::Success);
                self.start_step(registry, script, cx)
            }
        }
    }

    /// Request cancellation. Returns `false` when there is nothing to cancel:
    /// the runner is idle or a cancel is already outstanding.
    pub fn cancel(
        &mut self,
        registry: &mut ProcedureRegistry<K>,
        cx: &mut ProcedureContext<'_>,
    ) -> Result<bool, ProcedureError> {
        if self.state != RunnerState::Active {
            return Ok(false);
        }

        let key = match self.procedure {
            RunnerProcedure::Single(key) => key,
            RunnerProcedure::Script(script) => match script.steps.get(self.next_step) {
                Some(step) => step.procedure,
                None => {
                    self.reset();
                    return Ok(false);
                }
            },
        };

        let procedure = registry.get_mut(key)?;
        self.state = RunnerState::Cancelling;
        let mut child = cx.child();
        procedure.cancel(&mut child);
        let confirmations = child.take_immediate();
        for confirmation in confirmations {
            self.deliver(registry, confirmation, cx)?;
        }
        Ok(true)
    }

    /// Feed one confirmation from the procedure currently executing.
    pub fn deliver(
        &mut self,
        registry: &mut ProcedureRegistry<K>,
        confirmation: Confirmation,
        cx: &mut ProcedureContext<'_>,
    ) -> Result<(), ProcedureError> {
        if self.state == RunnerState::Idle {
            return Err(self.unexpected(confirmation));
        }
        match self.procedure {
            RunnerProcedure::Single(_) => self.deliver_single(confirmation, cx),
            RunnerProcedure::Script(script) => {
                self.deliver_step(registry, script, confirmation, cx)
            }
        }
    }

    fn deliver_single(
        &mut self,
        confirmation: Confirmation,
        cx: &mut ProcedureContext<'_>,
    ) -> Result<(), ProcedureError> {
        match confirmation {
            Confirmation::Started(result) => cx.confirm_start(result),
            Confirmation::Completed(result) => {
                // A completion racing a cancel still ends the run; the
                // outstanding cancel-cfm is the owner's to absorb.
                self.reset();
                cx.complete(result);
            }
            Confirmation::Cancelled(result) => {
                if self.state != RunnerState::Cancelling {
                    return Err(self.unexpected(confirmation));
                }
                self.reset();
                cx.confirm_cancel(result);
            }
        }
        Ok(())
    }

    fn deliver_step(
        &mut self,
        registry: &mut ProcedureRegistry<K>,
        script: &'static Script<K>,
        confirmation: Confirmation,
        cx: &mut ProcedureContext<'_>,
    ) -> Result<(), ProcedureError> {
        match (self.state, confirmation) {
            (RunnerState::Active, Confirmation::Started(ProcResult::Success)) => {
                tracing::trace!("{} step {} started", script.name, self.next_step);
                Ok(())
            }
            (RunnerState::Active, Confirmation::Started(result)) => {
                tracing::warn!(
                    "{} step {} failed to start: {}",
                    script.name,
                    self.next_step,
                    result
                );
                self.reset();
                cx.complete(ProcResult::Failed);
                Ok(())
            }
            (RunnerState::Active, Confirmation::Completed(ProcResult::Success)) => {
                self.next_step += 1;
                self.start_step(registry, script, cx)
            }
            (RunnerState::Active, Confirmation::Completed(result)) => {
                tracing::debug!(
                    "{} aborted at step {}: {}",
                    script.name,
                    self.next_step,
                    result
                );
                self.reset();
                cx.complete(result);
                Ok(())
            }
            (RunnerState::Cancelling, Confirmation::Started(_))
            | (RunnerState::Cancelling, Confirmation::Completed(_)) => {
                tracing::debug!(
                    "{} cancelling, ignoring {} from step {}",
                    script.name,
                    confirmation,
                    self.next_step
                );
                Ok(())
            }
            (RunnerState::Cancelling, Confirmation::Cancelled(result)) => {
                self.reset();
                cx.confirm_cancel(result);
                Ok(())
            }
            _ => Err(self.unexpected(confirmation)),
        }
    }

    fn start_step(
        &mut self,
        registry: &mut ProcedureRegistry<K>,
        script: &'static Script<K>,
        cx: &mut ProcedureContext<'_>,
    ) -> Result<(), ProcedureError> {
        let Some(step) = script.steps.get(self.next_step) else {
            tracing::debug!("script {} finished", script.name);
            self.reset();
            cx.complete(ProcResult::Success);
            return Ok(());
        };

        tracing::debug!(
            "{} step {}/{}: {}",
            script.name,
            self.next_step + 1,
            script.len(),
            step.procedure
        );
        let procedure = match registry.get_mut(step.procedure) {
            Ok(procedure) => procedure,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        let mut child = cx.child();
        procedure.start(step.payload, &mut child);
        let confirmations = child.take_immediate();
        for confirmation in confirmations {
            // A synchronous failure already ended the run.
            if !self.is_running() {
                break;
            }
            self.deliver_step(registry, script, confirmation, cx)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = RunnerState::Idle;
        self.next_step = 0;
    }

    fn unexpected(&self, confirmation: Confirmation) -> ProcedureError {
        ProcedureError::UnexpectedConfirmation {
            procedure: self.procedure.to_string(),
            state: self.state.to_string(),
            confirmation: confirmation.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::{Procedure, ProcedureEvent, ProcedureHandle};
    use crate::script::ScriptStep;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Clone, Copy)]
    enum Reply {
        Now(ProcResult),
        Later(ProcResult),
        Never,
    }

    struct Fake {
        name: &'static str,
        complete: Reply,
        cancel: Reply,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl Procedure for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn start(&mut self, payload: &[u8], cx: &mut ProcedureContext<'_>) {
            self.calls
                .borrow_mut()
                .push(format!("start {} {:?}", self.name, payload));
            cx.confirm_start(ProcResult::Success);
            match self.complete {
                Reply::Now(r) => cx.complete(r),
                Reply::Later(r) => cx.complete_later(r),
                Reply::Never => {}
            }
        }

        fn cancel(&mut self, cx: &mut ProcedureContext<'_>) {
            self.calls.borrow_mut().push(format!("cancel {}", self.name));
            match self.cancel {
                Reply::Now(r) => cx.confirm_cancel(r),
                Reply::Later(r) => cx.confirm_cancel_later(r),
                Reply::Never => {}
            }
        }
    }

    static THREE_STEPS: Script<&'static str> = Script {
        name: "three_steps",
        steps: &[
            ScriptStep::new("a", &[1]),
            ScriptStep::bare("b"),
            ScriptStep::new("c", &[3]),
        ],
    };

    fn registry(
        replies: &[(&'static str, Reply, Reply)],
    ) -> (ProcedureRegistry<&'static str>, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ProcedureRegistry::new();
        for (name, complete, cancel) in replies {
            registry.register(
                *name,
                Box::new(Fake {
                    name: *name,
                    complete: *complete,
                    cancel: *cancel,
                    calls: calls.clone(),
                }),
            );
        }
        (registry, calls)
    }

    const OK: Reply = Reply::Now(ProcResult::Success);

    #[test]
    fn synchronous_script_runs_every_step_in_order() {
        let (mut registry, calls) = registry(&[("a", OK, OK), ("b", OK, OK), ("c", OK, OK)]);
        let mut deferred = VecDeque::new();
        let mut cx = ProcedureContext::new(ProcedureHandle::new(1), &mut deferred);
        let mut runner = ProcedureRunner::new(RunnerProcedure::Script(&THREE_STEPS));

        runner.start(&mut registry, &[], &mut cx).unwrap();

        assert_eq!(
            cx.take_immediate(),
            vec![
                Confirmation::Started(ProcResult::Success),
                Confirmation::Completed(ProcResult::Success)
            ]
        );
        assert_eq!(
            *calls.borrow(),
            vec!["start a [1]", "start b []", "start c [3]"]
        );
        assert!(!runner.is_running());
    }

    #[test]
    fn failing_step_aborts_remaining_steps() {
        let (mut registry, calls) = registry(&[
            ("a", OK, OK),
            ("b", Reply::Now(ProcResult::Timeout), OK),
            ("c", OK, OK),
        ]);
        let mut deferred = VecDeque::new();
        let mut cx = ProcedureContext::new(ProcedureHandle::new(1), &mut deferred);
        let mut runner = ProcedureRunner::new(RunnerProcedure::Script(&THREE_STEPS));

        runner.start(&mut registry, &[], &mut cx).unwrap();

        assert_eq!(
            cx.take_immediate().last(),
            Some(&Confirmation::Completed(ProcResult::Timeout))
        );
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn deferred_steps_advance_on_delivery() {
        let later = Reply::Later(ProcResult::Success);
        let (mut registry, calls) =
            registry(&[("a", later, OK), ("b", later, OK), ("c", later, OK)]);
        let mut deferred = VecDeque::new();
        let handle = ProcedureHandle::new(4);
        let mut runner = ProcedureRunner::new(RunnerProcedure::Script(&THREE_STEPS));

        let mut out = Vec::new();
        {
            let mut cx = ProcedureContext::new(handle, &mut deferred);
            runner.start(&mut registry, &[], &mut cx).unwrap();
            out.extend(cx.take_immediate());
        }
        while let Some(ProcedureEvent {
            handle: h,
            confirmation,
        }) = deferred.pop_front()
        {
            assert_eq!(h, handle);
            let mut cx = ProcedureContext::new(h, &mut deferred);
            runner.deliver(&mut registry, confirmation, &mut cx).unwrap();
            out.extend(cx.take_immediate());
        }

        assert_eq!(out.last(), Some(&Confirmation::Completed(ProcResult::Success)));
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn cancel_targets_current_step_and_stops_the_script() {
        let (mut registry, calls) = registry(&[
            ("a", OK, OK),
            ("b", Reply::Never, Reply::Later(ProcResult::Success)),
            ("c", OK, OK),
        ]);
        let mut deferred = VecDeque::new();
        let handle = ProcedureHandle::new(2);
        let mut runner = ProcedureRunner::new(RunnerProcedure::Script(&THREE_STEPS));
        {
            let mut cx = ProcedureContext::new(handle, &mut deferred);
            runner.start(&mut registry, &[], &mut cx).unwrap();
            assert!(runner.cancel(&mut registry, &mut cx).unwrap());
            assert!(!runner.cancel(&mut registry, &mut cx).unwrap());

            // The step finishing after the cancel request is not an advance.
            runner
                .deliver(&mut registry, Confirmation::Completed(ProcResult::Success), &mut cx)
                .unwrap();
            assert_eq!(runner.state(), RunnerState::Cancelling);
        }

        let event = deferred.pop_front().unwrap();
        let mut cx = ProcedureContext::new(handle, &mut deferred);
        runner
            .deliver(&mut registry, event.confirmation, &mut cx)
            .unwrap();
        assert_eq!(
            cx.take_immediate(),
            vec![Confirmation::Cancelled(ProcResult::Success)]
        );
        assert_eq!(*calls.borrow(), vec!["start a [1]", "start b []", "cancel b"]);
    }

    #[test]
    fn single_completion_during_cancel_ends_run() {
        let (mut registry, _calls) = registry(&[("a", Reply::Never, Reply::Never)]);
        let mut deferred = VecDeque::new();
        let mut cx = ProcedureContext::new(ProcedureHandle::new(3), &mut deferred);
        let mut runner = ProcedureRunner::new(RunnerProcedure::Single("a"));

        runner.start(&mut registry, &[], &mut cx).unwrap();
        assert!(runner.cancel(&mut registry, &mut cx).unwrap());
        runner
            .deliver(&mut registry, Confirmation::Completed(ProcResult::Failed), &mut cx)
            .unwrap();

        assert!(!runner.is_running());
        assert_eq!(
            cx.take_immediate(),
            vec![
                Confirmation::Started(ProcResult::Success),
                Confirmation::Completed(ProcResult::Failed)
            ]
        );
        assert!(matches!(
            runner.deliver(&mut registry, Confirmation::Cancelled(ProcResult::Success), &mut cx),
            Err(ProcedureError::UnexpectedConfirmation { .. })
        ));
    }

    #[test]
    fn start_rejects_busy_runner_and_unknown_procedure() {
        let (mut registry, _calls) = registry(&[("a", Reply::Never, OK)]);
        let mut deferred = VecDeque::new();
        let mut cx = ProcedureContext::new(ProcedureHandle::new(5), &mut deferred);

        let mut runner = ProcedureRunner::new(RunnerProcedure::Single("a"));
        runner.start(&mut registry, &[], &mut cx).unwrap();
        assert!(matches!(
            runner.start(&mut registry, &[], &mut cx),
            Err(ProcedureError::AlreadyRunning { .. })
        ));

        let mut orphan = ProcedureRunner::new(RunnerProcedure::Single("zz"));
        assert!(matches!(
            orphan.start(&mut registry, &[], &mut cx),
            Err(ProcedureError::NotRegistered { .. })
        ));
        assert!(!orphan.is_running());
    }
}
