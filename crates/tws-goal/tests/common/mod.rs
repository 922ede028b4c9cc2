// Shared test harness: fake procedures whose replies are scripted per kind.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tws_goal::{
    GoalId, GoalOrchestrator, GoalTable, ProcedureKind, RecordingRules,
};
use tws_procedure::{
    ProcResult, Procedure, ProcedureContext, ProcedureEvent, ProcedureRegistry,
};

/// How a fake answers a start (completion) or a cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Now(ProcResult),
    Later(ProcResult),
    Never,
}

#[derive(Debug, Clone, Copy)]
pub struct Behaviour {
    pub complete: Reply,
    pub cancel: Reply,
}

impl Behaviour {
    pub const fn manual() -> Self {
        Self {
            complete: Reply::Never,
            cancel: Reply::Now(ProcResult::Success),
        }
    }

    pub const fn instant() -> Self {
        Self {
            complete: Reply::Now(ProcResult::Success),
            cancel: Reply::Now(ProcResult::Success),
        }
    }

    pub const fn with_cancel(self, cancel: Reply) -> Self {
        Self { cancel, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(ProcedureKind, Vec<u8>),
    Cancel(ProcedureKind),
}

#[derive(Clone)]
pub struct Fakes {
    default: Rc<RefCell<Behaviour>>,
    behaviours: Rc<RefCell<HashMap<ProcedureKind, Behaviour>>>,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl Fakes {
    fn new() -> Self {
        Self {
            default: Rc::new(RefCell::new(Behaviour::manual())),
            behaviours: Rc::new(RefCell::new(HashMap::new())),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn set(&self, kind: ProcedureKind, behaviour: Behaviour) {
        self.behaviours.borrow_mut().insert(kind, behaviour);
    }

    pub fn set_default(&self, behaviour: Behaviour) {
        *self.default.borrow_mut() = behaviour;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn starts(&self, kind: ProcedureKind) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, Call::Start(k, _) if *k == kind))
            .count()
    }

    pub fn cancels(&self, kind: ProcedureKind) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| **call == Call::Cancel(kind))
            .count()
    }

    fn behaviour(&self, kind: ProcedureKind) -> Behaviour {
        self.behaviours
            .borrow()
            .get(&kind)
            .copied()
            .unwrap_or(*self.default.borrow())
    }
}

struct FakeProcedure {
    kind: ProcedureKind,
    fakes: Fakes,
}

impl Procedure for FakeProcedure {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn start(&mut self, payload: &[u8], cx: &mut ProcedureContext<'_>) {
        self.fakes
            .calls
            .borrow_mut()
            .push(Call::Start(self.kind, payload.to_vec()));
        cx.confirm_start(ProcResult::Success);
        match self.fakes.behaviour(self.kind).complete {
            Reply::Now(result) => cx.complete(result),
            Reply::Later(result) => cx.complete_later(result),
            Reply::Never => {}
        }
    }

    fn cancel(&mut self, cx: &mut ProcedureContext<'_>) {
        self.fakes.calls.borrow_mut().push(Call::Cancel(self.kind));
        match self.fakes.behaviour(self.kind).cancel {
            Reply::Now(result) => cx.confirm_cancel(result),
            Reply::Later(result) => cx.confirm_cancel_later(result),
            Reply::Never => {}
        }
    }
}

pub type Orchestrator = GoalOrchestrator<RecordingRules>;

pub fn harness() -> (Orchestrator, Fakes) {
    harness_with(GoalTable::standard())
}

pub fn harness_with(table: GoalTable) -> (Orchestrator, Fakes) {
    let fakes = Fakes::new();
    let mut registry = ProcedureRegistry::new();
    for kind in ProcedureKind::ALL {
        registry.register(
            kind,
            Box::new(FakeProcedure {
                kind,
                fakes: fakes.clone(),
            }),
        );
    }
    let orch = GoalOrchestrator::new(table, registry, RecordingRules::new()).unwrap();
    (orch, fakes)
}

/// Report the current step (or procedure) of `goal` as finished.
pub fn complete(orch: &mut Orchestrator, goal: GoalId, result: ProcResult) {
    let handle = orch.current_handle(goal).unwrap();
    orch.on_procedure_event(ProcedureEvent::completed(handle, result))
        .unwrap();
}

/// Acknowledge an outstanding cancel for `goal`.
pub fn confirm_cancel(orch: &mut Orchestrator, goal: GoalId) {
    let handle = orch.current_handle(goal).unwrap();
    orch.on_procedure_event(ProcedureEvent::cancelled(handle, ProcResult::Success))
        .unwrap();
}

/// Every pair of simultaneously active goals must be allowed to overlap.
pub fn assert_mutual_exclusion(orch: &Orchestrator) {
    let active: Vec<GoalId> = orch.active_goals().iter().collect();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            assert!(
                orch.table().may_run_together(*a, *b),
                "{} and {} active together",
                a,
                b
            );
        }
    }
}
