// simulate.rs — Replay a scenario file against simulated procedures.
//
// Every procedure kind is backed by a SimulatedProcedure whose start, completion
// and cancel confirmations are scripted by the scenario's behaviours. Steps
// drive the orchestrator and assert on its state; deferred confirmations are
// only delivered by an explicit `run` step.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tws_goal::procedures::param;
use tws_goal::{
    DecisionId, GoalEvent, GoalId, GoalMask, GoalOrchestrator, GoalTable, GoalTrail,
    JsonlTrail, MemoryTrail, ProcedureKind, RecordingRules, RuleEvent, TopologyConfig,
    TopologyDecision,
};
use tws_procedure::{
    Payload, ProcResult, Procedure, ProcedureContext, ProcedureEvent, ProcedureRegistry,
};

/// When a simulated procedure sends a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Immediate,
    Deferred,
    /// Never sent on its own; a scenario step has to deliver it.
    #[serde(alias = "none")]
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behaviour {
    pub start: Timing,
    pub complete: Timing,
    pub cancel: Timing,
    pub result: ProcResult,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            start: Timing::Immediate,
            complete: Timing::Manual,
            cancel: Timing::Immediate,
            result: ProcResult::Success,
        }
    }
}

fn success() -> ProcResult {
    ProcResult::Success
}

/// One scenario step, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Decide {
        decision: TopologyDecision,
        #[serde(default)]
        payload: Vec<u8>,
    },
    Request {
        goal: GoalId,
        #[serde(default)]
        decision: u32,
        #[serde(default)]
        payload: Vec<u8>,
    },
    Complete {
        goal: GoalId,
        #[serde(default = "success")]
        result: ProcResult,
    },
    ConfirmCancel {
        goal: GoalId,
        #[serde(default = "success")]
        result: ProcResult,
    },
    Run,
    ExpectActive {
        goals: Vec<GoalId>,
    },
    ExpectQueued {
        goals: Vec<GoalId>,
    },
    ExpectEvents {
        events: Vec<RuleEvent>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub defaults: Behaviour,
    /// Per-procedure behaviours keyed by procedure kind name. Fields left
    /// out take the built-in defaults, not `[defaults]`.
    #[serde(default)]
    pub procedures: BTreeMap<String, Behaviour>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        for kind in scenario.procedures.keys() {
            kind.parse::<ProcedureKind>()?;
        }
        Ok(scenario)
    }

    fn behaviour(&self, kind: ProcedureKind) -> Behaviour {
        self.procedures
            .get(kind.as_str())
            .copied()
            .unwrap_or(self.defaults)
    }
}

struct SimulatedProcedure {
    kind: ProcedureKind,
    behaviour: Behaviour,
}

impl Procedure for SimulatedProcedure {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn start(&mut self, payload: &[u8], cx: &mut ProcedureContext<'_>) {
        match param::describe(self.kind, payload) {
            Some(name) => tracing::info!("{} start ({})", self.kind, name),
            None => tracing::info!("{} start", self.kind),
        }

        let behaviour = self.behaviour;
        // An immediate completion must not be overtaken by its own start-cfm.
        let start = if behaviour.complete == Timing::Immediate {
            Timing::Immediate
        } else {
            behaviour.start
        };
        match start {
            Timing::Immediate => cx.confirm_start(ProcResult::Success),
            Timing::Deferred => cx.confirm_start_later(ProcResult::Success),
            Timing::Manual => {}
        }
        match behaviour.complete {
            Timing::Immediate => cx.complete(behaviour.result),
            Timing::Deferred => cx.complete_later(behaviour.result),
            Timing::Manual => {}
        }
    }

    fn cancel(&mut self, cx: &mut ProcedureContext<'_>) {
        tracing::info!("{} cancel", self.kind);
        match self.behaviour.cancel {
            Timing::Immediate => cx.confirm_cancel(ProcResult::Success),
            Timing::Deferred => cx.confirm_cancel_later(ProcResult::Success),
            Timing::Manual => {}
        }
    }
}

/// Outcome of a replayed scenario.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub name: Option<String>,
    pub trail: Vec<GoalEvent>,
    pub rule_events: Vec<RuleEvent>,
    pub completed_decisions: Vec<DecisionId>,
    pub active: GoalMask,
    pub queued: Vec<GoalId>,
}

pub fn execute(path: &Path, json: bool, config: &TopologyConfig) -> anyhow::Result<()> {
    let scenario = Scenario::load(path)?;
    let report = simulate(&scenario, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(name) = &report.name {
        println!("Scenario: {}", name);
    }
    println!("{:<24} {:<34} {}", "EVENT", "GOAL", "DETAIL");
    println!("{}", "-".repeat(84));
    for event in &report.trail {
        println!(
            "{:<24} {:<34} {}",
            event.event_type(),
            event.goal().as_str(),
            detail(event)
        );
    }
    println!();
    let raised: Vec<&str> = report.rule_events.iter().map(|e| e.as_str()).collect();
    println!("Rule events: {}", if raised.is_empty() { "-".to_string() } else { raised.join(", ") });
    println!("Active:      {}", report.active);
    let queued: Vec<&str> = report.queued.iter().map(|g| g.as_str()).collect();
    println!("Queued:      [{}]", queued.join(", "));

    Ok(())
}

fn detail(event: &GoalEvent) -> String {
    match event {
        GoalEvent::GoalRequested {
            decision,
            redelivered,
            ..
        } => {
            if *redelivered {
                format!("decision {} (released)", decision)
            } else {
                format!("decision {}", decision)
            }
        }
        GoalEvent::GoalStarted { handle, .. } => handle.to_string(),
        GoalEvent::GoalQueued { waiting_on, .. } => format!("waiting on {}", waiting_on),
        GoalEvent::GoalFlushed { by, .. } => format!("flushed by {}", by),
        GoalEvent::GoalCancelRequested { by, .. } => format!("cancelled by {}", by),
        GoalEvent::GoalCompleted { result, .. } | GoalEvent::GoalCancelled { result, .. } => {
            result.to_string()
        }
        GoalEvent::RuleEventRaised { event, .. } => event.to_string(),
    }
}

/// Run every step of `scenario` against the standard goal table.
pub fn simulate(scenario: &Scenario, config: &TopologyConfig) -> anyhow::Result<SimulationReport> {
    let mut registry = ProcedureRegistry::new();
    for kind in ProcedureKind::ALL {
        registry.register(
            kind,
            Box::new(SimulatedProcedure {
                kind,
                behaviour: scenario.behaviour(kind),
            }),
        );
    }

    let memory = MemoryTrail::new();
    let mut trail = GoalTrail::new().with_sink(memory.clone());
    if let Some(log_path) = &config.events.log_path {
        trail.add_sink(Box::new(JsonlTrail::open(log_path)?));
    }

    let mut orch = GoalOrchestrator::new(GoalTable::standard(), registry, RecordingRules::new())?
        .with_config(config.clone())
        .with_trail(trail);

    for (index, step) in scenario.steps.iter().enumerate() {
        run_step(&mut orch, step).with_context(|| format!("step {} ({:?})", index + 1, step))?;
    }

    Ok(SimulationReport {
        name: scenario.name.clone(),
        trail: memory.events(),
        rule_events: orch.rules().events.clone(),
        completed_decisions: orch.rules().completed.clone(),
        active: orch.active_goals(),
        queued: orch.queued_goals(),
    })
}

fn run_step(orch: &mut GoalOrchestrator<RecordingRules>, step: &Step) -> anyhow::Result<()> {
    match step {
        Step::Decide { decision, payload } => {
            let goal = orch.handle_decision(*decision, Payload::new(payload.clone()))?;
            tracing::debug!("{} requested {}", decision, goal);
        }
        Step::Request {
            goal,
            decision,
            payload,
        } => orch.request_goal(*goal, DecisionId(*decision), Payload::new(payload.clone()))?,
        Step::Complete { goal, result } => {
            let handle = active_handle(orch, *goal)?;
            orch.on_procedure_event(ProcedureEvent::completed(handle, *result))?;
        }
        Step::ConfirmCancel { goal, result } => {
            let handle = active_handle(orch, *goal)?;
            orch.on_procedure_event(ProcedureEvent::cancelled(handle, *result))?;
        }
        Step::Run => {
            let delivered = orch.run_until_idle()?;
            tracing::debug!("delivered {} deferred confirmation(s)", delivered);
        }
        Step::ExpectActive { goals } => {
            let expected: GoalMask = goals.iter().copied().collect();
            if orch.active_goals() != expected {
                bail!(
                    "expected active goals {}, found {}",
                    expected,
                    orch.active_goals()
                );
            }
        }
        Step::ExpectQueued { goals } => {
            let queued = orch.queued_goals();
            if &queued != goals {
                bail!("expected queued goals {:?}, found {:?}", goals, queued);
            }
        }
        Step::ExpectEvents { events } => {
            let raised = &orch.rules().events;
            if raised != events {
                bail!("expected rule events {:?}, found {:?}", events, raised);
            }
        }
    }
    Ok(())
}

fn active_handle(
    orch: &GoalOrchestrator<RecordingRules>,
    goal: GoalId,
) -> anyhow::Result<tws_procedure::ProcedureHandle> {
    match orch.current_handle(goal) {
        Some(handle) => Ok(handle),
        None => bail!("goal {} is not active", goal),
    }
}
