//! # tws-goal
//!
//! Goal scheduling for a true-wireless-stereo earbud topology.
//!
//! The rules engine decides *what* the earbud should be doing (become
//! primary, connect the handset, hand over on entering the case). This crate
//! decides *when*: it admits each requested goal against the goals already
//! running, cancels or queues as the goal table dictates, drives the goal's
//! procedure or script, and reports the outcome back as rule events.
//!
//! ## Key components
//!
//! - [`GoalId`] / [`GoalMask`] — goal identifiers and bit sets of them
//! - [`GoalTable`] — per-goal procedure, contention policy and events
//! - [`GoalOrchestrator`] — admission control, queueing and completion routing
//! - [`PendingQueue`] — goals waiting for other goals to finish
//! - [`TopologyDecision`] — rules-engine decisions and the goals they map to
//! - [`RulesEngine`] — where outcome events and decision completions go
//! - [`GoalEvent`] / [`GoalTrail`] — numbered lifecycle trail and its sinks
//! - [`TopologyConfig`] — `.tws/topology.toml`

pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod goal;
pub mod orchestrator;
pub mod procedures;
pub mod queue;
pub mod rule_events;
pub mod rules;
pub mod table;

pub use config::TopologyConfig;
pub use decision::{DecisionId, TopologyDecision};
pub use error::GoalError;
pub use events::{GoalEvent, GoalTrail, JsonlTrail, MemoryTrail, TrailEntry, TrailSink};
pub use goal::{GoalId, GoalMask, GOAL_COUNT};
pub use orchestrator::GoalOrchestrator;
pub use procedures::ProcedureKind;
pub use queue::{PendingGoal, PendingQueue};
pub use rule_events::RuleEvent;
pub use rules::{RecordingRules, RulesEngine};
pub use table::{Contention, GoalEntry, GoalProcedure, GoalTable};
