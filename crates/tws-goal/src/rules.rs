// rules.rs — The orchestrator's view of the rules engine.

use serde::{Deserialize, Serialize};

use crate::decision::DecisionId;
use crate::rule_events::RuleEvent;

/// Sink for the topology's outcome reports.
pub trait RulesEngine {
    /// Raise a follow-up event for the rules to react to.
    fn set_event(&mut self, event: RuleEvent);

    /// The decision that requested a goal has been handled.
    fn mark_complete(&mut self, decision: DecisionId);
}

/// A rules engine that just records what it was told.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRules {
    pub events: Vec<RuleEvent>,
    pub completed: Vec<DecisionId>,
}

impl RecordingRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `event` was raised.
    pub fn count(&self, event: RuleEvent) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }
}

impl RulesEngine for RecordingRules {
    fn set_event(&mut self, event: RuleEvent) {
        self.events.push(event);
    }

    fn mark_complete(&mut self, decision: DecisionId) {
        self.completed.push(decision);
    }
}
