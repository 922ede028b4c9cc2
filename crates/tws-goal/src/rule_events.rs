// rule_events.rs — Events the orchestrator raises back into the rules engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Follow-up events reported to the rules engine once a goal finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEvent {
    /// The device changed role (primary ⇄ secondary).
    RoleSwitch,
    /// A peer connection attempt timed out or failed.
    FailedPeerConnect,
    /// Handover on entering the case did not finish in time.
    HandoverInCaseTimeout,
    /// Handover on entering the case failed.
    HandoverInCaseFailed,
    /// A static (link-drop based) handover failed.
    StaticHandoverFailed,
}

impl RuleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleEvent::RoleSwitch => "role_switch",
            RuleEvent::FailedPeerConnect => "failed_peer_connect",
            RuleEvent::HandoverInCaseTimeout => "handover_in_case_timeout",
            RuleEvent::HandoverInCaseFailed => "handover_in_case_failed",
            RuleEvent::StaticHandoverFailed => "static_handover_failed",
        }
    }
}

impl fmt::Display for RuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
