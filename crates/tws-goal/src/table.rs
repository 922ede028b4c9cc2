// table.rs — The goal table: per-goal procedure, contention policy and
// follow-up events.
//
// Each entry links a goal set by a rules-engine decision with the procedure
// or script that achieves it, plus the admission policy:
//   - Cancel:     cancel everything active, then run
//   - Concurrent: may run alongside the goals in its concurrent set
//   - Wait:       run only once nothing else is active
// An entry may also name an exclusive goal that is cancelled when this one
// is requested.

use serde::{Deserialize, Serialize};
use tws_procedure::{ProcResult, RunnerProcedure, Script};

use crate::error::GoalError;
use crate::goal::{GoalId, GoalMask, GOAL_COUNT};
use crate::procedures::{self, ProcedureKind};
use crate::rule_events::RuleEvent;

/// How a goal contends with goals that are already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contention {
    Cancel,
    Concurrent,
    Wait,
}

impl std::fmt::Display for Contention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Contention::Cancel => write!(f, "cancel"),
            Contention::Concurrent => write!(f, "concurrent"),
            Contention::Wait => write!(f, "wait"),
        }
    }
}

/// What runs when a goal starts: one procedure or a named script.
pub type GoalProcedure = RunnerProcedure<ProcedureKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalEntry {
    pub goal: GoalId,
    pub procedure: GoalProcedure,
    pub contention: Contention,
    pub exclusive: Option<GoalId>,
    pub concurrent: GoalMask,
    pub success_event: Option<RuleEvent>,
    pub timeout_event: Option<RuleEvent>,
    pub failed_event: Option<RuleEvent>,
}

impl GoalEntry {
    /// A waiting goal backed by one procedure, with no events.
    pub const fn single(goal: GoalId, procedure: ProcedureKind) -> Self {
        Self::new(goal, RunnerProcedure::Single(procedure))
    }

    /// A waiting goal backed by a script, with no events.
    pub const fn script(goal: GoalId, script: &'static Script<ProcedureKind>) -> Self {
        Self::new(goal, RunnerProcedure::Script(script))
    }

    const fn new(goal: GoalId, procedure: GoalProcedure) -> Self {
        Self {
            goal,
            procedure,
            contention: Contention::Wait,
            exclusive: None,
            concurrent: GoalMask::EMPTY,
            success_event: None,
            timeout_event: None,
            failed_event: None,
        }
    }

    pub const fn cancelling(self) -> Self {
        Self {
            contention: Contention::Cancel,
            ..self
        }
    }

    pub const fn waiting(self) -> Self {
        Self {
            contention: Contention::Wait,
            concurrent: GoalMask::EMPTY,
            ..self
        }
    }

    pub const fn concurrent_with(self, goals: &[GoalId]) -> Self {
        Self {
            contention: Contention::Concurrent,
            concurrent: GoalMask::from_goals(goals),
            ..self
        }
    }

    pub const fn exclusive_with(self, goal: GoalId) -> Self {
        Self {
            exclusive: Some(goal),
            ..self
        }
    }

    pub const fn on_success(self, event: RuleEvent) -> Self {
        Self {
            success_event: Some(event),
            ..self
        }
    }

    pub const fn on_timeout(self, event: RuleEvent) -> Self {
        Self {
            timeout_event: Some(event),
            ..self
        }
    }

    pub const fn on_failure(self, event: RuleEvent) -> Self {
        Self {
            failed_event: Some(event),
            ..self
        }
    }

    /// The event to raise when the goal completes with `result`.
    pub fn event_for(&self, result: ProcResult) -> Option<RuleEvent> {
        match result {
            ProcResult::Success => self.success_event,
            ProcResult::Timeout => self.timeout_event,
            ProcResult::Failed => self.failed_event,
        }
    }

    /// The concurrent set, which only applies to concurrent goals.
    pub fn concurrent_set(&self) -> GoalMask {
        match self.contention {
            Contention::Concurrent => self.concurrent,
            _ => GoalMask::EMPTY,
        }
    }

    /// Every procedure the goal may run.
    pub fn procedures(&self) -> Vec<ProcedureKind> {
        match self.procedure {
            RunnerProcedure::Single(kind) => vec![kind],
            RunnerProcedure::Script(script) => script.procedures().collect(),
        }
    }
}

use GoalId as G;
use RuleEvent as E;

static STANDARD: [GoalEntry; GOAL_COUNT] = [
    GoalEntry::script(G::PairPeer, &procedures::PAIR_PEER),
    GoalEntry::single(G::FindRole, ProcedureKind::FindRole),
    GoalEntry::single(G::SecondaryConnectPeer, ProcedureKind::SecConnectPeer)
        .on_timeout(E::FailedPeerConnect)
        .on_failure(E::FailedPeerConnect),
    GoalEntry::single(G::PrimaryConnectPeerProfiles, ProcedureKind::PriConnectPeerProfiles)
        .exclusive_with(G::PrimaryDisconnectPeerProfiles)
        .concurrent_with(&[
            G::PrimaryConnectablePeer,
            G::ConnectableHandset,
            G::ConnectHandset,
        ]),
    GoalEntry::single(G::PrimaryDisconnectPeerProfiles, ProcedureKind::DisconnectPeerProfiles)
        .exclusive_with(G::PrimaryConnectPeerProfiles),
    GoalEntry::single(G::PrimaryConnectablePeer, ProcedureKind::PriConnectablePeer)
        .on_timeout(E::FailedPeerConnect)
        .concurrent_with(&[
            G::PrimaryConnectPeerProfiles,
            G::ConnectHandset,
            G::ConnectableHandset,
        ]),
    GoalEntry::script(G::NoRoleIdle, &procedures::NO_ROLE_IDLE).cancelling(),
    GoalEntry::single(G::SetRole, ProcedureKind::SetRole),
    GoalEntry::single(G::ConnectHandset, ProcedureKind::ConnectHandset)
        .exclusive_with(G::DisconnectHandset)
        .concurrent_with(&[
            G::PrimaryConnectPeerProfiles,
            G::PrimaryConnectablePeer,
            G::ConnectableHandset,
        ]),
    GoalEntry::single(G::DisconnectHandset, ProcedureKind::DisconnectHandset)
        .exclusive_with(G::ConnectHandset),
    GoalEntry::single(G::ConnectableHandset, ProcedureKind::ConnectableHandset).concurrent_with(
        &[
            G::PrimaryConnectablePeer,
            G::PrimaryConnectPeerProfiles,
            G::ConnectHandset,
        ],
    ),
    GoalEntry::script(G::BecomePrimary, &procedures::PRIMARY_ROLE)
        .cancelling()
        .on_success(E::RoleSwitch),
    GoalEntry::script(G::BecomeSecondary, &procedures::SECONDARY_ROLE)
        .cancelling()
        .on_success(E::RoleSwitch),
    GoalEntry::script(G::BecomeActingPrimary, &procedures::ACTING_PRIMARY_ROLE)
        .on_success(E::RoleSwitch),
    GoalEntry::script(G::SetAddress, &procedures::SET_PRIMARY_ADDRESS),
    GoalEntry::script(
        G::SetPrimaryAddressAndFindRole,
        &procedures::PRIMARY_ADDRESS_FIND_ROLE,
    ),
    GoalEntry::script(G::RoleSwitchToSecondary, &procedures::SWITCH_TO_SECONDARY),
    GoalEntry::script(G::NoRoleFindRole, &procedures::NO_ROLE_FIND_ROLE),
    GoalEntry::single(G::CancelFindRole, ProcedureKind::CancelFindRole),
    GoalEntry::script(G::PrimaryFindRole, &procedures::PRIMARY_FIND_ROLE),
    GoalEntry::script(G::DfuRole, &procedures::DFU_ROLE),
    GoalEntry::script(G::DfuPrimary, &procedures::DFU_PRIMARY_AFTER_BOOT),
    GoalEntry::script(G::DfuSecondary, &procedures::DFU_SECONDARY_AFTER_BOOT),
    GoalEntry::single(G::DfuInCase, ProcedureKind::DfuInCase),
    GoalEntry::script(G::DisconnectPeerFindRole, &procedures::DISCONNECT_PEER_FIND_ROLE),
    GoalEntry::single(G::ReleasePeer, ProcedureKind::ReleasePeer),
    GoalEntry::script(G::HandoverEnteringCase, &procedures::HANDOVER_ENTERING_CASE)
        .on_timeout(E::HandoverInCaseTimeout)
        .on_failure(E::HandoverInCaseFailed),
    GoalEntry::script(
        G::HandoverInCaseTimeout,
        &procedures::HANDOVER_ENTERING_CASE_TIMEOUT,
    )
    .on_timeout(E::HandoverInCaseTimeout)
    .on_failure(E::HandoverInCaseFailed),
    GoalEntry::script(G::SecondaryStaticHandover, &procedures::SECONDARY_STATIC_HANDOVER)
        .cancelling()
        .on_success(E::RoleSwitch)
        .on_failure(E::StaticHandoverFailed),
    GoalEntry::script(
        G::PrimaryStaticHandoverInCase,
        &procedures::PRIMARY_STATIC_HANDOVER_IN_CASE,
    )
    .cancelling()
    .on_failure(E::StaticHandoverFailed),
    GoalEntry::script(G::PrimaryStaticHandover, &procedures::PRIMARY_STATIC_HANDOVER)
        .cancelling()
        .on_success(E::RoleSwitch)
        .on_failure(E::StaticHandoverFailed),
];

/// One [`GoalEntry`] per [`GoalId`], indexed by the goal's discriminant.
#[derive(Debug, Clone)]
pub struct GoalTable {
    entries: [GoalEntry; GOAL_COUNT],
}

impl GoalTable {
    /// The topology's built-in goal table.
    pub fn standard() -> Self {
        Self { entries: STANDARD }
    }

    pub fn entry(&self, goal: GoalId) -> &GoalEntry {
        &self.entries[goal.index()]
    }

    /// Replace the row for `entry.goal`.
    pub fn with_entry(mut self, entry: GoalEntry) -> Self {
        self.entries[entry.goal.index()] = entry;
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = &GoalEntry> {
        self.entries.iter()
    }

    /// Every procedure kind referenced by any goal, deduplicated and sorted.
    pub fn procedures(&self) -> Vec<ProcedureKind> {
        let mut kinds: Vec<ProcedureKind> =
            self.entries.iter().flat_map(GoalEntry::procedures).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// True when `a` and `b` may be active at the same time: one of them
    /// lists the other in its concurrent set.
    pub fn may_run_together(&self, a: GoalId, b: GoalId) -> bool {
        self.entry(a).concurrent_set().contains(b) || self.entry(b).concurrent_set().contains(a)
    }

    /// Check the table's structural rules.
    pub fn validate(&self) -> Result<(), GoalError> {
        for (index, entry) in self.entries.iter().enumerate() {
            let goal = entry.goal;
            let invalid = |reason: String| GoalError::InvalidTable { goal, reason };

            if goal.index() != index {
                return Err(invalid(format!(
                    "entry stored at index {} but goal index is {}",
                    index,
                    goal.index()
                )));
            }
            if entry.exclusive == Some(goal) {
                return Err(invalid("goal is exclusive with itself".to_string()));
            }
            if entry.concurrent.contains(goal) {
                return Err(invalid("goal lists itself as concurrent".to_string()));
            }
            if let Some(exclusive) = entry.exclusive {
                if entry.concurrent.contains(exclusive) {
                    return Err(invalid(format!(
                        "exclusive goal {} is also in the concurrent set",
                        exclusive
                    )));
                }
            }
            if entry.contention != Contention::Concurrent && !entry.concurrent.is_empty() {
                return Err(invalid(format!(
                    "{} goal has a concurrent set {}",
                    entry.contention, entry.concurrent
                )));
            }
            if let RunnerProcedure::Script(script) = entry.procedure {
                if script.is_empty() {
                    return Err(invalid(format!("script {} has no steps", script.name)));
                }
            }
        }
        Ok(())
    }
}

impl Default for GoalTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_valid() {
        let table = GoalTable::standard();
        table.validate().unwrap();
        for goal in GoalId::ALL {
            assert_eq!(table.entry(goal).goal, goal);
        }
    }

    #[test]
    fn connect_and_disconnect_profiles_are_mutually_exclusive() {
        let table = GoalTable::standard();
        assert_eq!(
            table.entry(G::PrimaryConnectPeerProfiles).exclusive,
            Some(G::PrimaryDisconnectPeerProfiles)
        );
        assert_eq!(
            table.entry(G::PrimaryDisconnectPeerProfiles).exclusive,
            Some(G::PrimaryConnectPeerProfiles)
        );
        assert!(table.may_run_together(G::ConnectHandset, G::ConnectableHandset));
        assert!(!table.may_run_together(G::ConnectHandset, G::DisconnectHandset));
    }

    #[test]
    fn events_follow_result() {
        let table = GoalTable::standard();
        let entry = table.entry(G::SecondaryStaticHandover);
        assert_eq!(entry.event_for(ProcResult::Success), Some(E::RoleSwitch));
        assert_eq!(
            entry.event_for(ProcResult::Failed),
            Some(E::StaticHandoverFailed)
        );
        assert_eq!(entry.event_for(ProcResult::Timeout), None);
    }

    #[test]
    fn validate_rejects_concurrent_exclusive_goal() {
        let table = GoalTable::standard().with_entry(
            GoalEntry::single(G::ConnectHandset, ProcedureKind::ConnectHandset)
                .exclusive_with(G::DisconnectHandset)
                .concurrent_with(&[G::DisconnectHandset]),
        );
        assert!(matches!(
            table.validate(),
            Err(GoalError::InvalidTable {
                goal: G::ConnectHandset,
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_concurrent_set_on_wait_goal() {
        let mut entry = *GoalTable::standard().entry(G::SetRole);
        entry.concurrent = GoalMask::of(G::FindRole);
        let table = GoalTable::standard().with_entry(entry);
        assert!(table.validate().is_err());
    }

    #[test]
    fn table_procedures_cover_script_steps() {
        let kinds = GoalTable::standard().procedures();
        assert!(kinds.contains(&ProcedureKind::WaitPeerLinkDrop));
        assert!(kinds.contains(&ProcedureKind::ConnectHandset));
        assert_eq!(kinds.len(), ProcedureKind::ALL.len());
    }
}
