// decision.rs — Rules-engine decisions and the goals they map to.
//
// The primary, secondary and DFU rule sets each emit their own decision
// identifiers. Several decisions from different rule sets resolve to the
// same goal; the handover decision resolves according to configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::TopologyConfig;
use crate::error::GoalError;
use crate::goal::GoalId;
use crate::procedures::param;

/// Identifier of the rule decision that produced a goal request. It is
/// echoed back to the rules engine when the decision is marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub u32);

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// A named decision emitted by one of the topology rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyDecision {
    PrimaryPairPeer = 0x0100,
    PrimarySetPrimaryAddress,
    PrimarySetPrimaryAddressFindRole,
    PrimaryFindRole,
    PrimaryCancelFindRole,
    PrimaryNoRoleIdle,
    PrimaryBecomePrimary,
    PrimaryBecomeSecondary,
    PrimaryBecomeActingPrimary,
    PrimaryRoleSwitchToSecondary,
    PrimaryPrimaryFindRole,
    PrimaryConnectPeerProfiles,
    PrimaryConnectablePeer,
    PrimaryDisconnectPeerProfiles,
    PrimaryReleasePeer,
    PrimaryConnectableHandset,
    PrimaryConnectHandset,
    PrimaryDisconnectHandset,
    PrimaryDisconnectPeerFindRole,
    PrimaryHandoverStart,
    PrimaryHandoverInCaseTimeout,
    PrimaryStaticHandoverInCase,
    PrimaryDfuRole,

    SecondaryFindRole = 0x0200,
    SecondaryConnectPeer,
    SecondaryNoRoleIdle,
    SecondaryNoRoleFindRole,
    SecondaryDfuRole,
    SecondaryStaticHandover,

    DfuLinklossSecondary = 0x0300,
    DfuNoRoleIdle,
    DfuInCase,
    DfuNoRoleFindRole,
    DfuConnectableHandset,
    DfuSecondary,
    DfuPrimary,
}

impl TopologyDecision {
    pub const ALL: [TopologyDecision; 36] = [
        TopologyDecision::PrimaryPairPeer,
        TopologyDecision::PrimarySetPrimaryAddress,
        TopologyDecision::PrimarySetPrimaryAddressFindRole,
        TopologyDecision::PrimaryFindRole,
        TopologyDecision::PrimaryCancelFindRole,
        TopologyDecision::PrimaryNoRoleIdle,
        TopologyDecision::PrimaryBecomePrimary,
        TopologyDecision::PrimaryBecomeSecondary,
        TopologyDecision::PrimaryBecomeActingPrimary,
        TopologyDecision::PrimaryRoleSwitchToSecondary,
        TopologyDecision::PrimaryPrimaryFindRole,
        TopologyDecision::PrimaryConnectPeerProfiles,
        TopologyDecision::PrimaryConnectablePeer,
        TopologyDecision::PrimaryDisconnectPeerProfiles,
        TopologyDecision::PrimaryReleasePeer,
        TopologyDecision::PrimaryConnectableHandset,
        TopologyDecision::PrimaryConnectHandset,
        TopologyDecision::PrimaryDisconnectHandset,
        TopologyDecision::PrimaryDisconnectPeerFindRole,
        TopologyDecision::PrimaryHandoverStart,
        TopologyDecision::PrimaryHandoverInCaseTimeout,
        TopologyDecision::PrimaryStaticHandoverInCase,
        TopologyDecision::PrimaryDfuRole,
        TopologyDecision::SecondaryFindRole,
        TopologyDecision::SecondaryConnectPeer,
        TopologyDecision::SecondaryNoRoleIdle,
        TopologyDecision::SecondaryNoRoleFindRole,
        TopologyDecision::SecondaryDfuRole,
        TopologyDecision::SecondaryStaticHandover,
        TopologyDecision::DfuLinklossSecondary,
        TopologyDecision::DfuNoRoleIdle,
        TopologyDecision::DfuInCase,
        TopologyDecision::DfuNoRoleFindRole,
        TopologyDecision::DfuConnectableHandset,
        TopologyDecision::DfuSecondary,
        TopologyDecision::DfuPrimary,
    ];

    pub fn id(self) -> DecisionId {
        DecisionId(self as u32)
    }

    pub fn from_id(id: DecisionId) -> Option<Self> {
        Self::ALL.iter().copied().find(|decision| decision.id() == id)
    }

    /// The goal this decision requests under `config`.
    pub fn goal(self, config: &TopologyConfig) -> GoalId {
        use GoalId as G;
        use TopologyDecision as D;
        match self {
            D::PrimaryPairPeer => G::PairPeer,
            D::PrimarySetPrimaryAddress => G::SetAddress,
            D::PrimarySetPrimaryAddressFindRole => G::SetPrimaryAddressAndFindRole,
            D::PrimaryFindRole | D::SecondaryFindRole => G::FindRole,
            D::PrimaryCancelFindRole => G::CancelFindRole,
            D::PrimaryNoRoleIdle | D::SecondaryNoRoleIdle | D::DfuNoRoleIdle => G::NoRoleIdle,
            D::PrimaryBecomePrimary => G::BecomePrimary,
            D::PrimaryBecomeSecondary => G::BecomeSecondary,
            D::PrimaryBecomeActingPrimary => G::BecomeActingPrimary,
            D::PrimaryRoleSwitchToSecondary => G::RoleSwitchToSecondary,
            D::PrimaryPrimaryFindRole => G::PrimaryFindRole,
            D::PrimaryConnectPeerProfiles => G::PrimaryConnectPeerProfiles,
            D::PrimaryConnectablePeer => G::PrimaryConnectablePeer,
            D::PrimaryDisconnectPeerProfiles => G::PrimaryDisconnectPeerProfiles,
            D::PrimaryReleasePeer => G::ReleasePeer,
            D::PrimaryConnectableHandset | D::DfuConnectableHandset => G::ConnectableHandset,
            D::PrimaryConnectHandset => G::ConnectHandset,
            D::PrimaryDisconnectHandset => G::DisconnectHandset,
            D::PrimaryDisconnectPeerFindRole => G::DisconnectPeerFindRole,
            D::PrimaryHandoverStart => {
                if config.handover.dynamic_handover_supported {
                    G::HandoverEnteringCase
                } else {
                    G::PrimaryStaticHandoverInCase
                }
            }
            D::PrimaryHandoverInCaseTimeout => G::HandoverInCaseTimeout,
            D::PrimaryStaticHandoverInCase => G::PrimaryStaticHandoverInCase,
            D::PrimaryDfuRole | D::SecondaryDfuRole => G::DfuRole,
            D::SecondaryConnectPeer | D::DfuLinklossSecondary => G::SecondaryConnectPeer,
            D::SecondaryNoRoleFindRole | D::DfuNoRoleFindRole => G::NoRoleFindRole,
            D::SecondaryStaticHandover => G::SecondaryStaticHandover,
            D::DfuInCase => G::DfuInCase,
            D::DfuSecondary => G::DfuSecondary,
            D::DfuPrimary => G::DfuPrimary,
        }
    }

    /// Parameter block used when the decision carries none of its own.
    pub fn default_payload(self) -> &'static [u8] {
        match self {
            TopologyDecision::PrimarySetPrimaryAddress => param::ADDRESS_PRIMARY,
            TopologyDecision::PrimaryFindRole | TopologyDecision::SecondaryFindRole => {
                param::FIND_ROLE_TIMEOUT
            }
            TopologyDecision::PrimaryPrimaryFindRole => param::FIND_ROLE_CONTINUOUS,
            _ => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        use TopologyDecision as D;
        match self {
            D::PrimaryPairPeer => "primary_pair_peer",
            D::PrimarySetPrimaryAddress => "primary_set_primary_address",
            D::PrimarySetPrimaryAddressFindRole => "primary_set_primary_address_find_role",
            D::PrimaryFindRole => "primary_find_role",
            D::PrimaryCancelFindRole => "primary_cancel_find_role",
            D::PrimaryNoRoleIdle => "primary_no_role_idle",
            D::PrimaryBecomePrimary => "primary_become_primary",
            D::PrimaryBecomeSecondary => "primary_become_secondary",
            D::PrimaryBecomeActingPrimary => "primary_become_acting_primary",
            D::PrimaryRoleSwitchToSecondary => "primary_role_switch_to_secondary",
            D::PrimaryPrimaryFindRole => "primary_primary_find_role",
            D::PrimaryConnectPeerProfiles => "primary_connect_peer_profiles",
            D::PrimaryConnectablePeer => "primary_connectable_peer",
            D::PrimaryDisconnectPeerProfiles => "primary_disconnect_peer_profiles",
            D::PrimaryReleasePeer => "primary_release_peer",
            D::PrimaryConnectableHandset => "primary_connectable_handset",
            D::PrimaryConnectHandset => "primary_connect_handset",
            D::PrimaryDisconnectHandset => "primary_disconnect_handset",
            D::PrimaryDisconnectPeerFindRole => "primary_disconnect_peer_find_role",
            D::PrimaryHandoverStart => "primary_handover_start",
            D::PrimaryHandoverInCaseTimeout => "primary_handover_in_case_timeout",
            D::PrimaryStaticHandoverInCase => "primary_static_handover_in_case",
            D::PrimaryDfuRole => "primary_dfu_role",
            D::SecondaryFindRole => "secondary_find_role",
            D::SecondaryConnectPeer => "secondary_connect_peer",
            D::SecondaryNoRoleIdle => "secondary_no_role_idle",
            D::SecondaryNoRoleFindRole => "secondary_no_role_find_role",
            D::SecondaryDfuRole => "secondary_dfu_role",
            D::SecondaryStaticHandover => "secondary_static_handover",
            D::DfuLinklossSecondary => "dfu_linkloss_secondary",
            D::DfuNoRoleIdle => "dfu_no_role_idle",
            D::DfuInCase => "dfu_in_case",
            D::DfuNoRoleFindRole => "dfu_no_role_find_role",
            D::DfuConnectableHandset => "dfu_connectable_handset",
            D::DfuSecondary => "dfu_secondary",
            D::DfuPrimary => "dfu_primary",
        }
    }
}

impl fmt::Display for TopologyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyDecision {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|decision| decision.as_str() == s)
            .ok_or_else(|| GoalError::UnknownDecision(s.to_string()))
    }
}
