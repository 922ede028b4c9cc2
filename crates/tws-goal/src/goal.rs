// goal.rs — Goal identifiers and goal bitmasks.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GoalError;

/// Number of goals known to the topology.
pub const GOAL_COUNT: usize = 31;

const _: () = assert!(GOAL_COUNT <= 64, "goal mask is a u64");

/// A named topology objective.
///
/// The discriminant is the goal's bit position in a [`GoalMask`]; it also
/// fixes the order in which goals are visited when cancelling everything
/// that is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalId {
    PairPeer = 0,
    FindRole,
    SecondaryConnectPeer,
    PrimaryConnectPeerProfiles,
    PrimaryDisconnectPeerProfiles,
    PrimaryConnectablePeer,
    NoRoleIdle,
    SetRole,
    ConnectHandset,
    DisconnectHandset,
    ConnectableHandset,
    BecomePrimary,
    BecomeSecondary,
    BecomeActingPrimary,
    SetAddress,
    SetPrimaryAddressAndFindRole,
    RoleSwitchToSecondary,
    NoRoleFindRole,
    CancelFindRole,
    PrimaryFindRole,
    DfuRole,
    DfuPrimary,
    DfuSecondary,
    DfuInCase,
    DisconnectPeerFindRole,
    ReleasePeer,
    HandoverEnteringCase,
    HandoverInCaseTimeout,
    SecondaryStaticHandover,
    PrimaryStaticHandoverInCase,
    PrimaryStaticHandover,
}

impl GoalId {
    pub const ALL: [GoalId; GOAL_COUNT] = [
        GoalId::PairPeer,
        GoalId::FindRole,
        GoalId::SecondaryConnectPeer,
        GoalId::PrimaryConnectPeerProfiles,
        GoalId::PrimaryDisconnectPeerProfiles,
        GoalId::PrimaryConnectablePeer,
        GoalId::NoRoleIdle,
        GoalId::SetRole,
        GoalId::ConnectHandset,
        GoalId::DisconnectHandset,
        GoalId::ConnectableHandset,
        GoalId::BecomePrimary,
        GoalId::BecomeSecondary,
        GoalId::BecomeActingPrimary,
        GoalId::SetAddress,
        GoalId::SetPrimaryAddressAndFindRole,
        GoalId::RoleSwitchToSecondary,
        GoalId::NoRoleFindRole,
        GoalId::CancelFindRole,
        GoalId::PrimaryFindRole,
        GoalId::DfuRole,
        GoalId::DfuPrimary,
        GoalId::DfuSecondary,
        GoalId::DfuInCase,
        GoalId::DisconnectPeerFindRole,
        GoalId::ReleasePeer,
        GoalId::HandoverEnteringCase,
        GoalId::HandoverInCaseTimeout,
        GoalId::SecondaryStaticHandover,
        GoalId::PrimaryStaticHandoverInCase,
        GoalId::PrimaryStaticHandover,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self, GoalError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| GoalError::UnknownGoal(format!("index {}", index)))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GoalId::PairPeer => "pair_peer",
            GoalId::FindRole => "find_role",
            GoalId::SecondaryConnectPeer => "secondary_connect_peer",
            GoalId::PrimaryConnectPeerProfiles => "primary_connect_peer_profiles",
            GoalId::PrimaryDisconnectPeerProfiles => "primary_disconnect_peer_profiles",
            GoalId::PrimaryConnectablePeer => "primary_connectable_peer",
            GoalId::NoRoleIdle => "no_role_idle",
            GoalId::SetRole => "set_role",
            GoalId::ConnectHandset => "connect_handset",
            GoalId::DisconnectHandset => "disconnect_handset",
            GoalId::ConnectableHandset => "connectable_handset",
            GoalId::BecomePrimary => "become_primary",
            GoalId::BecomeSecondary => "become_secondary",
            GoalId::BecomeActingPrimary => "become_acting_primary",
            GoalId::SetAddress => "set_address",
            GoalId::SetPrimaryAddressAndFindRole => "set_primary_address_and_find_role",
            GoalId::RoleSwitchToSecondary => "role_switch_to_secondary",
            GoalId::NoRoleFindRole => "no_role_find_role",
            GoalId::CancelFindRole => "cancel_find_role",
            GoalId::PrimaryFindRole => "primary_find_role",
            GoalId::DfuRole => "dfu_role",
            GoalId::DfuPrimary => "dfu_primary",
            GoalId::DfuSecondary => "dfu_secondary",
            GoalId::DfuInCase => "dfu_in_case",
            GoalId::DisconnectPeerFindRole => "disconnect_peer_find_role",
            GoalId::ReleasePeer => "release_peer",
            GoalId::HandoverEnteringCase => "handover_entering_case",
            GoalId::HandoverInCaseTimeout => "handover_in_case_timeout",
            GoalId::SecondaryStaticHandover => "secondary_static_handover",
            GoalId::PrimaryStaticHandoverInCase => "primary_static_handover_in_case",
            GoalId::PrimaryStaticHandover => "primary_static_handover",
        }
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalId {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|goal| goal.as_str() == s)
            .ok_or_else(|| GoalError::UnknownGoal(s.to_string()))
    }
}

/// A set of goals, one bit per [`GoalId`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GoalMask(u64);

impl GoalMask {
    pub const EMPTY: GoalMask = GoalMask(0);

    pub const fn of(goal: GoalId) -> Self {
        GoalMask(1 << goal.index())
    }

    pub const fn from_goals(goals: &[GoalId]) -> Self {
        let mut bits = 0u64;
        let mut i = 0;
        while i < goals.len() {
            bits |= 1 << goals[i].index();
            i += 1;
        }
        GoalMask(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, goal: GoalId) -> bool {
        self.0 & (1 << goal.index()) != 0
    }

    pub fn insert(&mut self, goal: GoalId) {
        self.0 |= 1 << goal.index();
    }

    pub fn remove(&mut self, goal: GoalId) {
        self.0 &= !(1 << goal.index());
    }

    pub const fn union(self, other: GoalMask) -> GoalMask {
        GoalMask(self.0 | other.0)
    }

    /// Goals in `self` that are not in `other`.
    pub const fn difference(self, other: GoalMask) -> GoalMask {
        GoalMask(self.0 & !other.0)
    }

    pub const fn intersects(self, other: GoalMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Goals in ascending bit order.
    pub fn iter(self) -> impl Iterator<Item = GoalId> {
        GoalId::ALL.into_iter().filter(move |goal| self.contains(*goal))
    }
}

impl From<GoalId> for GoalMask {
    fn from(goal: GoalId) -> Self {
        GoalMask::of(goal)
    }
}

impl FromIterator<GoalId> for GoalMask {
    fn from_iter<I: IntoIterator<Item = GoalId>>(iter: I) -> Self {
        let mut mask = GoalMask::EMPTY;
        for goal in iter {
            mask.insert(goal);
        }
        mask
    }
}

impl BitOr for GoalMask {
    type Output = GoalMask;

    fn bitor(self, rhs: GoalMask) -> GoalMask {
        self.union(rhs)
    }
}

impl BitAnd for GoalMask {
    type Output = GoalMask;

    fn bitand(self, rhs: GoalMask) -> GoalMask {
        GoalMask(self.0 & rhs.0)
    }
}

impl Not for GoalMask {
    type Output = GoalMask;

    fn not(self) -> GoalMask {
        GoalMask(!self.0 & ((1u64 << GOAL_COUNT) - 1))
    }
}

impl fmt::Debug for GoalMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for GoalMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{{}}");
        }
        let names: Vec<&str> = self.iter().map(GoalId::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl Serialize for GoalMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for GoalMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let goals = Vec::<GoalId>::deserialize(deserializer)?;
        Ok(goals.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_indexed_by_discriminant() {
        for (i, goal) in GoalId::ALL.iter().enumerate() {
            assert_eq!(goal.index(), i);
            assert_eq!(GoalId::from_index(i).unwrap(), *goal);
            assert_eq!(goal.as_str().parse::<GoalId>().unwrap(), *goal);
        }
        assert!(matches!(
            GoalId::from_index(GOAL_COUNT),
            Err(GoalError::UnknownGoal(_))
        ));
        assert!("teleport".parse::<GoalId>().is_err());
    }

    #[test]
    fn mask_set_operations() {
        let mut mask = GoalMask::from_goals(&[GoalId::FindRole, GoalId::SetRole]);
        assert!(mask.contains(GoalId::FindRole));
        assert!(!mask.contains(GoalId::PairPeer));
        assert_eq!(mask.len(), 2);

        mask.insert(GoalId::PairPeer);
        mask.remove(GoalId::FindRole);
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![GoalId::PairPeer, GoalId::SetRole]
        );

        let other = GoalMask::of(GoalId::SetRole);
        assert_eq!(mask.difference(other), GoalMask::of(GoalId::PairPeer));
        assert!(mask.intersects(other));
        assert_eq!((!GoalMask::EMPTY).len(), GOAL_COUNT);
    }

    #[test]
    fn mask_serializes_as_goal_names() {
        let mask = GoalMask::from_goals(&[GoalId::ConnectHandset, GoalId::PairPeer]);
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, r#"["pair_peer","connect_handset"]"#);
        let restored: GoalMask = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, mask);
        assert_eq!(mask.to_string(), "{pair_peer, connect_handset}");
    }
}
