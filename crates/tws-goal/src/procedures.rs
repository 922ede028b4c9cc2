// procedures.rs — Procedure kinds, their parameter blocks, and the named
// scripts composed from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tws_procedure::{Script, ScriptStep};

use crate::error::GoalError;

/// Every primitive procedure the topology can run, as a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    PairPeer,
    FindRole,
    CancelFindRole,
    SecConnectPeer,
    PriConnectPeerProfiles,
    DisconnectPeerProfiles,
    PriConnectablePeer,
    ReleasePeer,
    WaitPeerLinkDrop,
    SetRole,
    SetAddress,
    ConnectHandset,
    DisconnectHandset,
    ConnectableHandset,
    AllowHandsetConnect,
    LeConnectable,
    DisconnectLeConnections,
    PermitBt,
    ProhibitBt,
    PermitConnectionLe,
    ProhibitConnectionLe,
    CleanConnections,
    CommandRoleSwitch,
    Handover,
    EventSuppress,
    DfuInCase,
}

impl ProcedureKind {
    pub const ALL: [ProcedureKind; 26] = [
        ProcedureKind::PairPeer,
        ProcedureKind::FindRole,
        ProcedureKind::CancelFindRole,
        ProcedureKind::SecConnectPeer,
        ProcedureKind::PriConnectPeerProfiles,
        ProcedureKind::DisconnectPeerProfiles,
        ProcedureKind::PriConnectablePeer,
        ProcedureKind::ReleasePeer,
        ProcedureKind::WaitPeerLinkDrop,
        ProcedureKind::SetRole,
        ProcedureKind::SetAddress,
        ProcedureKind::ConnectHandset,
        ProcedureKind::DisconnectHandset,
        ProcedureKind::ConnectableHandset,
        ProcedureKind::AllowHandsetConnect,
        ProcedureKind::LeConnectable,
        ProcedureKind::DisconnectLeConnections,
        ProcedureKind::PermitBt,
        ProcedureKind::ProhibitBt,
        ProcedureKind::PermitConnectionLe,
        ProcedureKind::ProhibitConnectionLe,
        ProcedureKind::CleanConnections,
        ProcedureKind::CommandRoleSwitch,
        ProcedureKind::Handover,
        ProcedureKind::EventSuppress,
        ProcedureKind::DfuInCase,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcedureKind::PairPeer => "pair_peer",
            ProcedureKind::FindRole => "find_role",
            ProcedureKind::CancelFindRole => "cancel_find_role",
            ProcedureKind::SecConnectPeer => "sec_connect_peer",
            ProcedureKind::PriConnectPeerProfiles => "pri_connect_peer_profiles",
            ProcedureKind::DisconnectPeerProfiles => "disconnect_peer_profiles",
            ProcedureKind::PriConnectablePeer => "pri_connectable_peer",
            ProcedureKind::ReleasePeer => "release_peer",
            ProcedureKind::WaitPeerLinkDrop => "wait_peer_link_drop",
            ProcedureKind::SetRole => "set_role",
            ProcedureKind::SetAddress => "set_address",
            ProcedureKind::ConnectHandset => "connect_handset",
            ProcedureKind::DisconnectHandset => "disconnect_handset",
            ProcedureKind::ConnectableHandset => "connectable_handset",
            ProcedureKind::AllowHandsetConnect => "allow_handset_connect",
            ProcedureKind::LeConnectable => "le_connectable",
            ProcedureKind::DisconnectLeConnections => "disconnect_le_connections",
            ProcedureKind::PermitBt => "permit_bt",
            ProcedureKind::ProhibitBt => "prohibit_bt",
            ProcedureKind::PermitConnectionLe => "permit_connection_le",
            ProcedureKind::ProhibitConnectionLe => "prohibit_connection_le",
            ProcedureKind::CleanConnections => "clean_connections",
            ProcedureKind::CommandRoleSwitch => "command_role_switch",
            ProcedureKind::Handover => "handover",
            ProcedureKind::EventSuppress => "event_suppress",
            ProcedureKind::DfuInCase => "dfu_in_case",
        }
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcedureKind {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GoalError::UnknownProcedureKind(s.to_string()))
    }
}

/// Parameter blocks passed to procedures. Each is a single byte whose
/// meaning is private to the receiving procedure.
pub mod param {
    pub const ADDRESS_PRIMARY: &[u8] = &[0x00];
    pub const ADDRESS_SECONDARY: &[u8] = &[0x01];

    pub const ROLE_NONE: &[u8] = &[0x00];
    pub const ROLE_PRIMARY: &[u8] = &[0x01];
    pub const ROLE_SECONDARY: &[u8] = &[0x02];
    pub const ROLE_ACTING_PRIMARY: &[u8] = &[0x03];
    pub const ROLE_DFU: &[u8] = &[0x04];

    pub const FIND_ROLE_TIMEOUT: &[u8] = &[0x00];
    pub const FIND_ROLE_CONTINUOUS: &[u8] = &[0x01];

    /// Shared by connectable_handset, pri_connectable_peer, le_connectable
    /// and allow_handset_connect.
    pub const DISABLE: &[u8] = &[0x00];
    pub const ENABLE: &[u8] = &[0x01];

    pub const PEER_PROFILES_ALL: &[u8] = &[0xff];

    pub const EVENTS_SUPPRESS: &[u8] = &[0x01];
    pub const EVENTS_EXPOSE_OUT_CASE: &[u8] = &[0x00];

    pub const LINK_DROP_DEFAULT_TIMEOUT: &[u8] = &[0x00];

    /// Human-readable name for a script step parameter, for listings.
    pub fn describe(kind: super::ProcedureKind, payload: &[u8]) -> Option<&'static str> {
        use super::ProcedureKind as K;
        let value = *payload.first()?;
        let name = match (kind, value) {
            (K::SetAddress, 0x00) => "primary",
            (K::SetAddress, 0x01) => "secondary",
            (K::SetRole, 0x00) => "none",
            (K::SetRole, 0x01) => "primary",
            (K::SetRole, 0x02) => "secondary",
            (K::SetRole, 0x03) => "acting_primary",
            (K::SetRole, 0x04) => "dfu",
            (K::FindRole, 0x00) => "timeout",
            (K::FindRole, 0x01) => "continuous",
            (K::DisconnectPeerProfiles, 0xff) => "all",
            (K::EventSuppress, 0x01) => "suppress",
            (K::EventSuppress, 0x00) => "expose_out_case",
            (K::WaitPeerLinkDrop, 0x00) => "default_timeout",
            (
                K::ConnectableHandset | K::PriConnectablePeer | K::LeConnectable,
                0x00,
            ) => "disable",
            (
                K::ConnectableHandset | K::PriConnectablePeer | K::LeConnectable,
                0x01,
            ) => "enable",
            (K::AllowHandsetConnect, 0x00) => "disallow",
            (K::AllowHandsetConnect, 0x01) => "allow",
            _ => return None,
        };
        Some(name)
    }
}

use param::*;
use ProcedureKind as P;

const fn step(procedure: ProcedureKind, payload: &'static [u8]) -> ScriptStep<ProcedureKind> {
    ScriptStep::new(procedure, payload)
}

const fn bare(procedure: ProcedureKind) -> ScriptStep<ProcedureKind> {
    ScriptStep::bare(procedure)
}

pub static PAIR_PEER: Script<ProcedureKind> = Script {
    name: "pair_peer",
    steps: &[bare(P::PairPeer)],
};

pub static NO_ROLE_IDLE: Script<ProcedureKind> = Script {
    name: "no_role_idle",
    steps: &[
        step(P::ConnectableHandset, DISABLE),
        step(P::PriConnectablePeer, DISABLE),
        step(P::AllowHandsetConnect, DISABLE),
        bare(P::DisconnectHandset),
        step(P::DisconnectPeerProfiles, PEER_PROFILES_ALL),
        bare(P::CancelFindRole),
        bare(P::ProhibitBt),
        bare(P::ProhibitConnectionLe),
        step(P::LeConnectable, DISABLE),
        bare(P::CleanConnections),
        step(P::SetAddress, ADDRESS_PRIMARY),
        step(P::SetRole, ROLE_NONE),
        bare(P::PermitBt),
        bare(P::PermitConnectionLe),
    ],
};

pub static PRIMARY_ROLE: Script<ProcedureKind> = Script {
    name: "primary_role",
    steps: &[step(P::SetRole, ROLE_PRIMARY)],
};

pub static SECONDARY_ROLE: Script<ProcedureKind> = Script {
    name: "secondary_role",
    steps: &[
        bare(P::ProhibitBt),
        bare(P::CleanConnections),
        step(P::SetAddress, ADDRESS_SECONDARY),
        step(P::SetRole, ROLE_SECONDARY),
        bare(P::PermitBt),
    ],
};

pub static ACTING_PRIMARY_ROLE: Script<ProcedureKind> = Script {
    name: "acting_primary_role",
    steps: &[step(P::SetRole, ROLE_PRIMARY)],
};

pub static SET_PRIMARY_ADDRESS: Script<ProcedureKind> = Script {
    name: "set_primary_address",
    steps: &[
        bare(P::ProhibitBt),
        step(P::SetAddress, ADDRESS_PRIMARY),
        bare(P::PermitBt),
    ],
};

pub static PRIMARY_ADDRESS_FIND_ROLE: Script<ProcedureKind> = Script {
    name: "primary_address_find_role",
    steps: &[
        bare(P::ProhibitBt),
        bare(P::ProhibitConnectionLe),
        step(P::SetAddress, ADDRESS_PRIMARY),
        bare(P::PermitBt),
        bare(P::PermitConnectionLe),
        step(P::FindRole, FIND_ROLE_TIMEOUT),
    ],
};

pub static SWITCH_TO_SECONDARY: Script<ProcedureKind> = Script {
    name: "switch_to_secondary",
    steps: &[
        bare(P::DisconnectHandset),
        step(P::DisconnectPeerProfiles, PEER_PROFILES_ALL),
        bare(P::ProhibitBt),
        bare(P::ProhibitConnectionLe),
        bare(P::CleanConnections),
        step(P::SetAddress, ADDRESS_SECONDARY),
        step(P::SetRole, ROLE_SECONDARY),
        bare(P::PermitBt),
        bare(P::PermitConnectionLe),
        bare(P::SecConnectPeer),
    ],
};

pub static NO_ROLE_FIND_ROLE: Script<ProcedureKind> = Script {
    name: "no_role_find_role",
    steps: &[
        step(P::EventSuppress, EVENTS_SUPPRESS),
        bare(P::ProhibitBt),
        bare(P::ProhibitConnectionLe),
        bare(P::CleanConnections),
        step(P::SetAddress, ADDRESS_PRIMARY),
        step(P::SetRole, ROLE_NONE),
        bare(P::PermitBt),
        bare(P::PermitConnectionLe),
        step(P::EventSuppress, EVENTS_EXPOSE_OUT_CASE),
        step(P::FindRole, FIND_ROLE_TIMEOUT),
    ],
};

pub static PRIMARY_FIND_ROLE: Script<ProcedureKind> = Script {
    name: "primary_find_role",
    steps: &[step(P::FindRole, FIND_ROLE_CONTINUOUS)],
};

pub static DFU_ROLE: Script<ProcedureKind> = Script {
    name: "dfu_role",
    steps: &[step(P::SetRole, ROLE_DFU)],
};

pub static DFU_PRIMARY_AFTER_BOOT: Script<ProcedureKind> = Script {
    name: "dfu_primary_after_boot",
    steps: &[
        step(P::SetAddress, ADDRESS_PRIMARY),
        step(P::SetRole, ROLE_PRIMARY),
        step(P::FindRole, FIND_ROLE_CONTINUOUS),
    ],
};

pub static DFU_SECONDARY_AFTER_BOOT: Script<ProcedureKind> = Script {
    name: "dfu_secondary_after_boot",
    steps: &[
        step(P::SetAddress, ADDRESS_SECONDARY),
        bare(P::PermitBt),
        step(P::PriConnectablePeer, ENABLE),
    ],
};

pub static DISCONNECT_PEER_FIND_ROLE: Script<ProcedureKind> = Script {
    name: "disconnect_peer_find_role",
    steps: &[
        step(P::DisconnectPeerProfiles, PEER_PROFILES_ALL),
        step(P::FindRole, FIND_ROLE_TIMEOUT),
    ],
};

pub static HANDOVER_ENTERING_CASE: Script<ProcedureKind> = Script {
    name: "handover_entering_case",
    steps: &[
        step(P::LeConnectable, DISABLE),
        bare(P::DisconnectLeConnections),
        bare(P::Handover),
        step(P::SetRole, ROLE_SECONDARY),
    ],
};

pub static HANDOVER_ENTERING_CASE_TIMEOUT: Script<ProcedureKind> = Script {
    name: "handover_entering_case_timeout",
    steps: &[step(P::LeConnectable, ENABLE)],
};

pub static SECONDARY_STATIC_HANDOVER: Script<ProcedureKind> = Script {
    name: "secondary_static_handover",
    steps: &[
        step(P::WaitPeerLinkDrop, LINK_DROP_DEFAULT_TIMEOUT),
        bare(P::ProhibitBt),
        step(P::SetAddress, ADDRESS_PRIMARY),
        bare(P::PermitBt),
        step(P::SetRole, ROLE_PRIMARY),
        step(P::FindRole, FIND_ROLE_CONTINUOUS),
    ],
};

pub static PRIMARY_STATIC_HANDOVER_IN_CASE: Script<ProcedureKind> = Script {
    name: "primary_static_handover_in_case",
    steps: &[
        bare(P::CommandRoleSwitch),
        step(P::ConnectableHandset, DISABLE),
        step(P::AllowHandsetConnect, DISABLE),
        step(P::PriConnectablePeer, DISABLE),
        step(P::LeConnectable, DISABLE),
        bare(P::CancelFindRole),
        bare(P::CleanConnections),
        step(P::SetRole, ROLE_NONE),
    ],
};

pub static PRIMARY_STATIC_HANDOVER: Script<ProcedureKind> = Script {
    name: "primary_static_handover",
    steps: &[
        step(P::EventSuppress, EVENTS_SUPPRESS),
        bare(P::CommandRoleSwitch),
        bare(P::CleanConnections),
        step(P::ConnectableHandset, DISABLE),
        step(P::PriConnectablePeer, DISABLE),
        bare(P::CancelFindRole),
        bare(P::ProhibitBt),
        step(P::SetAddress, ADDRESS_SECONDARY),
        bare(P::PermitBt),
        step(P::LeConnectable, DISABLE),
        step(P::EventSuppress, EVENTS_EXPOSE_OUT_CASE),
        step(P::SetRole, ROLE_SECONDARY),
    ],
};
