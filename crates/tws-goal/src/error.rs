// error.rs — Error types for goal admission and orchestration.

use thiserror::Error;
use tws_procedure::{ProcedureError, ProcedureHandle};

use crate::goal::GoalId;

/// Errors that can occur while scheduling goals.
///
/// Procedure-reported failures and timeouts are not errors; they are routed
/// to the goal's configured rule events. The variants below are either
/// broken invariants (a misbehaving caller, procedure or table) or plumbing
/// failures around the orchestrator.
#[derive(Debug, Error)]
pub enum GoalError {
    /// A goal name or index does not identify any goal.
    #[error("unknown goal: {0}")]
    UnknownGoal(String),

    /// A procedure name does not identify any procedure kind.
    #[error("unknown procedure kind: {0}")]
    UnknownProcedureKind(String),

    /// A decision name does not identify any rules-engine decision.
    #[error("unknown decision: {0}")]
    UnknownDecision(String),

    /// The goal was requested while already running.
    #[error("goal {goal} requested while already active")]
    GoalAlreadyActive { goal: GoalId },

    /// A confirmation named a procedure run the orchestrator never started.
    #[error("confirmation for unknown procedure run {handle}")]
    UnknownProcedure { handle: ProcedureHandle },

    /// A confirmation arrived that the run cannot accept.
    #[error("unexpected {confirmation} for goal {goal} ({handle})")]
    UnexpectedConfirmation {
        goal: GoalId,
        handle: ProcedureHandle,
        confirmation: String,
    },

    /// The goal table breaks one of its structural rules.
    #[error("invalid goal table entry for {goal}: {reason}")]
    InvalidTable { goal: GoalId, reason: String },

    /// Procedures named by the goal table have no registered instance.
    #[error("procedures not registered: {0}")]
    MissingProcedures(String),

    /// A procedure runner rejected an operation.
    #[error("procedure error: {0}")]
    Procedure(#[from] ProcedureError),

    /// The orchestrator hit an invariant violation earlier and refuses to
    /// continue.
    #[error("orchestrator faulted: {0}")]
    Faulted(String),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize notification data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error("invalid config at {path}: {source}")]
    ConfigError {
        path: String,
        source: toml::de::Error,
    },

    /// A trail sink failed to record an entry (non-fatal).
    #[error("notification error: {0}")]
    NotificationError(String),
}

impl GoalError {
    /// True for errors that mean the scheduler's state can no longer be
    /// trusted. These latch the orchestrator's fault.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            GoalError::UnknownGoal(_)
                | GoalError::GoalAlreadyActive { .. }
                | GoalError::UnknownProcedure { .. }
                | GoalError::UnexpectedConfirmation { .. }
                | GoalError::InvalidTable { .. }
                | GoalError::MissingProcedures(_)
                | GoalError::Procedure(_)
        )
    }
}
