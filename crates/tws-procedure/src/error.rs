// error.rs — Error types for procedure registration and execution.

use thiserror::Error;

/// Errors raised while driving procedures.
///
/// All of these indicate a broken contract between a procedure and its
/// runner rather than a failed procedure; a procedure that fails reports
/// [`crate::ProcResult::Failed`] through its completion instead.
#[derive(Debug, Error)]
pub enum ProcedureError {
    /// No procedure instance is registered under the key.
    #[error("procedure not registered: {procedure}")]
    NotRegistered { procedure: String },

    /// `start` was called on a runner that has not finished its previous run.
    #[error("runner for {procedure} is already {state}")]
    AlreadyRunning { procedure: String, state: String },

    /// A confirmation arrived that the runner cannot accept in its state.
    #[error("unexpected {confirmation} for {procedure} while {state}")]
    UnexpectedConfirmation {
        procedure: String,
        state: String,
        confirmation: String,
    },
}
