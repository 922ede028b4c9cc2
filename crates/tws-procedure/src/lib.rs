//! # tws-procedure
//!
//! The procedure contract used by the TWS topology goal engine.
//!
//! A *procedure* is a long-running, cancellable unit of work (connect to the
//! peer, set the BD address, run a role search). Procedures never call back
//! into their client directly: they push [`Confirmation`]s into the
//! [`ProcedureContext`] they were started with, either synchronously or for
//! delivery on a later dispatch turn.
//!
//! ## Key components
//!
//! - [`Procedure`] — start/cancel contract implemented by every procedure
//! - [`ProcedureContext`] — where a procedure reports its confirmations
//! - [`ProcedureRegistry`] — keyed set of procedure instances
//! - [`Script`] — a static, ordered list of procedure steps
//! - [`ProcedureRunner`] — drives a single procedure or a script through the
//!   same start / cancel / deliver contract

pub mod error;
pub mod procedure;
pub mod registry;
pub mod runner;
pub mod script;

pub use error::ProcedureError;
pub use procedure::{
    Confirmation, Payload, ProcResult, Procedure, ProcedureContext, ProcedureEvent,
    ProcedureHandle, ProcedureKey,
};
pub use registry::ProcedureRegistry;
pub use runner::{ProcedureRunner, RunnerProcedure, RunnerState};
pub use script::{Script, ScriptStep};
