// procedure.rs — The procedure contract: results, handles, confirmations.
//
// A procedure reports back through a ProcedureContext. Confirmations pushed
// with the plain methods are handled as soon as the procedure call returns;
// the `*_later` variants are queued and delivered on a later dispatch turn,
// which is how a procedure says "I'm done" without re-entering the caller.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Outcome of a procedure operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcResult {
    Success,
    Failed,
    Timeout,
}

impl fmt::Display for ProcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcResult::Success => write!(f, "success"),
            ProcResult::Failed => write!(f, "failed"),
            ProcResult::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for ProcResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ProcResult::Success),
            "failed" => Ok(ProcResult::Failed),
            "timeout" => Ok(ProcResult::Timeout),
            other => Err(format!("unknown procedure result '{}'", other)),
        }
    }
}

/// Opaque token identifying one run of a procedure.
///
/// Handles are minted by whoever starts the procedure and are never reused
/// within the lifetime of that owner, so a late confirmation for a finished
/// run can always be told apart from one for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureHandle(u32);

impl ProcedureHandle {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcedureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc#{}", self.0)
    }
}

/// One of the three callbacks a procedure owes its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum Confirmation {
    /// The procedure accepted (or rejected) its start request.
    Started(ProcResult),
    /// The procedure finished. This is the last callback of a run unless a
    /// cancel was already outstanding.
    Completed(ProcResult),
    /// The procedure acknowledged a cancel request.
    Cancelled(ProcResult),
}

impl Confirmation {
    pub fn result(&self) -> ProcResult {
        match self {
            Confirmation::Started(r) | Confirmation::Completed(r) | Confirmation::Cancelled(r) => {
                *r
            }
        }
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confirmation::Started(r) => write!(f, "start-cfm({})", r),
            Confirmation::Completed(r) => write!(f, "complete({})", r),
            Confirmation::Cancelled(r) => write!(f, "cancel-cfm({})", r),
        }
    }
}

/// A confirmation addressed to a specific procedure run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureEvent {
    pub handle: ProcedureHandle,
    pub confirmation: Confirmation,
}

impl ProcedureEvent {
    pub fn started(handle: ProcedureHandle, result: ProcResult) -> Self {
        Self {
            handle,
            confirmation: Confirmation::Started(result),
        }
    }

    pub fn completed(handle: ProcedureHandle, result: ProcResult) -> Self {
        Self {
            handle,
            confirmation: Confirmation::Completed(result),
        }
    }

    pub fn cancelled(handle: ProcedureHandle, result: ProcResult) -> Self {
        Self {
            handle,
            confirmation: Confirmation::Cancelled(result),
        }
    }
}

/// Opaque parameter block handed to a procedure at start time.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload[")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        write!(f, "]")
    }
}

/// Keys that identify procedures in a registry or script.
pub trait ProcedureKey: Copy + Eq + Hash + fmt::Debug + fmt::Display + 'static {}

impl<T> ProcedureKey for T where T: Copy + Eq + Hash + fmt::Debug + fmt::Display + 'static {}

/// Reporting channel handed to a procedure for one start or cancel call.
pub struct ProcedureContext<'a> {
    handle: ProcedureHandle,
    immediate: Vec<Confirmation>,
    deferred: &'a mut VecDeque<ProcedureEvent>,
}

impl<'a> ProcedureContext<'a> {
    pub fn new(handle: ProcedureHandle, deferred: &'a mut VecDeque<ProcedureEvent>) -> Self {
        Self {
            handle,
            immediate: Vec::new(),
            deferred,
        }
    }

    /// Handle of the run this context belongs to. Procedures that complete
    /// on an external stimulus keep it and report through their owner later.
    pub fn handle(&self) -> ProcedureHandle {
        self.handle
    }

    pub fn confirm_start(&mut self, result: ProcResult) {
        self.immediate.push(Confirmation::Started(result));
    }

    pub fn complete(&mut self, result: ProcResult) {
        self.immediate.push(Confirmation::Completed(result));
    }

    pub fn confirm_cancel(&mut self, result: ProcResult) {
        self.immediate.push(Confirmation::Cancelled(result));
    }

    pub fn confirm_start_later(&mut self, result: ProcResult) {
        self.later(Confirmation::Started(result));
    }

    pub fn complete_later(&mut self, result: ProcResult) {
        self.later(Confirmation::Completed(result));
    }

    pub fn confirm_cancel_later(&mut self, result: ProcResult) {
        self.later(Confirmation::Cancelled(result));
    }

    fn later(&mut self, confirmation: Confirmation) {
        self.deferred.push_back(ProcedureEvent {
            handle: self.handle,
            confirmation,
        });
    }

    /// Drain the synchronous confirmations collected so far, in push order.
    pub fn take_immediate(&mut self) -> Vec<Confirmation> {
        std::mem::take(&mut self.immediate)
    }

    /// A fresh context for the same run that shares the deferred queue.
    pub(crate) fn child(&mut self) -> ProcedureContext<'_> {
        ProcedureContext {
            handle: self.handle,
            immediate: Vec::new(),
            deferred: &mut *self.deferred,
        }
    }
}

/// A long-running, cancellable unit of work.
///
/// Contract:
/// - `start` must eventually produce exactly one `Started` and, unless
///   cancelled first, exactly one `Completed`.
/// - `cancel` must eventually produce exactly one `Cancelled`, even when the
///   procedure has already completed (a no-op success in that case).
pub trait Procedure {
    fn name(&self) -> &str;

    fn start(&mut self, payload: &[u8], cx: &mut ProcedureContext<'_>);

    fn cancel(&mut self, cx: &mut ProcedureContext<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_separates_immediate_and_deferred() {
        let mut deferred = VecDeque::new();
        let handle = ProcedureHandle::new(7);
        let mut cx = ProcedureContext::new(handle, &mut deferred);

        cx.confirm_start(ProcResult::Success);
        cx.complete_later(ProcResult::Timeout);

        assert_eq!(
            cx.take_immediate(),
            vec![Confirmation::Started(ProcResult::Success)]
        );
        assert!(cx.take_immediate().is_empty());
        assert_eq!(
            deferred.pop_front(),
            Some(ProcedureEvent::completed(handle, ProcResult::Timeout))
        );
    }

    #[test]
    fn child_context_shares_deferred_queue() {
        let mut deferred = VecDeque::new();
        let mut cx = ProcedureContext::new(ProcedureHandle::new(1), &mut deferred);
        {
            let mut child = cx.child();
            child.confirm_cancel_later(ProcResult::Success);
            child.complete(ProcResult::Failed);
            assert_eq!(child.take_immediate().len(), 1);
        }
        assert!(cx.take_immediate().is_empty());
        assert_eq!(deferred.len(), 1);
    }

    #[test]
    fn confirmation_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Confirmation::Completed(ProcResult::Timeout)).unwrap();
        assert_eq!(json, r#"{"kind":"completed","result":"timeout"}"#);
    }

    #[test]
    fn payload_debug_is_hex() {
        let payload = Payload::from(&[0x01u8, 0xab][..]);
        assert_eq!(format!("{:?}", payload), "Payload[01 ab]");
        assert!(Payload::empty().is_empty());
    }
}
