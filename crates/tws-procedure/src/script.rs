// script.rs — Static, ordered lists of procedure steps.

use crate::procedure::ProcedureKey;

/// One step of a script: the procedure to run and the parameter block it
/// is started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptStep<K: 'static> {
    pub procedure: K,
    pub payload: &'static [u8],
}

impl<K: ProcedureKey> ScriptStep<K> {
    pub const fn new(procedure: K, payload: &'static [u8]) -> Self {
        Self { procedure, payload }
    }

    /// A step that takes no parameters.
    pub const fn bare(procedure: K) -> Self {
        Self {
            procedure,
            payload: &[],
        }
    }
}

/// A named composite procedure. Steps run strictly in order; a script
/// succeeds only when every step succeeds.
#[derive(Debug, PartialEq, Eq)]
pub struct Script<K: 'static> {
    pub name: &'static str,
    pub steps: &'static [ScriptStep<K>],
}

impl<K: ProcedureKey> Script<K> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every procedure key the script uses, in step order.
    pub fn procedures(&self) -> impl Iterator<Item = K> + '_ {
        self.steps.iter().map(|step| step.procedure)
    }
}
