// registry.rs — Keyed set of procedure instances.

use std::collections::HashMap;

use crate::error::ProcedureError;
use crate::procedure::{Procedure, ProcedureKey};

/// Owns one procedure instance per key.
///
/// Single procedures and script steps both resolve their key here, so one
/// instance serves every goal or script that names it.
pub struct ProcedureRegistry<K: ProcedureKey> {
    procedures: HashMap<K, Box<dyn Procedure>>,
}

impl<K: ProcedureKey> ProcedureRegistry<K> {
    pub fn new() -> Self {
        Self {
            procedures: HashMap::new(),
        }
    }

    /// Register a procedure, returning the instance it replaced, if any.
    pub fn register(
        &mut self,
        key: K,
        procedure: Box<dyn Procedure>,
    ) -> Option<Box<dyn Procedure>> {
        self.procedures.insert(key, procedure)
    }

    pub fn contains(&self, key: K) -> bool {
        self.procedures.contains_key(&key)
    }

    pub fn get_mut(&mut self, key: K) -> Result<&mut dyn Procedure, ProcedureError> {
        match self.procedures.get_mut(&key) {
            Some(procedure) => Ok(procedure.as_mut()),
            None => Err(ProcedureError::NotRegistered {
                procedure: key.to_string(),
            }),
        }
    }

    /// Keys from `required` that have no registered instance, deduplicated
    /// and in first-seen order.
    pub fn missing(&self, required: impl IntoIterator<Item = K>) -> Vec<K> {
        let mut missing = Vec::new();
        for key in required {
            if !self.contains(key) && !missing.contains(&key) {
                missing.push(key);
            }
        }
        missing
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

impl<K: ProcedureKey> Default for ProcedureRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::{ProcResult, ProcedureContext};

    struct Noop(&'static str);

    impl Procedure for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn start(&mut self, _payload: &[u8], cx: &mut ProcedureContext<'_>) {
            cx.confirm_start(ProcResult::Success);
        }

        fn cancel(&mut self, cx: &mut ProcedureContext<'_>) {
            cx.confirm_cancel(ProcResult::Success);
        }
    }

    #[test]
    fn lookup_and_missing_keys() {
        let mut registry: ProcedureRegistry<&'static str> = ProcedureRegistry::new();
        assert!(registry.register("set_role", Box::new(Noop("set_role"))).is_none());
        assert!(registry
            .register("set_role", Box::new(Noop("set_role_v2")))
            .is_some());

        assert_eq!(registry.get_mut("set_role").unwrap().name(), "set_role_v2");
        assert!(matches!(
            registry.get_mut("find_role"),
            Err(ProcedureError::NotRegistered { .. })
        ));
        assert_eq!(
            registry.missing(["set_role", "find_role", "find_role", "permit_bt"]),
            vec!["find_role", "permit_bt"]
        );
        assert_eq!(registry.len(), 1);
    }
}
