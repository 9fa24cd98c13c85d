//! Solver attachment bookkeeping.
//!
//! A kinetic solver can take over stepping for a set of function instances.
//! The registry is the owning side of that association: it keeps the lookup
//! table of attached instances, while each instance holds only a copyable
//! [`SolverId`] back-reference. Detaching is always explicit via
//! [`SolverRegistry::notify_detach`]; nothing is dropped implicitly.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SolverId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionId(pub u64);

#[derive(Debug)]
pub struct SolverRegistry {
    id: SolverId,
    attached: Vec<FunctionId>,
}

impl SolverRegistry {
    pub fn new(id: SolverId) -> Self {
        Self {
            id,
            attached: Vec::new(),
        }
    }

    pub fn id(&self) -> SolverId {
        self.id
    }

    /// Register a function instance; re-attaching is a no-op.
    pub fn attach(&mut self, func: FunctionId) {
        if !self.attached.contains(&func) {
            self.attached.push(func);
        }
    }

    /// Remove a function instance at teardown. Unknown ids are ignored.
    pub fn notify_detach(&mut self, func: FunctionId) {
        self.attached.retain(|attached| *attached != func);
    }

    pub fn is_attached(&self, func: FunctionId) -> bool {
        self.attached.contains(&func)
    }

    pub fn attached(&self) -> &[FunctionId] {
        &self.attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_detach_round_trip() {
        let mut registry = SolverRegistry::new(SolverId(1));
        registry.attach(FunctionId(10));
        registry.attach(FunctionId(11));
        assert!(registry.is_attached(FunctionId(10)));
        assert_eq!(registry.attached().len(), 2);

        registry.notify_detach(FunctionId(10));
        assert!(!registry.is_attached(FunctionId(10)));
        assert!(registry.is_attached(FunctionId(11)));
    }

    #[test]
    fn attach_is_idempotent() {
        let mut registry = SolverRegistry::new(SolverId(1));
        registry.attach(FunctionId(5));
        registry.attach(FunctionId(5));
        assert_eq!(registry.attached().len(), 1);
    }

    #[test]
    fn detach_of_unknown_id_is_ignored() {
        let mut registry = SolverRegistry::new(SolverId(1));
        registry.notify_detach(FunctionId(99));
        assert!(registry.attached().is_empty());
    }
}
