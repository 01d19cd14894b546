//! Registered-but-not-yet-compiled functions.

use rustc_hash::FxHashSet;

use crate::handle::FunctionHandle;

/// Set of JIT candidates, unique by handle identity.
#[derive(Debug, Default)]
pub struct PendingSet {
    handles: FxHashSet<FunctionHandle>,
}

impl PendingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate. Returns `false` if it was already pending.
    pub fn insert(&mut self, handle: FunctionHandle) -> bool {
        self.handles.insert(handle)
    }

    /// Remove a candidate. Safe to call for handles that were never added.
    pub fn remove(&mut self, handle: &FunctionHandle) -> bool {
        self.handles.remove(handle)
    }

    /// Whether `handle` is pending.
    pub fn contains(&self, handle: &FunctionHandle) -> bool {
        self.handles.contains(handle)
    }

    /// Number of pending candidates.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Copy of the current candidates.
    pub fn snapshot(&self) -> Vec<FunctionHandle> {
        self.handles.iter().cloned().collect()
    }

    /// Move every candidate out, leaving the set empty.
    pub fn take_all(&mut self) -> Vec<FunctionHandle> {
        self.handles.drain().collect()
    }

    /// Replace the contents with `handles`, returning the previous contents.
    pub fn replace(&mut self, handles: impl IntoIterator<Item = FunctionHandle>) -> Vec<FunctionHandle> {
        let previous = self.take_all();
        self.handles.extend(handles);
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{CodeObject, JitFunction};

    #[test]
    fn insert_is_unique_by_handle() {
        let func = JitFunction::new("m:f", CodeObject::new("f"));
        let mut pending = PendingSet::new();

        assert!(pending.insert(func.handle()));
        assert!(!pending.insert(func.handle()));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn remove_unknown_handle_is_harmless() {
        let func = JitFunction::new("m:f", CodeObject::new("f"));
        let mut pending = PendingSet::new();
        assert!(!pending.remove(&func.handle()));
    }

    #[test]
    fn take_all_clears_set() {
        let f = JitFunction::new("m:f", CodeObject::new("f"));
        let g = JitFunction::new("m:g", CodeObject::new("g"));
        let mut pending = PendingSet::new();
        pending.insert(f.handle());
        pending.insert(g.handle());

        let taken = pending.take_all();
        assert_eq!(taken.len(), 2);
        assert!(pending.is_empty());
    }
}
