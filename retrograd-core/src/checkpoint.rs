//! Checkpointing of forward-pass state.
//!
//! An operation instance replayed across time steps keeps one *current*
//! state (written by the latest forward) and an arena of saved snapshots
//! keyed by caller-supplied checkpoint ids. Backprop-through-time runs all
//! forward steps, storing each one, then restores them in reverse temporal
//! order to run the backward passes.
//!
//! The snapshot map is owned by the operation instance — there is no
//! process-global store. Store/restore for distinct ids is safe across
//! threads at the map level; sequencing store/restore for the *same* id is
//! the caller's responsibility.

use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;

use crate::error::GradError;

/// Opaque caller-supplied checkpoint key.
pub type CheckpointId = u64;

/// Current forward state plus saved snapshots for one operation instance.
///
/// `S` is the operation's own state bundle: whatever its backward pass
/// needs (retained operands, normalized outputs, statistics).
#[derive(Debug)]
pub struct Checkpoints<S> {
    current: Option<S>,
    saved: RwLock<HashMap<CheckpointId, S>>,
}

impl<S> Default for Checkpoints<S> {
    fn default() -> Self {
        Checkpoints {
            current: None,
            saved: RwLock::new(HashMap::new()),
        }
    }
}

impl<S: Clone> Checkpoints<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state of the forward pass that just ran, replacing the
    /// previous current state. Saved snapshots are untouched.
    pub fn record(&mut self, state: S) {
        self.current = Some(state);
    }

    /// Current state, or [`GradError::InvalidState`] if no forward pass
    /// (or restore) has populated it.
    pub fn current(&self, operation: &str) -> Result<&S, GradError> {
        self.current.as_ref().ok_or_else(|| GradError::InvalidState {
            operation: operation.to_string(),
            reason: "backward requires a prior forward or restore".to_string(),
        })
    }

    /// True once a forward pass or restore has populated the current state.
    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }

    /// Snapshots the current state under `id`, overwriting any previous
    /// snapshot with the same id.
    ///
    /// # Errors
    /// Returns [`GradError::InvalidState`] when there is nothing to store.
    pub fn store(&self, id: CheckpointId, operation: &str) -> Result<(), GradError> {
        let state = self
            .current
            .as_ref()
            .ok_or_else(|| GradError::InvalidState {
                operation: operation.to_string(),
                reason: "store requires a prior forward".to_string(),
            })?
            .clone();
        let mut saved = self.saved.write().expect("checkpoint map poisoned");
        if saved.insert(id, state).is_some() {
            debug!("{operation}: overwrote checkpoint {id}");
        } else {
            debug!("{operation}: stored checkpoint {id}");
        }
        Ok(())
    }

    /// Replaces the current state with the snapshot stored under `id`. The
    /// snapshot itself is left in place and may be restored again.
    ///
    /// # Errors
    /// Returns [`GradError::CheckpointNotFound`] for an unknown id.
    pub fn restore(&mut self, id: CheckpointId) -> Result<(), GradError> {
        let state = {
            let saved = self.saved.read().expect("checkpoint map poisoned");
            saved
                .get(&id)
                .cloned()
                .ok_or(GradError::CheckpointNotFound { id })?
        };
        debug!("restored checkpoint {id}");
        self.current = Some(state);
        Ok(())
    }

    /// Drops the snapshot under `id`, if any. Returns whether one existed.
    pub fn discard(&self, id: CheckpointId) -> bool {
        self.saved
            .write()
            .expect("checkpoint map poisoned")
            .remove(&id)
            .is_some()
    }

    /// Number of saved snapshots.
    pub fn stored_count(&self) -> usize {
        self.saved.read().expect("checkpoint map poisoned").len()
    }

    pub fn contains(&self, id: CheckpointId) -> bool {
        self.saved
            .read()
            .expect("checkpoint map poisoned")
            .contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_requires_forward_state() {
        let cp: Checkpoints<i32> = Checkpoints::new();
        assert!(matches!(
            cp.store(1, "test"),
            Err(GradError::InvalidState { .. })
        ));
        assert!(matches!(
            cp.current("test"),
            Err(GradError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_store_restore_round_trip() {
        let mut cp = Checkpoints::new();
        cp.record(10);
        cp.store(1, "test").unwrap();
        cp.record(20);
        assert_eq!(*cp.current("test").unwrap(), 20);

        cp.restore(1).unwrap();
        assert_eq!(*cp.current("test").unwrap(), 10);
        // Restore is non-destructive; the snapshot can be replayed again.
        cp.record(30);
        cp.restore(1).unwrap();
        assert_eq!(*cp.current("test").unwrap(), 10);
    }

    #[test]
    fn test_store_overwrites_same_id() {
        let mut cp = Checkpoints::new();
        cp.record(1);
        cp.store(7, "test").unwrap();
        cp.record(2);
        cp.store(7, "test").unwrap();
        cp.restore(7).unwrap();
        assert_eq!(*cp.current("test").unwrap(), 2);
        assert_eq!(cp.stored_count(), 1);
    }

    #[test]
    fn test_restore_unknown_id() {
        let mut cp: Checkpoints<i32> = Checkpoints::new();
        assert_eq!(
            cp.restore(42),
            Err(GradError::CheckpointNotFound { id: 42 })
        );
    }

    #[test]
    fn test_discard() {
        let mut cp = Checkpoints::new();
        cp.record(5);
        cp.store(3, "test").unwrap();
        assert!(cp.contains(3));
        assert!(cp.discard(3));
        assert!(!cp.discard(3));
        assert!(matches!(
            cp.restore(3),
            Err(GradError::CheckpointNotFound { id: 3 })
        ));
    }

    #[test]
    fn test_distinct_ids_from_threads() {
        use std::sync::Arc;

        let mut cp = Checkpoints::new();
        cp.record(0usize);
        let cp = Arc::new(cp);
        let handles: Vec<_> = (0..8)
            .map(|id| {
                let cp = Arc::clone(&cp);
                std::thread::spawn(move || cp.store(id, "test").unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cp.stored_count(), 8);
    }
}
