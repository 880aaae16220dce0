//! Per-connection registry of in-flight operations.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Cancellation handle for one in-flight operation.
///
/// Clones share the same token. The generation number distinguishes handles
/// registered under a reused operation id.
#[derive(Clone, Debug)]
pub struct OperationHandle {
    generation: u64,
    token: CancellationToken,
}

impl OperationHandle {
    /// A fresh, uncancelled handle.
    pub fn new() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        }
    }

    /// A handle cancelled together with `parent`.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            token: parent.child_token(),
        }
    }

    /// Cancel the operation. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the operation is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Whether two handles refer to the same registration.
    pub fn same_as(&self, other: &Self) -> bool {
        self.generation == other.generation
    }
}

impl Default for OperationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A live operation already uses this id.
    #[error("subscriber for {id} already exists")]
    AlreadyExists {
        /// The conflicting operation id.
        id: String,
    },
}

/// Concurrent `id → handle` map with insert-if-absent semantics.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: DashMap<String, OperationHandle>,
}

impl OperationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handle` under `id` unless a live entry exists.
    ///
    /// The existing entry is never overwritten.
    pub fn register(&self, id: &str, handle: OperationHandle) -> Result<(), RegistryError> {
        match self.operations.entry(id.to_owned()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists { id: id.to_owned() }),
            Entry::Vacant(vacant) => {
                let _ = vacant.insert(handle);
                debug!(operation_id = id, "operation registered");
                Ok(())
            }
        }
    }

    /// Remove the entry for `id` and cancel it.
    ///
    /// Returns whether an entry existed. Calling this for an unknown id is a
    /// no-op.
    pub fn cancel_and_remove(&self, id: &str) -> bool {
        match self.operations.remove(id) {
            Some((_, handle)) => {
                handle.cancel();
                debug!(operation_id = id, "operation cancelled");
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `id` only if it is `handle`.
    ///
    /// Used when an operation terminates on its own, so that a newer
    /// registration under the same id survives.
    pub fn remove(&self, id: &str, handle: &OperationHandle) -> bool {
        self.operations
            .remove_if(id, |_, current| current.same_as(handle))
            .is_some()
    }

    /// Cancel and remove every entry. Returns how many were cancelled.
    pub fn drain_all(&self) -> usize {
        let ids: Vec<String> = self
            .operations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter().filter(|id| self.cancel_and_remove(id)).count()
    }

    /// Whether `id` has a live entry.
    pub fn contains(&self, id: &str) -> bool {
        self.operations.contains_key(id)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no operation is live.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_and_contains() {
        let registry = OperationRegistry::new();
        assert!(registry.register("a", OperationHandle::new()).is_ok());
        assert!(registry.contains("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_register_fails_without_overwrite() {
        let registry = OperationRegistry::new();
        let first = OperationHandle::new();
        registry.register("a", first.clone()).unwrap();

        let err = registry.register("a", OperationHandle::new()).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExists { id: "a".into() });
        assert_eq!(err.to_string(), "subscriber for a already exists");

        // The first handle is still the one registered.
        assert!(registry.remove("a", &first));
    }

    #[test]
    fn cancel_and_remove_cancels() {
        let registry = OperationRegistry::new();
        let handle = OperationHandle::new();
        registry.register("a", handle.clone()).unwrap();
        assert!(registry.cancel_and_remove("a"));
        assert!(handle.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_and_remove_is_idempotent() {
        let registry = OperationRegistry::new();
        assert!(!registry.cancel_and_remove("missing"));
        registry.register("a", OperationHandle::new()).unwrap();
        assert!(registry.cancel_and_remove("a"));
        assert!(!registry.cancel_and_remove("a"));
    }

    #[test]
    fn remove_ignores_other_generation() {
        let registry = OperationRegistry::new();
        let old = OperationHandle::new();
        registry.register("a", old.clone()).unwrap();
        assert!(registry.cancel_and_remove("a"));

        let new = OperationHandle::new();
        registry.register("a", new.clone()).unwrap();
        // The terminated first operation must not remove the reused id.
        assert!(!registry.remove("a", &old));
        assert!(registry.contains("a"));
        assert!(!new.is_cancelled());
        assert!(registry.remove("a", &new));
    }

    #[test]
    fn remove_does_not_cancel() {
        let registry = OperationRegistry::new();
        let handle = OperationHandle::new();
        registry.register("a", handle.clone()).unwrap();
        assert!(registry.remove("a", &handle));
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn drain_all_cancels_everything() {
        let registry = OperationRegistry::new();
        let handles: Vec<_> = (0..5).map(|_| OperationHandle::new()).collect();
        for (i, h) in handles.iter().enumerate() {
            registry.register(&format!("op{i}"), h.clone()).unwrap();
        }
        assert_eq!(registry.drain_all(), 5);
        assert!(registry.is_empty());
        assert!(handles.iter().all(OperationHandle::is_cancelled));
        assert_eq!(registry.drain_all(), 0);
    }

    #[test]
    fn handle_clones_share_cancellation() {
        let handle = OperationHandle::new();
        let clone = handle.clone();
        assert!(handle.same_as(&clone));
        clone.cancel();
        assert!(handle.is_cancelled());
        assert!(!handle.same_as(&OperationHandle::new()));
    }

    #[test]
    fn child_handle_follows_parent() {
        let parent = CancellationToken::new();
        let child = OperationHandle::child_of(&parent);
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = OperationHandle::child_of(&parent);
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let handle = OperationHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });
        handle.cancel();
        assert!(task.await.unwrap());
    }

    #[test]
    fn concurrent_register_has_one_winner() {
        let registry = Arc::new(OperationRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register("same", OperationHandle::new()).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
