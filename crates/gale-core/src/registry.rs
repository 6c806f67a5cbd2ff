//! In-flight exchange table
//!
//! Every submitted exchange gets an entry keyed by a numeric id. Completion
//! and cancellation both remove the entry under the lock, so whichever gets
//! there first wins and the other becomes a no-op. Nothing on the reactor
//! side ever holds a pointer back into a caller's `Response`.

use crate::response::{Outcome, Slot};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Identifier of one submitted exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry {
    slot: Arc<Slot>,
    task: Option<AbortHandle>,
}

pub(crate) struct Registry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ExchangeId, Entry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an id and the slot the Response will read from
    pub(crate) fn register(&self) -> (ExchangeId, Arc<Slot>) {
        let id = ExchangeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(Slot::new());
        self.entries.lock().insert(
            id,
            Entry {
                slot: slot.clone(),
                task: None,
            },
        );
        (id, slot)
    }

    /// Remember the reactor task so a later cancel can abort it.
    ///
    /// If the exchange already finished (or was cancelled) the handle is
    /// simply discarded.
    pub(crate) fn attach(&self, id: ExchangeId, task: AbortHandle) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.task = Some(task);
        }
    }

    /// Deliver the outcome if the exchange is still registered.
    ///
    /// Panics if the slot already holds an outcome.
    pub(crate) fn complete(&self, id: ExchangeId, outcome: Outcome) -> bool {
        let entry = self.entries.lock().remove(&id);
        match entry {
            Some(entry) => {
                if !entry.slot.finish(outcome) {
                    tracing::error!(exchange = %id, "exchange completed twice");
                    panic!("exchange {} completed twice", id);
                }
                true
            }
            None => false,
        }
    }

    /// Forget the exchange and abort its task, if still running
    pub(crate) fn cancel(&self, id: ExchangeId) {
        let entry = self.entries.lock().remove(&id);
        if let Some(Entry {
            task: Some(task), ..
        }) = entry
        {
            tracing::debug!(exchange = %id, "cancelling in-flight exchange");
            task.abort();
        }
    }

    /// Number of exchanges not yet completed or cancelled
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ExchangeState;

    #[test]
    fn test_ids_are_unique() {
        let registry = Registry::new();
        let (a, _) = registry.register();
        let (b, _) = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_complete_removes_entry() {
        let registry = Registry::new();
        let (id, slot) = registry.register();
        assert!(registry.complete(id, Outcome::failed("boom".to_string())));
        assert_eq!(registry.len(), 0);
        assert_eq!(slot.state(), ExchangeState::Failed);
    }

    #[test]
    fn test_complete_after_cancel_is_noop() {
        let registry = Registry::new();
        let (id, slot) = registry.register();
        registry.cancel(id);
        assert!(!registry.complete(id, Outcome::failed("late".to_string())));
        assert_eq!(slot.state(), ExchangeState::Submitted);
    }

    #[test]
    #[should_panic(expected = "completed twice")]
    fn test_double_completion_panics() {
        let registry = Registry::new();
        let (id, slot) = registry.register();
        assert!(slot.finish(Outcome::failed("first".to_string())));
        registry.complete(id, Outcome::failed("second".to_string()));
    }

    #[test]
    fn test_cancel_aborts_task() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let registry = Registry::new();
        let (id, _slot) = registry.register();
        let task = runtime.spawn(std::future::pending::<()>());
        registry.attach(id, task.abort_handle());
        registry.cancel(id);
        let joined = runtime.block_on(task);
        assert!(joined.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_display_id() {
        let registry = Registry::new();
        let (id, _) = registry.register();
        assert_eq!(id.to_string(), "#1");
        assert_eq!(id.as_u64(), 1);
    }
}
