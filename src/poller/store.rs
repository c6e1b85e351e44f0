//! Per-view collection state.

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::config::StalePolicy;
use crate::error::ClientError;

/// Point-in-time copy of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    /// True until the first fetch completes, whatever its outcome.
    pub loading: bool,
    pub last_error: Option<String>,
}

struct Inner<T> {
    items: Vec<T>,
    loading: bool,
    last_error: Option<String>,
    last_applied: u64,
}

/// The collection a view renders. Fetch results replace it wholesale;
/// mutations patch it in place.
pub struct CollectionStore<T> {
    inner: RwLock<Inner<T>>,
    version: watch::Sender<u64>,
}

impl<T: Clone> CollectionStore<T> {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner {
                items: Vec::new(),
                loading: true,
                last_error: None,
                last_applied: 0,
            }),
            version,
        }
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        let inner = self.inner.read();
        Snapshot {
            items: inner.items.clone(),
            loading: inner.loading,
            last_error: inner.last_error.clone(),
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.read().items.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Receiver that changes whenever the collection does.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Apply the outcome of poll `request_id`. Returns true when the store
    /// changed.
    pub fn apply_fetch(
        &self,
        request_id: u64,
        result: Result<Vec<T>, ClientError>,
        policy: StalePolicy,
    ) -> bool {
        {
            let mut inner = self.inner.write();
            if policy == StalePolicy::DiscardStale && request_id < inner.last_applied {
                debug!(
                    request_id = request_id,
                    last_applied = inner.last_applied,
                    "Discarding stale poll response"
                );
                return false;
            }

            inner.loading = false;
            match result {
                Ok(items) => {
                    inner.items = items;
                    inner.last_error = None;
                    inner.last_applied = request_id;
                }
                Err(e) => {
                    inner.last_error = Some(e.to_string());
                }
            }
        }
        self.bump();
        true
    }

    /// Replace the whole collection outside of a poll.
    pub fn replace(&self, items: Vec<T>) {
        {
            let mut inner = self.inner.write();
            inner.items = items;
            inner.loading = false;
        }
        self.bump();
    }

    pub fn append(&self, item: T) {
        self.inner.write().items.push(item);
        self.bump();
    }

    /// Apply `update` to every item matching `matches`. Returns the number of
    /// items touched.
    pub fn patch<P, F>(&self, matches: P, mut update: F) -> usize
    where
        P: Fn(&T) -> bool,
        F: FnMut(&mut T),
    {
        let touched = {
            let mut inner = self.inner.write();
            let mut touched = 0;
            for item in inner.items.iter_mut().filter(|i| matches(i)) {
                update(item);
                touched += 1;
            }
            touched
        };
        if touched > 0 {
            self.bump();
        }
        touched
    }

    /// Remove every item matching `matches`. Returns the number removed.
    pub fn remove<P>(&self, matches: P) -> usize
    where
        P: Fn(&T) -> bool,
    {
        let removed = {
            let mut inner = self.inner.write();
            let before = inner.items.len();
            inner.items.retain(|i| !matches(i));
            before - inner.items.len()
        };
        if removed > 0 {
            self.bump();
        }
        removed
    }
}

impl<T: Clone> Default for CollectionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> ClientError {
        ClientError::Backend {
            status: 500,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_loading_until_first_fetch() {
        let store: CollectionStore<u32> = CollectionStore::new();
        assert!(store.is_loading());

        store.apply_fetch(1, Err(failure()), StalePolicy::LastWriteWins);
        assert!(!store.is_loading());
        assert!(store.last_error().unwrap().contains("boom"));
    }

    #[test]
    fn test_failure_keeps_previous_items() {
        let store = CollectionStore::new();
        store.apply_fetch(1, Ok(vec![1, 2, 3]), StalePolicy::LastWriteWins);
        store.apply_fetch(2, Err(failure()), StalePolicy::LastWriteWins);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.items, vec![1, 2, 3]);
        assert!(snapshot.last_error.is_some());

        store.apply_fetch(3, Ok(vec![4]), StalePolicy::LastWriteWins);
        assert_eq!(store.snapshot().last_error, None);
    }

    #[test]
    fn test_stale_policies() {
        let lww = CollectionStore::new();
        lww.apply_fetch(2, Ok(vec!["new"]), StalePolicy::LastWriteWins);
        assert!(lww.apply_fetch(1, Ok(vec!["old"]), StalePolicy::LastWriteWins));
        assert_eq!(lww.items(), vec!["old"]);

        let discard = CollectionStore::new();
        discard.apply_fetch(2, Ok(vec!["new"]), StalePolicy::DiscardStale);
        assert!(!discard.apply_fetch(1, Ok(vec!["old"]), StalePolicy::DiscardStale));
        assert_eq!(discard.items(), vec!["new"]);
    }

    #[test]
    fn test_patch_and_remove() {
        let store = CollectionStore::new();
        store.replace(vec![(1, false), (2, false), (3, false)]);
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        assert_eq!(store.patch(|(id, _)| *id == 2, |item| item.1 = true), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(store.remove(|(id, _)| *id == 3), 1);
        assert_eq!(store.remove(|(id, _)| *id == 9), 0);
        assert_eq!(store.items(), vec![(1, false), (2, true)]);

        store.append((4, false));
        assert_eq!(store.len(), 3);
    }
}
