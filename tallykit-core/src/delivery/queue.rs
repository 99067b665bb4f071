//! Durable, insertion-ordered queue of pending events.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    event::Event,
    storage::{envelope::Envelope, AtomicBlobStore, QUEUE_BLOB_NAME},
};

/// Limits enforced by [`EventQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueLimits {
    /// Maximum pending events; `None` is unbounded.
    pub max_len: Option<usize>,
    /// Maximum age of an event reaching the head; `None` never expires.
    pub max_age: Option<Duration>,
}

#[derive(Serialize, Deserialize)]
struct QueueSnapshot {
    version: u32,
    events: VecDeque<Event>,
}

impl Envelope for QueueSnapshot {
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Pending events, persisted to an [`AtomicBlobStore`] on every mutation.
///
/// Persistence failures are logged and the in-memory state stays authoritative, so enqueueing
/// never fails.
pub struct EventQueue {
    blob_store: Arc<dyn AtomicBlobStore>,
    limits: QueueLimits,
    events: Mutex<VecDeque<Event>>,
}

impl EventQueue {
    /// Opens the queue persisted in `blob_store`, starting empty if nothing readable is there.
    #[must_use]
    pub fn open(blob_store: Arc<dyn AtomicBlobStore>, limits: QueueLimits) -> Self {
        let events = match blob_store.read(QUEUE_BLOB_NAME.to_string()) {
            Ok(Some(bytes)) => match QueueSnapshot::from_cbor(&bytes) {
                Ok(snapshot) => snapshot.events,
                Err(err) => {
                    log::warn!("discarding unreadable event queue: {err}");
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(err) => {
                log::error!("failed to read event queue, starting empty: {err}");
                VecDeque::new()
            }
        };
        if !events.is_empty() {
            log::info!("restored {} pending event(s)", events.len());
        }
        Self {
            blob_store,
            limits,
            events: Mutex::new(events),
        }
    }

    /// Appends `event` and returns how many old events were evicted to make room.
    pub fn push(&self, event: Event) -> usize {
        let mut events = self.lock_events();
        events.push_back(event);
        let mut evicted = 0;
        if let Some(max_len) = self.limits.max_len {
            while events.len() > max_len {
                if let Some(dropped) = events.pop_front() {
                    log::warn!(
                        "queue full, dropping oldest event {} ({})",
                        dropped.id(),
                        dropped.name()
                    );
                    evicted += 1;
                }
            }
        }
        self.persist(&events);
        evicted
    }

    /// The oldest event still within the age limit at `now`.
    ///
    /// Expired events found at the head are dropped and returned as the second value.
    pub fn head(&self, now: u64) -> (Option<Event>, usize) {
        let mut events = self.lock_events();
        let mut expired = 0;
        if let Some(max_age) = self.limits.max_age {
            let max_age = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
            while let Some(front) = events.front() {
                if now.saturating_sub(front.context().created_at) <= max_age {
                    break;
                }
                log::warn!(
                    "dropping expired event {} ({})",
                    front.id(),
                    front.name()
                );
                events.pop_front();
                expired += 1;
            }
            if expired > 0 {
                self.persist(&events);
            }
        }
        (events.front().cloned(), expired)
    }

    /// Removes the event with `id`. Returns whether it was present.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut events = self.lock_events();
        let Some(position) = events.iter().position(|event| event.id() == id) else {
            return false;
        };
        events.remove(position);
        self.persist(&events);
        true
    }

    /// Drops every pending event and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut events = self.lock_events();
        let cleared = events.len();
        events.clear();
        self.persist(&events);
        cleared
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_events().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_events().is_empty()
    }

    /// Pending events in delivery order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock_events().iter().cloned().collect()
    }

    fn lock_events(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called with the lock held so snapshots are written in mutation order.
    fn persist(&self, events: &VecDeque<Event>) {
        let result = if events.is_empty() {
            self.blob_store.delete(QUEUE_BLOB_NAME.to_string())
        } else {
            QueueSnapshot {
                version: QueueSnapshot::VERSION,
                events: events.clone(),
            }
            .to_cbor()
            .and_then(|bytes| {
                self.blob_store
                    .write_atomic(QUEUE_BLOB_NAME.to_string(), bytes)
            })
        };
        if let Err(err) = result {
            log::error!("failed to persist event queue ({} pending): {err}", events.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::DefaultCrypto,
        event::{EventDraft, EventFactory},
        identity::IdentityRecord,
        storage::memory::MemoryBlobStore,
    };

    fn factory() -> EventFactory {
        EventFactory::new(
            &IdentityRecord::new("ORG1", "device"),
            "secret",
            "com.example.app",
            "1.0",
            Arc::new(DefaultCrypto::new()),
        )
    }

    fn event(factory: &EventFactory, name: &str, created_at: u64) -> Event {
        factory
            .build_at(EventDraft::new(name), created_at)
            .expect("event")
    }

    fn names(queue: &EventQueue) -> Vec<String> {
        queue
            .snapshot()
            .iter()
            .map(|event| event.name().to_string())
            .collect()
    }

    #[test]
    fn test_reopen_restores_pending_in_order() {
        let factory = factory();
        let blobs = Arc::new(MemoryBlobStore::new());
        let queue = EventQueue::open(blobs.clone(), QueueLimits::default());
        let a = event(&factory, "A", 1);
        queue.push(a.clone());
        queue.push(event(&factory, "B", 2));
        queue.push(event(&factory, "C", 3));
        assert!(queue.remove(a.id()));

        let reopened = EventQueue::open(blobs, QueueLimits::default());
        assert_eq!(names(&reopened), vec!["B", "C"]);
        assert_eq!(reopened.snapshot(), queue.snapshot());
    }

    #[test]
    fn test_empty_queue_deletes_blob() {
        let factory = factory();
        let blobs = Arc::new(MemoryBlobStore::new());
        let queue = EventQueue::open(blobs.clone(), QueueLimits::default());
        queue.push(event(&factory, "A", 1));
        assert!(blobs.read(QUEUE_BLOB_NAME.to_string()).expect("read").is_some());

        assert_eq!(queue.clear(), 1);
        assert!(blobs.read(QUEUE_BLOB_NAME.to_string()).expect("read").is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs
            .write_atomic(QUEUE_BLOB_NAME.to_string(), b"\x00not cbor".to_vec())
            .expect("write");
        let queue = EventQueue::open(blobs, QueueLimits::default());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_max_len_evicts_oldest() {
        let factory = factory();
        let limits = QueueLimits {
            max_len: Some(2),
            max_age: None,
        };
        let queue = EventQueue::open(Arc::new(MemoryBlobStore::new()), limits);
        assert_eq!(queue.push(event(&factory, "A", 1)), 0);
        assert_eq!(queue.push(event(&factory, "B", 2)), 0);
        assert_eq!(queue.push(event(&factory, "C", 3)), 1);
        assert_eq!(names(&queue), vec!["B", "C"]);
    }

    #[test]
    fn test_expired_heads_are_dropped() {
        let factory = factory();
        let limits = QueueLimits {
            max_len: None,
            max_age: Some(Duration::from_millis(100)),
        };
        let blobs = Arc::new(MemoryBlobStore::new());
        let queue = EventQueue::open(blobs.clone(), limits);
        queue.push(event(&factory, "old-1", 0));
        queue.push(event(&factory, "old-2", 50));
        queue.push(event(&factory, "fresh", 900));
        queue.push(event(&factory, "old-3", 0));

        let (head, expired) = queue.head(1_000);
        assert_eq!(head.map(|event| event.name().to_string()).as_deref(), Some("fresh"));
        assert_eq!(expired, 2);
        // Only heads are inspected.
        assert_eq!(names(&queue), vec!["fresh", "old-3"]);
        assert_eq!(
            names(&EventQueue::open(blobs, limits)),
            vec!["fresh", "old-3"]
        );
    }

    #[test]
    fn test_remove_unknown_id() {
        let queue = EventQueue::open(Arc::new(MemoryBlobStore::new()), QueueLimits::default());
        assert!(!queue.remove(Uuid::new_v4()));
    }
}
