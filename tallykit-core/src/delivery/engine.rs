use std::{
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::{
    sync::{watch, Notify},
    time::{sleep, timeout_at, Instant},
};

use super::{
    background::FlushReport,
    backoff::Backoff,
    queue::{EventQueue, QueueLimits},
    transport::{DeliveryOutcome, TransportSelector},
};
use crate::{
    config::DeliveryConfig, event::Event, storage::AtomicBlobStore, utils::now_millis,
};

/// State of the continuous delivery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LoopState {
    /// Delivering whenever events are pending.
    Running,
    /// Idle until resumed; bounded flushes still deliver.
    Paused,
    /// The loop has exited or will exit at its next wakeup.
    Stopped,
}

/// Counters since the engine was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, uniffi::Record)]
pub struct DeliveryStats {
    /// Events the collector accepted.
    pub delivered: u64,
    /// Attempts that failed transiently.
    pub failed_attempts: u64,
    /// Events dropped by rejection, eviction or expiry.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    dropped: AtomicU64,
}

/// Serial, durable, retrying dispatcher of queued events.
///
/// At most one attempt is in flight: the head is read and delivered while holding the
/// delivery slot, and only removed once the transport reports success or a rejection.
pub struct DeliveryEngine {
    queue: EventQueue,
    selector: TransportSelector,
    backoff: Mutex<Backoff>,
    background_delay: Duration,
    slot: tokio::sync::Mutex<()>,
    wake: Notify,
    state: watch::Sender<LoopState>,
    head_failures: AtomicU32,
    counters: Counters,
}

impl DeliveryEngine {
    /// Creates an engine over the queue persisted in `blob_store`.
    #[must_use]
    pub fn new(
        blob_store: Arc<dyn AtomicBlobStore>,
        selector: TransportSelector,
        config: &DeliveryConfig,
    ) -> Self {
        let limits = QueueLimits {
            max_len: config.max_queue_len(),
            max_age: config.max_event_age(),
        };
        let (state, _) = watch::channel(LoopState::Running);
        Self {
            queue: EventQueue::open(blob_store, limits),
            selector,
            backoff: Mutex::new(Backoff::new(config.base_delay(), config.max_delay())),
            background_delay: config.background_delay(),
            slot: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            state,
            head_failures: AtomicU32::new(0),
            counters: Counters::default(),
        }
    }

    /// Appends `event` to the queue and wakes the loop. Never blocks on the network.
    pub fn enqueue(&self, event: Event) {
        log::debug!("enqueued {} ({})", event.id(), event.name());
        let evicted = self.queue.push(event);
        if evicted > 0 {
            self.head_failures.store(0, Ordering::Release);
            self.counters
                .dropped
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
        self.wake.notify_one();
    }

    /// The continuous delivery loop. Returns after [`DeliveryEngine::shutdown`].
    ///
    /// While events are pending it waits the current delay, then makes one attempt. It
    /// idles while the queue is empty or the loop is paused.
    pub async fn run(&self) {
        let mut state = self.state.subscribe();
        log::debug!("delivery loop started");
        loop {
            let current = *state.borrow_and_update();
            match current {
                LoopState::Stopped => break,
                LoopState::Paused => {
                    if state.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                LoopState::Running => {}
            }

            if self.queue.is_empty() {
                tokio::select! {
                    () = self.wake.notified() => {}
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            let delay = self.current_delay();
            tokio::select! {
                () = sleep(delay) => {
                    self.deliver_next().await;
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        log::debug!("delivery loop stopped");
    }

    /// Makes one attempt at the head event. Returns `None` when nothing is pending.
    ///
    /// Dropping the returned future mid-attempt leaves the event queued and untouched.
    pub async fn deliver_next(&self) -> Option<DeliveryOutcome> {
        let _slot = self.slot.lock().await;

        let (head, expired) = self.queue.head(now_millis());
        if expired > 0 {
            self.head_failures.store(0, Ordering::Release);
            self.counters
                .dropped
                .fetch_add(expired as u64, Ordering::Relaxed);
        }
        let event = head?;

        let failures = self.head_failures.load(Ordering::Acquire);
        let transport = self.selector.select(&event, failures);
        let outcome = transport.deliver(&event).await;

        match outcome {
            DeliveryOutcome::Delivered => {
                self.queue.remove(event.id());
                self.head_failures.store(0, Ordering::Release);
                self.lock_backoff().record_success();
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "delivered {} ({}) via {}",
                    event.id(),
                    event.name(),
                    transport.method()
                );
            }
            DeliveryOutcome::Rejected => {
                self.queue.remove(event.id());
                self.head_failures.store(0, Ordering::Release);
                self.lock_backoff().record_success();
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "collector rejected {} ({}), dropping it",
                    event.id(),
                    event.name()
                );
            }
            DeliveryOutcome::Failed => {
                let failures = self.head_failures.fetch_add(1, Ordering::AcqRel) + 1;
                let delay = self.lock_backoff().record_failure();
                self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "delivery of {} ({}) failed {failures} time(s) in a row, retrying in {delay:?}",
                    event.id(),
                    event.name()
                );
            }
        }
        Some(outcome)
    }

    /// Pauses the continuous loop and delivers serially until the queue is empty or
    /// `window` has elapsed.
    ///
    /// An attempt still in flight at the deadline is abandoned and its event stays queued.
    /// The loop stays paused afterwards; call [`DeliveryEngine::resume`] when the host
    /// returns to the foreground.
    pub async fn flush_within(&self, window: Duration) -> FlushReport {
        self.pause();
        let mut report = FlushReport::default();
        let deadline = Instant::now() + window;
        let drained = timeout_at(deadline, self.drain(&mut report)).await;

        report.deadline_expired = drained.is_err();
        report.remaining = self.queue.len() as u64;
        log::info!(
            "background flush: {} delivered, {} rejected, {} failed attempt(s), {} remaining{}",
            report.delivered,
            report.rejected,
            report.failed_attempts,
            report.remaining,
            if report.deadline_expired {
                ", window expired"
            } else {
                ""
            }
        );
        report
    }

    async fn drain(&self, report: &mut FlushReport) {
        while let Some(outcome) = self.deliver_next().await {
            let delay = match outcome {
                DeliveryOutcome::Delivered => {
                    report.delivered += 1;
                    self.background_delay
                }
                DeliveryOutcome::Rejected => {
                    report.rejected += 1;
                    self.background_delay
                }
                DeliveryOutcome::Failed => {
                    report.failed_attempts += 1;
                    self.current_delay()
                }
            };
            if self.queue.is_empty() {
                break;
            }
            sleep(delay).await;
        }
    }

    /// Pauses the continuous loop. Returns whether it was running.
    pub fn pause(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == LoopState::Running {
                *state = LoopState::Paused;
                true
            } else {
                false
            }
        })
    }

    /// Resumes a paused loop. Returns whether it was paused.
    pub fn resume(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == LoopState::Paused {
                *state = LoopState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Stops the loop for good.
    pub fn shutdown(&self) {
        self.state.send_replace(LoopState::Stopped);
    }

    /// Current loop state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Delay the loop waits before its next attempt.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.lock_backoff().current()
    }

    /// Number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Pending events in delivery order.
    #[must_use]
    pub fn pending_events(&self) -> Vec<Event> {
        self.queue.snapshot()
    }

    /// Drops every pending event. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let cleared = self.queue.clear();
        self.head_failures.store(0, Ordering::Release);
        if cleared > 0 {
            log::warn!("cleared {cleared} pending event(s)");
        }
        cleared
    }

    /// Counters since the engine was created.
    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed_attempts.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn lock_backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
