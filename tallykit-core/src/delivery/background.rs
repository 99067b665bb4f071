use std::sync::Arc;

/// Host hook that keeps the process alive while the queue is flushed in the background.
///
/// On iOS this maps to `beginBackgroundTask` / `endBackgroundTask`; on Android to a short
/// lived foreground job.
#[uniffi::export(with_foreign)]
pub trait BackgroundTaskHost: Send + Sync {
    /// Asks the platform for a grace period and returns its task id.
    fn begin_background_task(&self) -> u64;

    /// Releases the grace period `task_id`.
    fn end_background_task(&self, task_id: u64);
}

/// A grace period held for as long as the guard lives.
#[must_use = "the grace period ends when the guard is dropped"]
pub struct BackgroundTask {
    host: Arc<dyn BackgroundTaskHost>,
    task_id: u64,
}

impl BackgroundTask {
    /// Begins a grace period with `host`.
    pub fn begin(host: Arc<dyn BackgroundTaskHost>) -> Self {
        let task_id = host.begin_background_task();
        log::debug!("background task {task_id} started");
        Self { host, task_id }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.host.end_background_task(self.task_id);
        log::debug!("background task {} ended", self.task_id);
    }
}

/// Summary of a bounded flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, uniffi::Record)]
pub struct FlushReport {
    /// Events the collector accepted.
    pub delivered: u64,
    /// Events the collector refused, now dropped.
    pub rejected: u64,
    /// Attempts that failed and left their event queued.
    pub failed_attempts: u64,
    /// Events still pending when the flush ended.
    pub remaining: u64,
    /// Whether the window closed before the queue emptied.
    pub deadline_expired: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Host {
        calls: Mutex<Vec<String>>,
    }

    impl BackgroundTaskHost for Host {
        fn begin_background_task(&self) -> u64 {
            self.calls.lock().unwrap().push("begin".to_string());
            7
        }

        fn end_background_task(&self, task_id: u64) {
            self.calls.lock().unwrap().push(format!("end {task_id}"));
        }
    }

    #[test]
    fn test_guard_ends_task_on_drop() {
        let host = Arc::new(Host::default());
        {
            let _task = BackgroundTask::begin(host.clone());
            assert_eq!(*host.calls.lock().unwrap(), vec!["begin"]);
        }
        assert_eq!(*host.calls.lock().unwrap(), vec!["begin", "end 7"]);
    }
}
