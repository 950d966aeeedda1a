use std::{collections::VecDeque, sync::Mutex};
use tokio::time::{Duration, Instant};

/// Sliding-window admission counter.
///
/// Every check first drops timestamps older than the window, then admits iff
/// the remaining count is below `max`. Callers that are denied pick another
/// path; the limiter never sleeps or queues.
pub struct RateLimiter {
    max: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max)),
        }
    }

    pub fn can_proceed(&self) -> bool {
        let mut guard = self.lock();
        self.has_room(&mut guard)
    }

    pub fn record(&self) {
        self.lock().push_back(Instant::now());
    }

    /// `can_proceed` followed by `record`, under one lock.
    pub fn try_acquire(&self) -> bool {
        let mut guard = self.lock();
        let admitted = self.has_room(&mut guard);
        if admitted {
            guard.push_back(Instant::now());
        }
        admitted
    }

    fn has_room(&self, timestamps: &mut VecDeque<Instant>) -> bool {
        Self::prune(timestamps, self.window);
        timestamps.len() < self.max
    }

    pub fn remaining(&self) -> usize {
        let mut guard = self.lock();
        Self::prune(&mut guard, self.window);
        self.max.saturating_sub(guard.len())
    }

    /// Time until the oldest admitted request leaves the window.
    pub fn retry_after(&self) -> Duration {
        let mut guard = self.lock();
        Self::prune(&mut guard, self.window);
        match guard.front() {
            Some(oldest) if guard.len() >= self.max => {
                (*oldest + self.window).saturating_duration_since(Instant::now())
            }
            _ => Duration::ZERO,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    fn prune(timestamps: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
