//! Bounded retry queue with exponential backoff and dead letters

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::QueueSettings;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Retry queue is full ({capacity} pending jobs)")]
    Full { capacity: usize },
}

/// Counters since the queue was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

/// A job that exhausted its retries
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    pub id: String,
    pub payload: T,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug)]
struct Job<T> {
    id: String,
    payload: T,
    attempts: u32,
    ready_at: Instant,
}

/// In-process queue keyed by idempotent job ids
///
/// Memory is bounded: at most `capacity` pending jobs, the last
/// `dedup_window` finished ids, and `max_dead_letters` dead letters.
#[derive(Debug)]
pub struct RetryQueue<T> {
    settings: QueueSettings,
    pending: VecDeque<Job<T>>,
    /// Ids pending or recently finished
    seen: HashSet<String>,
    /// Finished ids, oldest first
    finished: VecDeque<String>,
    dead: VecDeque<DeadLetter<T>>,
    stats: QueueStats,
}

impl<T> RetryQueue<T> {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            finished: VecDeque::new(),
            dead: VecDeque::new(),
            stats: QueueStats::default(),
        }
    }

    /// Add a job ready at `now`. Returns `Ok(false)` if the id is pending or
    /// finished within the dedup window.
    pub fn enqueue(&mut self, id: impl Into<String>, payload: T, now: Instant) -> Result<bool, QueueError> {
        let id = id.into();
        if self.seen.contains(&id) {
            self.stats.duplicates += 1;
            return Ok(false);
        }
        if self.pending.len() >= self.settings.capacity {
            self.stats.rejected += 1;
            return Err(QueueError::Full {
                capacity: self.settings.capacity,
            });
        }
        self.seen.insert(id.clone());
        self.pending.push_back(Job {
            id,
            payload,
            attempts: 0,
            ready_at: now,
        });
        self.stats.enqueued += 1;
        Ok(true)
    }

    /// Delay after the `attempt`-th failure: base * 2^(attempt - 1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .settings
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.settings.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Try every job that is due. Returns the number delivered.
    pub fn process_due<F>(&mut self, now: Instant, mut deliver: F) -> usize
    where
        F: FnMut(&T) -> anyhow::Result<()>,
    {
        let mut delivered = 0;
        let mut waiting = VecDeque::with_capacity(self.pending.len());

        while let Some(mut job) = self.pending.pop_front() {
            if job.ready_at > now {
                waiting.push_back(job);
                continue;
            }
            match deliver(&job.payload) {
                Ok(()) => {
                    delivered += 1;
                    self.stats.delivered += 1;
                    self.finish(job.id);
                }
                Err(e) => {
                    job.attempts += 1;
                    if job.attempts >= self.settings.max_retries.max(1) {
                        tracing::warn!(job_id = %job.id, attempts = job.attempts, error = %e, "Notification dead-lettered");
                        self.stats.dead_lettered += 1;
                        self.finish(job.id.clone());
                        self.dead.push_back(DeadLetter {
                            id: job.id,
                            payload: job.payload,
                            attempts: job.attempts,
                            last_error: e.to_string(),
                        });
                        while self.dead.len() > self.settings.max_dead_letters {
                            self.dead.pop_front();
                        }
                    } else {
                        let delay = self.backoff(job.attempts);
                        tracing::debug!(job_id = %job.id, attempts = job.attempts, ?delay, error = %e, "Notification delivery failed, retrying");
                        self.stats.retried += 1;
                        job.ready_at = now + delay;
                        waiting.push_back(job);
                    }
                }
            }
        }

        self.pending = waiting;
        delivered
    }

    /// Remember a finished id, forgetting the oldest beyond the window
    fn finish(&mut self, id: String) {
        self.finished.push_back(id);
        while self.finished.len() > self.settings.dedup_window {
            if let Some(old) = self.finished.pop_front() {
                self.seen.remove(&old);
            }
        }
    }

    /// Time until the earliest pending job is due (zero if one is due now)
    pub fn next_due_in(&self, now: Instant) -> Option<Duration> {
        self.pending
            .iter()
            .map(|j| j.ready_at.saturating_duration_since(now))
            .min()
    }

    /// Pending jobs
    pub fn depth(&self) -> usize {
        self.pending.len()
    }

    /// Most recent dead letters, oldest first
    pub fn dead_letters(&self) -> &VecDeque<DeadLetter<T>> {
        &self.dead
    }

    /// Ids currently held for duplicate suppression
    pub fn tracked_ids(&self) -> usize {
        self.seen.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> QueueSettings {
        QueueSettings {
            capacity: 2,
            max_retries: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 250,
            dedup_window: 2,
            max_dead_letters: 2,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let queue: RetryQueue<()> = RetryQueue::new(settings());
        assert_eq!(queue.backoff(1), Duration::from_millis(100));
        assert_eq!(queue.backoff(2), Duration::from_millis(200));
        assert_eq!(queue.backoff(3), Duration::from_millis(250));
        assert_eq!(queue.backoff(80), Duration::from_millis(250));
    }

    #[test]
    fn test_duplicate_ids_and_capacity() {
        let now = Instant::now();
        let mut queue = RetryQueue::new(settings());
        assert_eq!(queue.enqueue("a", 1, now), Ok(true));
        assert_eq!(queue.enqueue("a", 1, now), Ok(false));
        assert_eq!(queue.enqueue("b", 2, now), Ok(true));
        assert_eq!(queue.enqueue("c", 3, now), Err(QueueError::Full { capacity: 2 }));
        assert_eq!(queue.depth(), 2);

        assert_eq!(queue.process_due(now, |_| Ok(())), 2);
        assert_eq!(queue.depth(), 0);
        // Delivered ids stay known
        assert_eq!(queue.enqueue("a", 1, now), Ok(false));
        assert_eq!(queue.stats().delivered, 2);
    }

    #[test]
    fn test_failures_back_off_then_dead_letter() {
        let start = Instant::now();
        let mut queue = RetryQueue::new(settings());
        queue.enqueue("job", "payload", start).unwrap();

        let fail = |_: &&str| -> anyhow::Result<()> { anyhow::bail!("sink offline") };
        assert_eq!(queue.process_due(start, fail), 0);
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.next_due_in(start), Some(Duration::from_millis(100)));

        // Not due yet: nothing is attempted
        assert_eq!(queue.process_due(start + Duration::from_millis(50), fail), 0);
        assert_eq!(queue.stats().retried, 1);

        let t2 = start + Duration::from_millis(100);
        queue.process_due(t2, fail);
        let t3 = t2 + Duration::from_millis(200);
        queue.process_due(t3, fail);

        assert_eq!(queue.depth(), 0);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].last_error, "sink offline");
    }

    #[test]
    fn test_finished_ids_are_forgotten_past_the_window() {
        let now = Instant::now();
        let mut queue = RetryQueue::new(settings());
        for i in 0..10_000 {
            queue.enqueue(format!("job-{i}"), i, now).unwrap();
            assert_eq!(queue.process_due(now, |_| Ok(())), 1);
        }
        assert_eq!(queue.depth(), 0);
        assert_eq!(queue.tracked_ids(), 2);

        // Inside the window: still a duplicate
        assert_eq!(queue.enqueue("job-9999", 0, now), Ok(false));
        // Aged out: accepted again
        assert_eq!(queue.enqueue("job-0", 0, now), Ok(true));
    }

    #[test]
    fn test_dead_letters_keep_only_the_newest() {
        let now = Instant::now();
        let mut settings = settings();
        settings.max_retries = 1;
        let mut queue = RetryQueue::new(settings);
        for id in ["a", "b", "c"] {
            queue.enqueue(id, (), now).unwrap();
            queue.process_due(now, |_| anyhow::bail!("sink offline"));
        }

        let ids: Vec<_> = queue.dead_letters().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(queue.stats().dead_lettered, 3);
        assert!(queue.tracked_ids() <= 2);
    }
}
