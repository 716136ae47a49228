//! In-memory limiter for failed console logins.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<String, VecDeque<Instant>>`,
//! keyed by normalized email. A login is refused once `limit` failures fall
//! inside the window; a successful login clears the email's history. Each
//! recorded failure also drops emails whose failures have all aged out.
//!
//! TRADE-OFFS
//! ==========
//! State is per process. Running several replicas multiplies the effective
//! limit by the replica count.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("too many failed logins (max {limit} per {window_secs}s)")]
pub struct LoginLimitError {
    pub limit: usize,
    pub window_secs: u64,
}

#[derive(Clone)]
pub struct LoginErrorLimiter {
    failures: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    limit: usize,
    window: Duration,
}

impl LoginErrorLimiter {
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { failures: Arc::new(Mutex::new(HashMap::new())), limit, window }
    }

    /// Refuse the attempt if the email already has `limit` recent failures.
    pub fn check(&self, email: &str) -> Result<(), LoginLimitError> {
        self.check_at(email, Instant::now())
    }

    fn check_at(&self, email: &str, now: Instant) -> Result<(), LoginLimitError> {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(deque) = failures.get_mut(email) else {
            return Ok(());
        };
        prune_window(deque, now, self.window);
        if deque.len() >= self.limit {
            return Err(LoginLimitError { limit: self.limit, window_secs: self.window.as_secs() });
        }
        if deque.is_empty() {
            failures.remove(email);
        }
        Ok(())
    }

    pub fn record_failure(&self, email: &str) {
        self.record_failure_at(email, Instant::now());
    }

    fn record_failure_at(&self, email: &str, now: Instant) {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let window = self.window;
        failures.retain(|_, deque| {
            prune_window(deque, now, window);
            !deque.is_empty()
        });
        failures.entry(email.to_owned()).or_default().push_back(now);
    }

    #[cfg(test)]
    fn tracked_len(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn reset(&self, email: &str) {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(email);
    }
}

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
