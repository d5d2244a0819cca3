//! Per-caller circuit breaking for scan timeouts.
//!
//! Tracks how often each caller's inputs exhaust the scan budget inside a
//! sliding window. Once a caller accumulates enough timeouts, the breaker
//! opens and the engine refuses further work for that caller until the
//! window elapses. Counts accumulate monotonically within a window; a
//! successful scan does not reset them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Sweep expired entries every N recorded outcomes, keeping the hot path
/// O(1) amortized under sustained distinct-caller load.
const GC_INTERVAL: u64 = 64;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Timeouts within one window that open the breaker
    pub threshold: u32,
    /// Sliding window duration
    pub window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Entry tracking timeouts within a time window
#[derive(Debug, Clone)]
struct BreakerEntry {
    /// When this window started
    window_start: Instant,
    /// Timeouts recorded in the current window
    timeout_count: u32,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            timeout_count: 0,
        }
    }

    /// Check if the window has expired
    fn is_expired(&self, window: Duration) -> bool {
        self.window_start.elapsed() >= window
    }

    /// Start a fresh window
    fn reset(&mut self) {
        self.window_start = Instant::now();
        self.timeout_count = 0;
    }
}

/// In-memory circuit breaker keyed by caller identifier
pub struct CircuitBreaker {
    config: BreakerConfig,
    /// Per-caller breaker state, keyed by caller identifier (usually IP)
    state: Arc<Mutex<HashMap<String, BreakerEntry>>>,
    /// Outcomes recorded since construction, drives the lazy sweep
    calls: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
            calls: AtomicU64::new(0),
        }
    }

    /// Check whether the breaker is open for `caller_id`.
    ///
    /// Expired entries are treated as absent; they are removed by the lazy
    /// sweep in [`record_outcome`](Self::record_outcome) or by
    /// [`cleanup_expired`](Self::cleanup_expired).
    pub async fn is_open(&self, caller_id: &str) -> bool {
        let state = self.state.lock().await;
        match state.get(caller_id) {
            Some(entry) if !entry.is_expired(self.config.window) => {
                entry.timeout_count >= self.config.threshold
            }
            _ => false,
        }
    }

    /// Record a scan outcome for `caller_id`.
    ///
    /// Creates the entry on first sight, restarts it when its window has
    /// expired, and increments the timeout count when `timed_out` is set.
    /// Non-timeout outcomes leave the count untouched so that legitimate
    /// traffic interleaved with timeouts still trips the breaker.
    pub async fn record_outcome(&self, caller_id: &str, timed_out: bool) {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let sweep = calls % GC_INTERVAL == 0;

        let mut state = self.state.lock().await;
        if sweep {
            let window = self.config.window;
            state.retain(|_, entry| !entry.is_expired(window));
        }

        let entry = state
            .entry(caller_id.to_string())
            .or_insert_with(BreakerEntry::new);

        if entry.is_expired(self.config.window) {
            entry.reset();
        }

        if timed_out {
            entry.timeout_count += 1;
            if entry.timeout_count == self.config.threshold {
                warn!(caller_id = caller_id, "Circuit breaker opened");
            }
        }
    }

    /// Clean up expired entries to prevent memory growth
    pub async fn cleanup_expired(&self) {
        let mut state = self.state.lock().await;
        let window = self.config.window;
        state.retain(|_, entry| !entry.is_expired(window));
    }

    /// Get the current timeout count for a caller (for testing/debugging)
    #[cfg(test)]
    pub async fn timeout_count(&self, caller_id: &str) -> Option<u32> {
        let state = self.state.lock().await;
        state.get(caller_id).map(|e| e.timeout_count)
    }
}
