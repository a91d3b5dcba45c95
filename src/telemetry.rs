//! Audit lines, query timing, and the token buckets behind request rate limiting.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const AUDIT_TARGET: &str = "natours::audit";
pub const HTTP_TARGET: &str = "natours::http";

static AUDIT_SINK: RwLock<Option<Arc<Mutex<Vec<String>>>>> = RwLock::new(None);

fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Capture audit lines in memory (tests).
pub fn set_audit_sink_for_tests(sink: Arc<Mutex<Vec<String>>>) {
    *AUDIT_SINK.write() = Some(sink);
}

/// One JSON line per committed write, routed to the audit target.
pub fn log_audit(op: &str, collection: &str, doc_id: &str) {
    let line = serde_json::json!({
        "ts": now_ts(), "op": op, "collection": collection, "doc_id": doc_id
    })
    .to_string();
    if let Some(sink) = AUDIT_SINK.read().as_ref() {
        sink.lock().push(line.clone());
    }
    log::info!(target: AUDIT_TARGET, "{line}");
}

pub fn log_query(collection: &str, op: &str, started: Instant, result_count: usize) {
    log::debug!(
        "Query took {} ms ({op} on {collection}, {result_count} results)",
        started.elapsed().as_millis()
    );
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketCfg {
    capacity: f64,
    refill_per_sec: f64,
}

struct TokenBucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub retry_after_secs: u64,
}

/// Idle buckets are swept once per this many checks.
const SWEEP_EVERY: u64 = 1024;

#[derive(Default)]
struct Buckets {
    by_key: HashMap<String, TokenBucketState>,
    checks: u64,
}

/// Per-key token buckets: `capacity` requests, refilled evenly over `window`.
/// A bucket that has refilled completely is dropped; it would be recreated
/// full on the next request anyway.
pub struct RateLimiter {
    cfg: TokenBucketCfg,
    buckets: Mutex<Buckets>,
}

impl TokenBucketState {
    fn refill(&mut self, cfg: TokenBucketCfg, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = cfg.refill_per_sec.mul_add(elapsed, self.tokens).min(cfg.capacity);
            self.last_refill = now;
        }
    }
}

impl RateLimiter {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(capacity: u64, window: Duration) -> Self {
        let secs = window.as_secs_f64().max(f64::EPSILON);
        Self {
            cfg: TokenBucketCfg { capacity: capacity as f64, refill_per_sec: capacity as f64 / secs },
            buckets: Mutex::new(Buckets::default()),
        }
    }

    /// Try to take one token for `key`.
    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut buckets = self.buckets.lock();
        buckets.checks += 1;
        if buckets.checks % SWEEP_EVERY == 0 {
            Self::sweep(&mut buckets.by_key, self.cfg, now);
        }
        let state = buckets
            .by_key
            .entry(key.to_string())
            .or_insert_with(|| TokenBucketState { tokens: self.cfg.capacity, last_refill: now });
        state.refill(self.cfg, now);
        let allowed = state.tokens >= 1.0;
        if allowed {
            state.tokens -= 1.0;
        }
        let missing = (1.0 - state.tokens).max(0.0);
        let retry_after_secs = (missing / self.cfg.refill_per_sec).ceil() as u64;
        let remaining = state.tokens.floor().max(0.0) as u64;
        drop(buckets);
        RateDecision { allowed, limit: self.cfg.capacity as u64, remaining, retry_after_secs }
    }

    fn sweep(by_key: &mut HashMap<String, TokenBucketState>, cfg: TokenBucketCfg, now: Instant) -> usize {
        let before = by_key.len();
        by_key.retain(|_, state| {
            state.refill(cfg, now);
            state.tokens < cfg.capacity
        });
        let dropped = before - by_key.len();
        if dropped > 0 {
            log::debug!("rate limiter dropped {dropped} idle clients, {} tracked", by_key.len());
        }
        dropped
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().by_key.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_exhausts_then_blocks() {
        let rl = RateLimiter::new(2, Duration::from_secs(3600));
        assert!(rl.check("1.2.3.4").allowed);
        assert!(rl.check("1.2.3.4").allowed);
        let third = rl.check("1.2.3.4");
        assert!(!third.allowed);
        assert!(third.retry_after_secs > 0);
        // other clients keep their own budget
        assert!(rl.check("5.6.7.8").allowed);
    }

    #[test]
    fn idle_clients_are_dropped() {
        let rl = RateLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        rl.check_at("1.2.3.4", t0);
        rl.check_at("5.6.7.8", t0);
        assert_eq!(rl.tracked(), 2);
        {
            let mut b = rl.buckets.lock();
            // half a window later neither bucket is full again
            assert_eq!(RateLimiter::sweep(&mut b.by_key, rl.cfg, t0 + Duration::from_secs(2)), 0);
        }
        rl.check_at("5.6.7.8", t0 + Duration::from_secs(9));
        {
            let mut b = rl.buckets.lock();
            assert_eq!(RateLimiter::sweep(&mut b.by_key, rl.cfg, t0 + Duration::from_secs(11)), 1);
        }
        assert_eq!(rl.tracked(), 1);
    }

    #[test]
    fn sweep_runs_while_checking() {
        let rl = RateLimiter::new(1, Duration::from_millis(1));
        let t0 = Instant::now();
        for i in 0..SWEEP_EVERY - 1 {
            rl.check_at(&format!("10.0.0.{i}"), t0);
        }
        assert_eq!(rl.tracked(), usize::try_from(SWEEP_EVERY - 1).unwrap());
        // every earlier client refilled long ago and goes in this sweep
        rl.check_at("192.168.0.1", t0 + Duration::from_secs(1));
        assert_eq!(rl.tracked(), 1);
    }
}
