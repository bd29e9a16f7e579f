// Per-caller admission control using a token bucket
//
// Design:
// - One bucket per caller identifier (user ID, API key, ...)
// - Capacity 1, one token restored per elapsed refill interval (whole intervals only)
// - First request creates the bucket already drained and is admitted
// - Bucket state lives behind `RateLimitStore` so a shared store can replace
//   the in-memory map in multi-instance deployments
// - Lock per bucket: the read-modify-write of one bucket is serialised, other
//   callers are not blocked
// - Background sweep drops buckets idle for longer than `idle_ttl`

use crate::error::AdmissionError;
use crate::metrics;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Largest accepted serialized request payload (1 MiB)
pub const MAX_PAYLOAD_BYTES: usize = 1_048_576;

/// Token-bucket parameters shared by every bucket of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum tokens a bucket can hold
    pub capacity: u32,
    /// One token is restored per elapsed interval
    pub refill_interval: Duration,
    /// Buckets whose last refill is older than this are reaped
    pub idle_ttl: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        let refill_interval = Duration::from_millis(3_000);
        Self {
            capacity: 1,
            refill_interval,
            idle_ttl: refill_interval * 10,
        }
    }
}

/// Token bucket state for one caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBucket {
    pub tokens: u32,
    pub last_refill: Instant,
}

impl RateBucket {
    /// Bucket for a caller seen for the first time; its admission has already been spent.
    pub fn drained(now: Instant) -> Self {
        Self {
            tokens: 0,
            last_refill: now,
        }
    }

    /// Add one token per whole elapsed interval, capped at capacity.
    ///
    /// `last_refill` only moves when at least one token was added.
    fn refill(&mut self, now: Instant, policy: &RateLimitPolicy) {
        let interval_ms = policy.refill_interval.as_millis().max(1);
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_millis();
        let intervals = elapsed_ms / interval_ms;

        if intervals > 0 {
            let added = u32::try_from(intervals).unwrap_or(u32::MAX);
            self.tokens = self.tokens.saturating_add(added).min(policy.capacity);
            self.last_refill = now;
        }
    }

    /// Refill, then consume one token if available.
    pub fn try_consume(&mut self, now: Instant, policy: &RateLimitPolicy) -> bool {
        self.refill(now, policy);

        if self.tokens >= 1 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Time until the next refill boundary, zero if already due.
    pub fn retry_after(&self, now: Instant, policy: &RateLimitPolicy) -> Duration {
        policy
            .refill_interval
            .saturating_sub(now.saturating_duration_since(self.last_refill))
    }

    fn is_idle(&self, now: Instant, idle_ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_refill) > idle_ttl
    }
}

/// Storage for per-caller buckets.
///
/// Implementations must make `try_acquire` atomic per identifier: two
/// concurrent calls must never both observe the same available token.
pub trait RateLimitStore: Send + Sync {
    /// Admit or deny one request for `id` at `now`.
    fn try_acquire(&self, id: &str, now: Instant, policy: &RateLimitPolicy) -> bool;

    /// Retry hint for `id`; zero for unknown identifiers.
    fn retry_after(&self, id: &str, now: Instant, policy: &RateLimitPolicy) -> Duration;

    /// Remove buckets idle for longer than `idle_ttl`, returning how many were removed.
    fn sweep(&self, now: Instant, idle_ttl: Duration) -> usize;

    /// Number of tracked identifiers
    fn bucket_count(&self) -> usize;
}

/// Process-local bucket map.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    buckets: RwLock<HashMap<String, Mutex<RateBucket>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the bucket for `id` (for observability)
    pub fn bucket(&self, id: &str) -> Option<RateBucket> {
        self.buckets.read().get(id).map(|b| *b.lock())
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn try_acquire(&self, id: &str, now: Instant, policy: &RateLimitPolicy) -> bool {
        // The map guard stays held while the bucket is consumed, so `sweep`
        // (write lock) cannot remove a bucket that is mid-acquire.
        {
            let buckets = self.buckets.read();
            if let Some(bucket) = buckets.get(id) {
                return bucket.lock().try_consume(now, policy);
            }
        }

        // Slow path: another thread may have created it meanwhile
        let mut buckets = self.buckets.write();
        match buckets.entry(id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Mutex::new(RateBucket::drained(now)));
                true
            }
            Entry::Occupied(slot) => slot.get().lock().try_consume(now, policy),
        }
    }

    fn retry_after(&self, id: &str, now: Instant, policy: &RateLimitPolicy) -> Duration {
        self.buckets
            .read()
            .get(id)
            .map(|bucket| bucket.lock().retry_after(now, policy))
            .unwrap_or(Duration::ZERO)
    }

    fn sweep(&self, now: Instant, idle_ttl: Duration) -> usize {
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.lock().is_idle(now, idle_ttl));
        before - buckets.len()
    }

    fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

/// Admission decision as reported to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub retry_after_ms: u64,
}

impl From<&Result<(), AdmissionError>> for AdmissionDecision {
    fn from(result: &Result<(), AdmissionError>) -> Self {
        match result {
            Ok(()) => AdmissionDecision {
                allowed: true,
                retry_after_ms: 0,
            },
            Err(e) => AdmissionDecision {
                allowed: false,
                retry_after_ms: e.retry_after_ms(),
            },
        }
    }
}

/// Per-caller rate limiter with payload-size guard.
///
/// # Example
/// ```ignore
/// let limiter = RateLimiter::new(RateLimitPolicy::default());
/// match limiter.admit("user_123", body.len()) {
///     Ok(()) => { /* process request */ }
///     Err(e) => { /* reply 429 / 413 with e.retry_after_ms() */ }
/// }
/// ```
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
    max_payload_bytes: usize,
}

impl RateLimiter {
    /// Limiter backed by a fresh in-memory store
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_store(policy, Arc::new(InMemoryRateLimitStore::new()))
    }

    pub fn with_store(policy: RateLimitPolicy, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            policy,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Returns true if the request is allowed (a token was consumed).
    pub fn check_rate_limit(&self, id: &str) -> bool {
        self.check_rate_limit_at(id, Instant::now())
    }

    pub fn check_rate_limit_at(&self, id: &str, now: Instant) -> bool {
        self.store.try_acquire(id, now, &self.policy)
    }

    /// Milliseconds until `id` may retry; zero for unknown callers.
    pub fn get_retry_after(&self, id: &str) -> u64 {
        self.get_retry_after_at(id, Instant::now())
    }

    pub fn get_retry_after_at(&self, id: &str, now: Instant) -> u64 {
        duration_ms(self.store.retry_after(id, now, &self.policy))
    }

    /// True if the serialized payload fits within the size limit.
    ///
    /// Payloads that fail to serialize are rejected.
    pub fn validate_payload_size<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        serde_json::to_vec(payload)
            .map(|bytes| self.payload_within_limit(bytes.len()))
            .unwrap_or(false)
    }

    pub fn payload_within_limit(&self, payload_bytes: usize) -> bool {
        payload_bytes <= self.max_payload_bytes
    }

    /// Payload guard first, then the caller's bucket.
    pub fn admit(&self, id: &str, payload_bytes: usize) -> Result<(), AdmissionError> {
        self.admit_at(id, payload_bytes, Instant::now())
    }

    pub fn admit_at(
        &self,
        id: &str,
        payload_bytes: usize,
        now: Instant,
    ) -> Result<(), AdmissionError> {
        if !self.payload_within_limit(payload_bytes) {
            metrics::PAYLOAD_REJECTIONS_TOTAL.inc();
            debug!(
                caller = id,
                size = payload_bytes,
                limit = self.max_payload_bytes,
                "Rejected oversized payload"
            );
            return Err(AdmissionError::PayloadTooLarge {
                size: payload_bytes,
                limit: self.max_payload_bytes,
            });
        }

        if self.check_rate_limit_at(id, now) {
            metrics::ADMISSIONS_ALLOWED_TOTAL.inc();
            Ok(())
        } else {
            metrics::ADMISSIONS_DENIED_TOTAL.inc();
            let retry_after_ms = self.get_retry_after_at(id, now);
            debug!(caller = id, retry_after_ms, "Rate limit exceeded");
            Err(AdmissionError::RateLimitExceeded { retry_after_ms })
        }
    }

    /// Drop idle buckets; returns how many were removed.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let removed = self.store.sweep(now, self.policy.idle_ttl);
        if removed > 0 {
            metrics::RATE_LIMIT_BUCKETS_REAPED_TOTAL.inc_by(removed as f64);
            debug!(
                removed,
                remaining = self.store.bucket_count(),
                "Reaped idle rate-limit buckets"
            );
        }
        removed
    }

    /// Get count of tracked callers
    pub fn bucket_count(&self) -> usize {
        self.store.bucket_count()
    }

    /// Run `sweep_idle` every `every` on the current tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        info!(
            interval_ms = duration_ms(every),
            idle_ttl_ms = duration_ms(limiter.policy.idle_ttl),
            "Starting rate-limit sweeper"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                limiter.sweep_idle();
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
