use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::errors::AppError;
use crate::AppState;

/// Entries idle longer than this are evicted by the background sweep.
const IDLE_RETENTION: Duration = Duration::from_secs(180);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Per-client-IP token-bucket admission control.
///
/// Capacity `burst`, refilled at `rps` tokens/second, advanced by elapsed
/// wall-clock time at each check. The table is a `DashMap`, so updates for a
/// given key are serialized by its shard lock while distinct keys proceed in
/// parallel.
pub struct RateLimiter {
    buckets: DashMap<IpAddr, Bucket>,
    rps: f64,
    burst: f64,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(rps: f64, burst: u32, enabled: bool) -> Self {
        Self {
            buckets: DashMap::new(),
            rps,
            burst: f64::from(burst),
            enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Admit or deny one request for `key`. A denied check consumes nothing.
    pub fn allow(&self, key: IpAddr) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: IpAddr, now: Instant) -> bool {
        let mut entry = self.buckets.entry(key).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.saturating_duration_since(entry.last_refill);
        entry.tokens = (entry.tokens + elapsed.as_secs_f64() * self.rps).min(self.burst);
        entry.last_refill = now;
        entry.last_seen = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn evict_idle(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.last_seen) < IDLE_RETENTION);
        before - self.buckets.len()
    }
}

/// Spawn the idle-entry eviction sweep. Call this once at startup.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = limiter.evict_idle(Instant::now());
            if evicted > 0 {
                tracing::debug!(evicted, "evicted idle rate-limiter entries");
            }
        }
    });
}

/// Outermost gate: runs before identity resolution on every request.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.limiter.enabled() {
        let ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        if !state.limiter.allow(ip) {
            tracing::debug!(client = %ip, "rate limit exceeded");
            return Err(AppError::RateLimited);
        }
    }

    Ok(next.run(req).await)
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[test]
    fn burst_one_refill_one_per_second() {
        let limiter = RateLimiter::new(1.0, 1, true);
        let t0 = Instant::now();

        assert!(limiter.allow_at(localhost(), t0));
        assert!(!limiter.allow_at(localhost(), t0 + Duration::from_millis(10)));
        assert!(limiter.allow_at(localhost(), t0 + Duration::from_secs(1)));
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(10.0, 2, true);
        let t0 = Instant::now();

        // Long idle must not accumulate more than `burst` tokens.
        assert!(limiter.allow_at(localhost(), t0));
        let later = t0 + Duration::from_secs(3600);
        assert!(limiter.allow_at(localhost(), later));
        assert!(limiter.allow_at(localhost(), later));
        assert!(!limiter.allow_at(localhost(), later));
    }

    #[test]
    fn denied_check_consumes_nothing() {
        let limiter = RateLimiter::new(1.0, 1, true);
        let t0 = Instant::now();

        assert!(limiter.allow_at(localhost(), t0));
        for _ in 0..5 {
            assert!(!limiter.allow_at(localhost(), t0));
        }
        // Half a second of refill is still worth half a token.
        assert!(!limiter.allow_at(localhost(), t0 + Duration::from_millis(500)));
        assert!(limiter.allow_at(localhost(), t0 + Duration::from_secs(1)));
    }

    #[test]
    fn distinct_keys_have_independent_buckets() {
        let limiter = RateLimiter::new(1.0, 1, true);
        let t0 = Instant::now();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.allow_at(a, t0));
        assert!(limiter.allow_at(b, t0));
        assert!(!limiter.allow_at(a, t0));
        assert!(!limiter.allow_at(b, t0));
    }

    #[test]
    fn idle_entries_are_evicted() {
        let limiter = RateLimiter::new(1.0, 1, true);
        let t0 = Instant::now();

        limiter.allow_at(localhost(), t0);
        assert_eq!(limiter.evict_idle(t0 + Duration::from_secs(60)), 0);
        assert_eq!(limiter.evict_idle(t0 + IDLE_RETENTION), 1);
        assert_eq!(limiter.buckets.len(), 0);
    }
}
