//! Basic per-tenant admission check (spec §1 Non-goals: "rate limiting algorithms beyond a
//! basic token-bucket admission check" are out of scope — this is that basic check). One
//! bucket per owner API key, refilled continuously at `rate_limit_per_minute / 60` tokens/sec.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::{Extension, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::Owner;
use crate::error::{rate_limited, CompatError, NativeError};
use crate::state::AppState;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            capacity: per_minute as f64,
            refill_per_sec: per_minute as f64 / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Draws one token for `key`, refilling proportionally to elapsed wall-clock time first.
    /// Returns `false` once the bucket is exhausted.
    pub fn try_acquire(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn check(state: &AppState, owner: &str) -> Result<(), gateway_core::GatewayError> {
    if state.rate_limiter.try_acquire(owner) {
        Ok(())
    } else {
        Err(rate_limited("rate limit exceeded"))
    }
}

pub async fn native(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    request: Request,
    next: Next,
) -> Result<Response, NativeError> {
    check(&state, &owner).await.map_err(NativeError)?;
    Ok(next.run(request).await)
}

pub async fn compat(
    State(state): State<Arc<AppState>>,
    Extension(Owner(owner)): Extension<Owner>,
    request: Request,
    next: Next,
) -> Result<Response, CompatError> {
    check(&state, &owner).await.map_err(CompatError)?;
    Ok(next.run(request).await)
}
