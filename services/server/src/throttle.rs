use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_protocol::HttpErrorEnvelope;
use tokio::sync::RwLock;

use crate::state::AppState;

/// Applied only to the `sig`-authenticated routes (§4.6): pairing endpoints
/// rely on signature cost and token semantics instead. The key is read
/// straight off the header, before signature verification runs, since the
/// throttle's job is load-shedding, not an authenticity check.
pub async fn enforce(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let public_key = req
        .headers()
        .get("x-public-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Some(public_key) = public_key {
        if !state.throttle.check(&public_key).await {
            return (
                axum::http::StatusCode::TOO_MANY_REQUESTS,
                Json(HttpErrorEnvelope {
                    error: "Too many requests".to_owned(),
                }),
            )
                .into_response();
        }
    }

    next.run(req).await
}

/// §4.6: a process-local `publicKey -> {count, resetAt}` map, fixed window.
/// Unauthenticated requests don't carry a key and are never throttled here.
#[derive(Clone)]
pub struct ThrottleRegistry {
    window: Duration,
    max_requests: u32,
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
}

struct Bucket {
    count: u32,
    reset_at: Instant,
}

impl ThrottleRegistry {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns `true` if the request for `public_key` is allowed, bumping its
    /// counter. Returns `false` once the cap is hit within the window.
    pub async fn check(&self, public_key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        match buckets.get_mut(public_key) {
            Some(bucket) if bucket.reset_at > now => {
                if bucket.count >= self.max_requests {
                    false
                } else {
                    bucket.count += 1;
                    true
                }
            }
            _ => {
                buckets.insert(
                    public_key.to_owned(),
                    Bucket {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_up_to_the_cap_then_rejects() {
        let throttle = ThrottleRegistry::new(Duration::from_secs(60), 2);
        assert!(throttle.check("A").await);
        assert!(throttle.check("A").await);
        assert!(!throttle.check("A").await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let throttle = ThrottleRegistry::new(Duration::from_secs(60), 1);
        assert!(throttle.check("A").await);
        assert!(throttle.check("B").await);
        assert!(!throttle.check("A").await);
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let throttle = ThrottleRegistry::new(Duration::from_millis(20), 1);
        assert!(throttle.check("A").await);
        assert!(!throttle.check("A").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(throttle.check("A").await);
    }
}
