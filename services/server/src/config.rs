use std::env;
use std::time::Duration;

/// Startup configuration gathered from the environment once, rather than
/// scattering `env::var` calls through the handlers.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub log_level: String,
    /// §4.1 replay window: max allowed clock skew between client and server.
    pub replay_window: Duration,
    /// §3 relay token TTL: initiator-time + this, default 10 minutes.
    pub token_ttl: Duration,
    /// §3 pending handoff bundle TTL, default 5 minutes.
    pub bundle_ttl: Duration,
    /// §4.6 throttle window, default 60 seconds.
    pub throttle_window: Duration,
    /// §4.6 throttle cap, default 60 requests per window per key.
    pub throttle_max_requests: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            replay_window: Duration::from_secs(env_u64("REPLAY_WINDOW_SECS", 300)),
            token_ttl: Duration::from_secs(env_u64("TOKEN_TTL_SECS", 600)),
            bundle_ttl: Duration::from_secs(env_u64("BUNDLE_TTL_SECS", 300)),
            throttle_window: Duration::from_secs(env_u64("THROTTLE_WINDOW_SECS", 60)),
            throttle_max_requests: env_u64("THROTTLE_MAX_REQUESTS", 60) as u32,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_to_default_when_unset_or_unparseable() {
        assert_eq!(env_u64("RELAY_TEST_UTILS_DOES_NOT_EXIST", 42), 42);
    }
}
