use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::handoff::HandoffDirectory;
use crate::push::PushTransport;
use crate::throttle::ThrottleRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub throttle: ThrottleRegistry,
    pub handoff: HandoffDirectory,
    pub push: Arc<dyn PushTransport>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, push: Arc<dyn PushTransport>) -> Self {
        let throttle = ThrottleRegistry::new(config.throttle_window, config.throttle_max_requests);
        let handoff = HandoffDirectory::new(config.bundle_ttl);
        Self {
            pool,
            config: Arc::new(config),
            throttle,
            handoff,
            push,
        }
    }
}
