use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::http::auth::AdminAuth;
use crate::http::rate_limit::RateLimiter;
use crate::store::ConfigStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub auth: Arc<AdminAuth>,
    pub limiter: Arc<RateLimiter>,
    /// Peers allowed to supply `X-Forwarded-For` for client-IP extraction.
    pub trusted_proxies: Arc<Vec<IpAddr>>,
    /// Set once shutdown begins; API requests arriving during the drain
    /// window are answered with 503 instead of being dispatched.
    pub draining: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        store: Arc<ConfigStore>,
        auth: Arc<AdminAuth>,
        limiter: Arc<RateLimiter>,
        trusted_proxies: Vec<IpAddr>,
    ) -> Self {
        AppState {
            store,
            auth,
            limiter,
            trusted_proxies: Arc::new(trusted_proxies),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }
}
