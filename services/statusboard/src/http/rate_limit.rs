//! Per-client-IP token-bucket rate limiting.
//!
//! Buckets refill continuously up to a burst capacity. The table is keyed
//! by client IP; entries idle beyond a threshold are evicted on a periodic
//! sweep piggybacked onto `check`, so the map cannot grow without bound.
//!
//! The client IP is the peer address, unless the peer is a configured
//! trusted proxy, in which case the first entry of `X-Forwarded-For` is
//! used.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::http::response;
use crate::http::state::AppState;

const IDLE_TTL: Duration = Duration::from_secs(600);
const SWEEP_EVERY: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    state: Mutex<LimiterState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct LimiterState {
    buckets: HashMap<IpAddr, Bucket>,
    last_sweep: Instant,
}

struct Bucket {
    tokens: f64,
    last_update: Instant,
}

impl RateLimiter {
    /// `burst` requests immediately, refilling at `per_minute / 60` per
    /// second thereafter.
    pub fn new(burst: u32, per_minute: u32) -> Self {
        RateLimiter {
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            capacity: f64::from(burst),
            refill_per_sec: f64::from(per_minute) / 60.0,
        }
    }

    /// Take one token for `ip`; false means the request must be rejected.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().expect("rate limiter lock poisoned");

        if now.duration_since(state.last_sweep) >= SWEEP_EVERY {
            state
                .buckets
                .retain(|_, bucket| now.duration_since(bucket.last_update) < IDLE_TTL);
            state.last_sweep = now;
        }

        let bucket = state.buckets.entry(ip).or_insert(Bucket {
            tokens: self.capacity,
            last_update: now,
        });
        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_update = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub fn client_ip(peer: SocketAddr, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> IpAddr {
    let peer_ip = peer.ip();
    if trusted_proxies.contains(&peer_ip) {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer_ip
}

pub async fn limit_by_ip(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(peer, request.headers(), &state.trusted_proxies);
    if !state.limiter.check(ip) {
        return response::too_many_requests("rate limit exceeded");
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().expect("test ip")
    }

    #[test]
    fn burst_is_allowed_then_limited() {
        // Zero refill: only the burst capacity is ever available.
        let limiter = RateLimiter::new(3, 0);
        let client = ip("192.0.2.1");
        assert!(limiter.check(client));
        assert!(limiter.check(client));
        assert!(limiter.check(client));
        assert!(!limiter.check(client));
    }

    #[test]
    fn buckets_are_independent_per_ip() {
        let limiter = RateLimiter::new(1, 0);
        assert!(limiter.check(ip("192.0.2.1")));
        assert!(!limiter.check(ip("192.0.2.1")));
        assert!(limiter.check(ip("192.0.2.2")));
    }

    #[test]
    fn forwarded_header_is_honored_only_from_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "10.0.0.250:9000".parse().unwrap();

        let trusted = vec![ip("10.0.0.250")];
        assert_eq!(client_ip(peer, &headers, &trusted), ip("203.0.113.9"));

        // Same header from an untrusted peer is ignored.
        assert_eq!(client_ip(peer, &headers, &[]), ip("10.0.0.250"));
    }

    #[test]
    fn malformed_forwarded_header_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        let peer: SocketAddr = "10.0.0.250:9000".parse().unwrap();
        let trusted = vec![ip("10.0.0.250")];
        assert_eq!(client_ip(peer, &headers, &trusted), ip("10.0.0.250"));
    }
}
