//! Per-client admission limiter
//!
//! Fixed window counter keyed by client identity. Consulted once per run,
//! before orchestration starts; it never gates individual names. The table is
//! bounded: expired windows are swept periodically and, when full, the window
//! closest to expiry is evicted.

use chrono::{DateTime, Utc};
use ndx_common::config::RateLimitConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Result of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    Limited {
        retry_after_secs: u64,
        reset_at: DateTime<Utc>,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    window: Duration,
    max_requests: u32,
    max_clients: usize,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: config.window(),
            max_requests: config.max_requests,
            max_clients: config.max_clients.max(1),
        }
    }

    /// Count one request for `client_id`
    pub async fn check(&self, client_id: &str) -> RateDecision {
        self.check_at(client_id, Instant::now()).await
    }

    /// [`check`](Self::check) against an explicit clock reading
    pub async fn check_at(&self, client_id: &str, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().await;

        if !windows.contains_key(client_id) && windows.len() >= self.max_clients {
            windows.retain(|_, w| w.reset_at > now);
            if windows.len() >= self.max_clients {
                let oldest = windows
                    .iter()
                    .min_by_key(|(_, w)| w.reset_at)
                    .map(|(id, _)| id.clone());
                if let Some(id) = oldest {
                    tracing::debug!(client = %id, "Rate limit table full, evicting client");
                    windows.remove(&id);
                }
            }
        }

        let window = windows.entry(client_id.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= window.reset_at {
            *window = Window {
                count: 0,
                reset_at: now + self.window,
            };
        }

        let reset_at = wall_clock(window.reset_at, now);

        if window.count >= self.max_requests {
            let wait = window.reset_at.saturating_duration_since(now);
            let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            tracing::info!(client = %client_id, retry_after_secs, "Rate limit exceeded");
            return RateDecision::Limited {
                retry_after_secs,
                reset_at,
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - window.count,
            reset_at,
        }
    }

    /// Drop expired windows; returns how many were removed
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    pub async fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        let removed = before - windows.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = windows.len(), "Swept expired rate limit windows");
        }
        removed
    }

    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }
}

fn wall_clock(instant: Instant, now: Instant) -> DateTime<Utc> {
    let ahead = instant.saturating_duration_since(now);
    Utc::now() + chrono::Duration::from_std(ahead).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64, max_clients: usize) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window_secs,
            max_requests,
            max_clients,
            sweep_interval_secs: 60,
        })
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = limiter(3, 60, 10);
        let now = Instant::now();
        for expected in [2, 1, 0] {
            match limiter.check_at("a", now).await {
                RateDecision::Allowed { remaining, .. } => assert_eq!(remaining, expected),
                other => panic!("unexpected {:?}", other),
            }
        }
        match limiter.check_at("a", now + Duration::from_millis(1500)).await {
            RateDecision::Limited { retry_after_secs, .. } => assert_eq!(retry_after_secs, 59),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = limiter(1, 60, 10);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).await.is_allowed());
        assert!(!limiter.check_at("a", now).await.is_allowed());
        assert!(limiter.check_at("b", now).await.is_allowed());
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(1, 60, 10);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).await.is_allowed());
        assert!(!limiter.check_at("a", now).await.is_allowed());
        assert!(limiter.check_at("a", now + Duration::from_secs(60)).await.is_allowed());
    }

    #[tokio::test]
    async fn test_table_is_bounded() {
        let limiter = limiter(5, 60, 2);
        let now = Instant::now();
        limiter.check_at("a", now).await;
        limiter.check_at("b", now + Duration::from_secs(1)).await;
        limiter.check_at("c", now + Duration::from_secs(2)).await;
        assert_eq!(limiter.tracked_clients().await, 2);

        // "a" had the earliest reset and was evicted, so it starts fresh
        match limiter.check_at("a", now + Duration::from_secs(3)).await {
            RateDecision::Allowed { remaining, .. } => assert_eq!(remaining, 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let limiter = limiter(5, 10, 100);
        let now = Instant::now();
        limiter.check_at("a", now).await;
        limiter.check_at("b", now + Duration::from_secs(5)).await;

        assert_eq!(limiter.sweep_at(now + Duration::from_secs(11)).await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_do_not_undercount() {
        let limiter = std::sync::Arc::new(limiter(50, 60, 10));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("shared").await.is_allowed() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 50);
    }
}
