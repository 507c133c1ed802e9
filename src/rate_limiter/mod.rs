/*!
 * # Rate Limiting Module
 *
 * Fixed-window request limiter keyed by caller identifier (IP, user id, or
 * a composite key). The default store is process-local (a `DashMap`), which
 * gives explicit single-instance semantics; an optional Redis-backed counter
 * with TTL provides distributed limiting across multiple API instances, with
 * automatic fallback to the in-memory store when Redis is unreachable.
 *
 * Handlers call [`RateLimiter::check_rate_limit`] directly with a
 * per-endpoint configuration; all configurations share one underlying store.
 */
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    last_request: Instant,
}

impl RateLimitEntry {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            count: 0,
            window_start: now,
            last_request: now,
        }
    }

    fn increment(&mut self, window_duration: Duration) {
        let now = Instant::now();

        // Reset if window has expired
        if now.duration_since(self.window_start) >= window_duration {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count += 1;
        }

        self.last_request = now;
    }

    fn is_allowed(&self, limit: u32, window_duration: Duration) -> bool {
        let now = Instant::now();

        // If window has expired, allow the request
        if now.duration_since(self.window_start) >= window_duration {
            return true;
        }

        // count holds requests already admitted in this window
        self.count < limit
    }

    fn time_until_reset(&self, window_duration: Duration) -> Duration {
        let elapsed = self.last_request.duration_since(self.window_start);
        if elapsed >= window_duration {
            Duration::from_secs(0)
        } else {
            window_duration - elapsed
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub enum RateLimitBackend {
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

impl Default for RateLimitBackend {
    fn default() -> Self {
        Self::InMemory
    }
}

#[derive(Clone)]
enum RateLimitStore {
    InMemory {
        entries: Arc<DashMap<String, RateLimitEntry>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, RateLimitEntry>>,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory {
                entries: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => RateLimitStore::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };

        Self { store, config }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, RateLimitBackend::InMemory)
    }

    /// Returns a limiter with different limits sharing this limiter's store.
    pub fn with_config(&self, config: RateLimitConfig) -> Self {
        Self {
            store: self.store.clone(),
            config,
        }
    }

    /// Counts a request against `key`'s window. Redis failures degrade to
    /// the in-memory fallback store rather than failing the request.
    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        match &self.store {
            RateLimitStore::InMemory { entries } => Self::check_in_memory(entries, key, &self.config),
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => match client.get_async_connection().await {
                Ok(mut conn) => {
                    match Self::check_with_redis(&mut conn, namespace, key, &self.config).await {
                        Ok(result) => result,
                        Err(err) => {
                            warn!("Redis rate limit error: {}", err);
                            Self::check_in_memory(fallback, key, &self.config)
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Failed to connect to Redis for rate limiting, using fallback: {}",
                        err
                    );
                    Self::check_in_memory(fallback, key, &self.config)
                }
            },
        }
    }

    fn check_in_memory(
        entries: &DashMap<String, RateLimitEntry>,
        key: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        let mut entry = entries
            .entry(key.to_string())
            .or_insert_with(RateLimitEntry::new);

        if !entry.is_allowed(config.requests_per_window, config.window_duration) {
            let time_until_reset = entry.time_until_reset(config.window_duration);
            return RateLimitResult {
                allowed: false,
                limit: config.requests_per_window,
                remaining: 0,
                reset_time: time_until_reset,
            };
        }

        entry.increment(config.window_duration);
        let remaining = config.requests_per_window.saturating_sub(entry.count);
        let time_until_reset = entry.time_until_reset(config.window_duration);

        RateLimitResult {
            allowed: true,
            limit: config.requests_per_window,
            remaining,
            reset_time: time_until_reset,
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let limit = config.requests_per_window as i64;
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
        } else {
            let ttl: i64 = conn.ttl(&redis_key).await.unwrap_or(-1);
            if ttl < 0 {
                let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
            }
        }

        let ttl_secs = match conn.ttl::<_, i64>(&redis_key).await {
            Ok(ttl) if ttl > 0 => ttl as u64,
            _ => window_secs,
        };
        let allowed = count <= limit;
        let remaining = if allowed {
            config
                .requests_per_window
                .saturating_sub(count.max(0) as u32)
        } else {
            0
        };

        Ok(RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time: Duration::from_secs(ttl_secs),
        })
    }

    pub async fn cleanup_expired(&self) {
        let entries = match &self.store {
            RateLimitStore::InMemory { entries } => entries,
            RateLimitStore::Redis { fallback, .. } => fallback,
        };
        let now = Instant::now();
        entries.retain(|_, entry| {
            now.duration_since(entry.window_start) < self.config.window_duration
        });
    }
}

#[derive(Debug)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

/// Periodically evicts stale windows from the in-memory store.
pub async fn start_cleanup_task(rate_limiter: RateLimiter, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        interval_timer.tick().await;
        rate_limiter.cleanup_expired().await;
        debug!("Rate limiter cleanup completed");
    }
}
