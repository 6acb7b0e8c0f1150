use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_size: u32,
    pub idle_timeout: Duration,
    /// How long a checkout may wait for a free connection.
    pub connection_timeout: Duration,
}

impl PoolConfig {
    /// 50 connections in production, 20 everywhere else.
    pub fn for_environment(env: &str) -> Self {
        let max_size = if env.eq_ignore_ascii_case("production") {
            50
        } else {
            20
        };
        Self {
            max_size,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_environment("development")
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub request_timeout: Duration,
    pub pool: PoolConfig,
}

impl DashboardConfig {
    /// Keeps the pool checkout timeout strictly inside the request timeout,
    /// so a starved pool surfaces as a pool error rather than a timeout.
    pub fn new(request_timeout: Duration, mut pool: PoolConfig) -> Self {
        if pool.connection_timeout >= request_timeout {
            // r2d2 rejects a zero checkout timeout.
            pool.connection_timeout = (request_timeout / 2).max(Duration::from_millis(1));
        }
        Self {
            request_timeout,
            pool,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT, PoolConfig::default())
    }
}
