/// Kiosk configuration - every knob the pipeline needs
///
/// # Environment variables
///
/// All entries can be overridden through environment variables:
///
/// | Variable | Default | Purpose |
/// |----------|---------|---------|
/// | WORK_DIR | /var/lib/locker-kiosk | working directory (cache, logs) |
/// | BACKEND_BASE_URL | http://localhost:8080/api/v1 | authoritative store |
/// | MIRROR_BASE_URL | http://localhost:9000 | mirror store (RTDB-style REST) |
/// | GATEWAY_BASE_URL | http://localhost:8080/api/v1 | payment-gateway broker |
/// | NOTIFY_API_URL | (empty: disabled) | outbound notification endpoint |
/// | NOTIFY_API_KEY | (empty) | notification provider key |
/// | MERCHANT_CODE | KIOSK-DEV | merchant code sent with status polls |
/// | REQUEST_TIMEOUT_MS | 30000 | store request timeout |
/// | INTENT_TIMEOUT_MS | 15000 | gateway create-intent timeout |
/// | POLL_TIMEOUT_MS | 10000 | gateway status-poll timeout |
/// | FULL_SYNC_INTERVAL_SECS | 3600 | mirror full-resync safety net |
/// | EXPIRY_SWEEP_INTERVAL_SECS | 300 | cache expiry sweep cadence |
/// | ENVIRONMENT | development | development \| staging \| production |
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for the local cache and log files.
    pub work_dir: String,
    /// Authoritative store base URL.
    pub backend_base_url: String,
    /// Mirror store base URL.
    pub mirror_base_url: String,
    /// Payment gateway broker base URL.
    pub gateway_base_url: String,
    /// Outbound notification endpoint. Empty disables delivery.
    pub notify_api_url: String,
    /// Notification provider API key.
    pub notify_api_key: String,
    /// Merchant code included in gateway status polls.
    pub merchant_code: String,
    /// Store request timeout (milliseconds).
    pub request_timeout_ms: u64,
    /// Gateway create-intent timeout (milliseconds).
    pub intent_timeout_ms: u64,
    /// Gateway status-poll timeout (milliseconds).
    pub poll_timeout_ms: u64,
    /// Interval of the periodic full mirror resync (seconds).
    pub full_sync_interval_secs: u64,
    /// Interval of the pending-booking expiry sweep (seconds).
    pub expiry_sweep_interval_secs: u64,
    /// Running environment: development | staging | production.
    pub environment: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the environment, with defaults for anything
    /// unset.
    pub fn from_env() -> Self {
        Self {
            work_dir: env_or("WORK_DIR", "/var/lib/locker-kiosk"),
            backend_base_url: env_or("BACKEND_BASE_URL", "http://localhost:8080/api/v1"),
            mirror_base_url: env_or("MIRROR_BASE_URL", "http://localhost:9000"),
            gateway_base_url: env_or("GATEWAY_BASE_URL", "http://localhost:8080/api/v1"),
            notify_api_url: env_or("NOTIFY_API_URL", ""),
            notify_api_key: env_or("NOTIFY_API_KEY", ""),
            merchant_code: env_or("MERCHANT_CODE", "KIOSK-DEV"),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30_000),
            intent_timeout_ms: env_parse("INTENT_TIMEOUT_MS", 15_000),
            poll_timeout_ms: env_parse("POLL_TIMEOUT_MS", 10_000),
            full_sync_interval_secs: env_parse("FULL_SYNC_INTERVAL_SECS", 3_600),
            expiry_sweep_interval_secs: env_parse("EXPIRY_SWEEP_INTERVAL_SECS", 300),
            environment: env_or("ENVIRONMENT", "development"),
        }
    }

    /// Override the working directory, for tests.
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Whether outbound notifications are configured at all.
    pub fn notifications_enabled(&self) -> bool {
        !self.notify_api_url.is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
