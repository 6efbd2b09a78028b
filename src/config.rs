use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub sms: SmsConfig,
    pub push: PushConfig,
    pub retry: RetryConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub idempotency: IdempotencyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Email transport selection. `provider` is one of "gmail", "outlook",
/// "custom" or "" (no SMTP; the local fallback adapter handles email).
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub provider: String,
    pub gmail_email: Option<String>,
    pub gmail_app_password: Option<String>,
    pub outlook_email: Option<String>,
    pub outlook_password: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
    pub use_tls: bool,
}

/// SMS transport selection: "console" or "textbelt".
#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    pub provider: String,
    pub textbelt_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub fcm_server_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Base delay in milliseconds for the first retry attempt.
    pub base_delay_ms: u64,
    /// Exponent base for the backoff curve.
    pub exponential_base: f64,
    /// Cap for the computed delay (milliseconds), before jitter.
    pub max_delay_ms: u64,
    /// Default retry budget when the caller does not supply one.
    pub default_max_retries: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often (seconds) the scheduler sweeps for due notifications.
    pub period_seconds: u64,
    /// Maximum due rows moved onto the queue per sweep.
    pub batch_size: i64,
    /// How often (seconds) the DLQ alert task counts unresolved entries.
    pub dlq_alert_period_seconds: u64,
    /// Retry markers older than this many days are purged daily.
    pub retry_marker_retention_days: i64,
    /// Resolved DLQ entries older than this many days are purged daily.
    pub dlq_retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent delivery workers draining the queue.
    pub count: u32,
    /// Wall-clock budget (seconds) for a single adapter send call.
    pub adapter_timeout_seconds: u64,
    /// Queue pop timeout (milliseconds) before a worker re-checks shutdown.
    pub pop_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    /// Reservation TTL in seconds.
    pub ttl_seconds: u64,
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            smtp: SmtpConfig {
                provider: env::var("SMTP_PROVIDER")
                    .unwrap_or_default()
                    .to_lowercase(),
                gmail_email: env::var("GMAIL_EMAIL").ok(),
                gmail_app_password: env::var("GMAIL_APP_PASSWORD").ok(),
                outlook_email: env::var("OUTLOOK_EMAIL").ok(),
                outlook_password: env::var("OUTLOOK_PASSWORD").ok(),
                host: env::var("SMTP_HOST").ok(),
                port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .unwrap_or(587),
                username: env::var("SMTP_USERNAME").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                from_email: env::var("SMTP_FROM_EMAIL").ok(),
                use_tls: env_bool("SMTP_USE_TLS", true),
            },
            sms: SmsConfig {
                provider: env::var("SMS_PROVIDER")
                    .unwrap_or_else(|_| "console".to_string())
                    .to_lowercase(),
                textbelt_api_key: env::var("TEXTBELT_API_KEY")
                    .unwrap_or_else(|_| "textbelt".to_string()),
            },
            push: PushConfig {
                fcm_server_key: env::var("FCM_SERVER_KEY").ok(),
            },
            retry: RetryConfig {
                base_delay_ms: env::var("BASE_DELAY")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000u64),
                exponential_base: env::var("EXPONENTIAL_BASE")
                    .unwrap_or_else(|_| "2.0".to_string())
                    .parse()
                    .unwrap_or(2.0f64),
                max_delay_ms: env::var("MAX_DELAY")
                    .unwrap_or_else(|_| "300000".to_string())
                    .parse()
                    .unwrap_or(300_000u64),
                default_max_retries: env::var("DEFAULT_MAX_RETRIES")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5i32),
            },
            scheduler: SchedulerConfig {
                period_seconds: env::var("SCHEDULER_PERIOD_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60u64),
                batch_size: env::var("SCHEDULER_BATCH_SIZE")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100i64),
                dlq_alert_period_seconds: env::var("DLQ_ALERT_PERIOD_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300u64),
                retry_marker_retention_days: env::var("RETRY_MARKER_RETENTION_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .unwrap_or(7i64),
                dlq_retention_days: env::var("DLQ_RETENTION_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .unwrap_or(7i64),
            },
            worker: WorkerConfig {
                count: env::var("WORKER_COUNT")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()
                    .unwrap_or(4u32),
                adapter_timeout_seconds: env::var("ADAPTER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10u64),
                pop_timeout_ms: env::var("QUEUE_POP_TIMEOUT_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000u64),
            },
            idempotency: IdempotencyConfig {
                ttl_seconds: env::var("IDEMPOTENCY_TTL_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86_400u64),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
            },
            smtp: SmtpConfig {
                provider: String::new(),
                gmail_email: None,
                gmail_app_password: None,
                outlook_email: None,
                outlook_password: None,
                host: None,
                port: 587,
                username: None,
                password: None,
                from_email: None,
                use_tls: true,
            },
            sms: SmsConfig {
                provider: "console".to_string(),
                textbelt_api_key: "textbelt".to_string(),
            },
            push: PushConfig {
                fcm_server_key: None,
            },
            retry: RetryConfig {
                base_delay_ms: 1000,
                exponential_base: 2.0,
                max_delay_ms: 300_000,
                default_max_retries: 5,
            },
            scheduler: SchedulerConfig {
                period_seconds: 60,
                batch_size: 100,
                dlq_alert_period_seconds: 300,
                retry_marker_retention_days: 7,
                dlq_retention_days: 7,
            },
            worker: WorkerConfig {
                count: 4,
                adapter_timeout_seconds: 10,
                pop_timeout_ms: 1000,
            },
            idempotency: IdempotencyConfig { ttl_seconds: 86_400 },
        }
    }
}
