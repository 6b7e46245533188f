use bms_core::FeedKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DEPARTMENTS: [&str; 4] = ["Admin", "Mantenimiento", "Tesorería", "Seguridad"];

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
const DEFAULT_CHAT_POLL_MS: u64 = 500;
const DEFAULT_NOTIFICATION_POLL_MS: u64 = 30_000;
const DEFAULT_PUSH_RETRY_ATTEMPTS: u32 = 10;
const DEFAULT_PUSH_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_ECHO_TOLERANCE_MS: u64 = 10_000;
const DEFAULT_INBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Fixed delay between attempts, capped attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PUSH_RETRY_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_PUSH_RETRY_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub push_socket_path: PathBuf,
    pub chat_poll_interval: Duration,
    pub notification_poll_interval: Duration,
    pub push_retry: RetryPolicy,
    pub echo_tolerance: Duration,
    pub relay_enabled: bool,
    /// Directory where sibling instances on this host meet for the cross-instance relay.
    pub relay_dir: PathBuf,
    pub inbox_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: None,
            push_socket_path: default_push_socket_path(None),
            chat_poll_interval: Duration::from_millis(DEFAULT_CHAT_POLL_MS),
            notification_poll_interval: Duration::from_millis(DEFAULT_NOTIFICATION_POLL_MS),
            push_retry: RetryPolicy::default(),
            echo_tolerance: Duration::from_millis(DEFAULT_ECHO_TOLERANCE_MS),
            relay_enabled: true,
            relay_dir: default_relay_dir(None),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

impl FeedConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let runtime_dir = get("XDG_RUNTIME_DIR");
        let mut config = FeedConfig {
            push_socket_path: default_push_socket_path(runtime_dir.clone()),
            relay_dir: default_relay_dir(runtime_dir),
            ..FeedConfig::default()
        };

        if let Some(base) = get("BMS_API_BASE") {
            config.api_base = base.trim().trim_end_matches('/').to_string();
        }
        config.api_token = get("BMS_API_TOKEN").map(|token| token.trim().to_string());
        if let Some(path) = get("BMS_PUSH_SOCKET") {
            config.push_socket_path = PathBuf::from(path.trim());
        }
        if let Some(raw) = get("BMS_CHAT_POLL_MS") {
            config.chat_poll_interval = Duration::from_millis(parse_positive("BMS_CHAT_POLL_MS", &raw)?);
        }
        if let Some(raw) = get("BMS_NOTIFICATION_POLL_MS") {
            config.notification_poll_interval =
                Duration::from_millis(parse_positive("BMS_NOTIFICATION_POLL_MS", &raw)?);
        }
        if let Some(raw) = get("BMS_PUSH_RETRY_ATTEMPTS") {
            let attempts = parse_u64("BMS_PUSH_RETRY_ATTEMPTS", &raw)?;
            config.push_retry.max_attempts =
                u32::try_from(attempts).map_err(|_| invalid("BMS_PUSH_RETRY_ATTEMPTS", &raw))?;
        }
        if let Some(raw) = get("BMS_PUSH_RETRY_DELAY_MS") {
            config.push_retry.delay =
                Duration::from_millis(parse_u64("BMS_PUSH_RETRY_DELAY_MS", &raw)?);
        }
        if let Some(raw) = get("BMS_ECHO_TOLERANCE_MS") {
            config.echo_tolerance = Duration::from_millis(parse_u64("BMS_ECHO_TOLERANCE_MS", &raw)?);
        }
        if let Some(path) = get("BMS_RELAY_DIR") {
            config.relay_dir = PathBuf::from(path.trim());
        }
        if let Some(raw) = get("BMS_RELAY_ENABLED") {
            config.relay_enabled =
                parse_bool_flag(&raw).ok_or_else(|| invalid("BMS_RELAY_ENABLED", &raw))?;
        }

        Ok(config)
    }

    pub fn poll_interval(&self, kind: FeedKind) -> Duration {
        match kind {
            FeedKind::Chat => self.chat_poll_interval,
            FeedKind::Notifications => self.notification_poll_interval,
        }
    }

    pub fn echo_tolerance_ms(&self) -> i64 {
        i64::try_from(self.echo_tolerance.as_millis()).unwrap_or(i64::MAX)
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_push_socket_path(runtime_dir: Option<String>) -> PathBuf {
    match runtime_dir {
        Some(dir) => PathBuf::from(dir).join("bms").join("push.sock"),
        None => std::env::temp_dir().join("bms-push.sock"),
    }
}

fn default_relay_dir(runtime_dir: Option<String>) -> PathBuf {
    match runtime_dir {
        Some(dir) => PathBuf::from(dir).join("bms").join("relay"),
        None => std::env::temp_dir().join("bms-relay"),
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| invalid(key, raw))
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match parse_u64(key, raw)? {
        0 => Err(invalid(key, raw)),
        value => Ok(value),
    }
}

fn invalid(key: &'static str, raw: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: raw.to_string(),
    }
}
