//! Application configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use domain::OrderConfig;
use notifications::{Channel, NotificationConfig, QuietHoursPolicy};
use projections::ProcessorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Host configuration with defaults for every setting.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `METRICS_ADDR`: Prometheus listener, `off` to disable (default `0.0.0.0:9000`)
/// - `DATABASE_URL`: PostgreSQL for events, keys and checkpoints; in memory when unset
/// - `DATABASE_MAX_CONNECTIONS` (default `5`)
/// - `ORDER_NUMBER_ATTEMPTS`, `MAX_COMMAND_ATTEMPTS`
/// - `PROJECTION_BATCH_SIZE`, `PROJECTION_POLL_MS`
/// - `NOTIFICATION_QUEUE_CAPACITY`, `NOTIFICATION_CHANNEL_TIMEOUT_MS`
/// - `QUIET_HOURS_SUPPRESS`: comma separated channels, or `none` (default `push,sms`)
/// - `QUIET_HOURS_UTC_OFFSET_MINUTES` (default `0`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_addr: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub orders: OrderConfig,
    pub projections: ProcessorConfig,
    pub notifications: NotificationConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let metrics_addr = match lookup("METRICS_ADDR") {
            Some(v) if v.trim().eq_ignore_ascii_case("off") => None,
            Some(v) => v.trim().parse().ok().or(defaults.metrics_addr),
            None => defaults.metrics_addr,
        };

        let orders = OrderConfig {
            order_number_attempts: parsed(&lookup, "ORDER_NUMBER_ATTEMPTS")
                .unwrap_or(defaults.orders.order_number_attempts),
            max_command_attempts: parsed(&lookup, "MAX_COMMAND_ATTEMPTS")
                .unwrap_or(defaults.orders.max_command_attempts),
        };

        let projections = ProcessorConfig {
            batch_size: parsed(&lookup, "PROJECTION_BATCH_SIZE")
                .unwrap_or(defaults.projections.batch_size),
            poll_interval: parsed(&lookup, "PROJECTION_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.projections.poll_interval),
        };

        let notifications = NotificationConfig {
            queue_capacity: parsed(&lookup, "NOTIFICATION_QUEUE_CAPACITY")
                .unwrap_or(defaults.notifications.queue_capacity),
            channel_timeout: parsed(&lookup, "NOTIFICATION_CHANNEL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.notifications.channel_timeout),
            quiet_hours: lookup("QUIET_HOURS_SUPPRESS")
                .and_then(|v| parse_suppressed(&v))
                .unwrap_or(defaults.notifications.quiet_hours),
            utc_offset: parsed(&lookup, "QUIET_HOURS_UTC_OFFSET_MINUTES")
                .and_then(|minutes: i32| FixedOffset::east_opt(minutes * 60))
                .unwrap_or(defaults.notifications.utc_offset),
            ..defaults.notifications
        };

        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            metrics_addr,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            orders,
            projections,
            notifications,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// `None` when any entry is not a channel name.
fn parse_suppressed(value: &str) -> Option<QuietHoursPolicy> {
    let mut policy = QuietHoursPolicy::disabled();
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") {
        return Some(policy);
    }
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let channel = Channel::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))?;
        match channel {
            Channel::Push => policy.suppress_push = true,
            Channel::Email => policy.suppress_email = true,
            Channel::Sms => policy.suppress_sms = true,
        }
    }
    Some(policy)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_addr: Some(SocketAddr::from(([0, 0, 0, 0], 9000))),
            database_url: None,
            database_max_connections: 5,
            orders: OrderConfig::default(),
            projections: ProcessorConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
