//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable                  | Default        |
//! |---------------------------|----------------|
//! | `LISTEN_ADDR`             | `0.0.0.0:3000` |
//! | `JWT_SECRET`              | required       |
//! | `JWT_ISSUER`              | unset          |
//! | `HANDSHAKE_TIMEOUT_SECS`  | `10`           |
//! | `EVENT_BUS_CAPACITY`      | `10000`        |
//! | `CONNECTION_BUFFER`       | `256`          |
//! | `PING_INTERVAL_SECS`      | `30`           |
//! | `INTERNAL_API_KEY`        | unset          |
//! | `LOG_FORMAT`              | `pretty`       |
//! | `REQUEST_TIMEOUT_SECS`    | `30`           |

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

/// Log output flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, coloured.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`RealtimeConfig::from_env`].
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,

    /// Expected `iss` claim, if tokens must carry one.
    pub jwt_issuer: Option<String>,

    /// Upper bound for credential verification, in seconds.
    pub handshake_timeout_secs: u64,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Outbound frames buffered per connection before it counts as slow.
    pub connection_buffer: usize,

    /// Seconds between server pings.
    pub ping_interval_secs: u64,

    /// Shared key required on `POST /api/v1/events` when set.
    pub internal_api_key: Option<String>,

    /// Log output flavour.
    pub log_format: LogFormat,

    /// Timeout applied to REST requests, in seconds.
    pub request_timeout_secs: u64,
}

impl RealtimeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults for everything except `JWT_SECRET`.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `JWT_SECRET` is missing or empty, or if
    /// `LISTEN_ADDR` is set but cannot be parsed as a [`SocketAddr`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .context("LISTEN_ADDR is not a socket address")?;

        let jwt_secret = non_empty_env("JWT_SECRET").context("JWT_SECRET must be set")?;

        Ok(Self {
            listen_addr,
            jwt_secret,
            jwt_issuer: non_empty_env("JWT_ISSUER"),
            handshake_timeout_secs: parse_env("HANDSHAKE_TIMEOUT_SECS", 10),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", 10_000),
            connection_buffer: parse_env("CONNECTION_BUFFER", 256),
            ping_interval_secs: parse_env("PING_INTERVAL_SECS", 30),
            internal_api_key: non_empty_env("INTERNAL_API_KEY"),
            log_format: LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref()),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30),
        })
    }

    /// Default configuration around `secret`, bound to an ephemeral
    /// loopback port.
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: secret.into(),
            jwt_issuer: None,
            handshake_timeout_secs: 10,
            event_bus_capacity: 10_000,
            connection_buffer: 256,
            ping_interval_secs: 30,
            internal_api_key: None,
            log_format: LogFormat::Pretty,
            request_timeout_secs: 30,
        }
    }

    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Ping interval as a [`Duration`]; never zero.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// REST request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("listen_addr", &self.listen_addr)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .field("event_bus_capacity", &self.event_bus_capacity)
            .field("connection_buffer", &self.connection_buffer)
            .field("ping_interval_secs", &self.ping_interval_secs)
            .field(
                "internal_api_key",
                &self.internal_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("log_format", &self.log_format)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Reads an environment variable, treating blank values as unset.
fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some("yaml")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(None), LogFormat::Pretty);
    }

    #[test]
    fn defaults_with_secret() {
        let config = RealtimeConfig::with_secret("s3cret");
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.event_bus_capacity, 10_000);
        assert_eq!(config.connection_buffer, 256);
        assert_eq!(config.listen_addr.port(), 0);
        assert!(config.internal_api_key.is_none());
    }

    #[test]
    fn ping_interval_is_never_zero() {
        let mut config = RealtimeConfig::with_secret("s");
        config.ping_interval_secs = 0;
        assert_eq!(config.ping_interval(), Duration::from_secs(1));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = RealtimeConfig::with_secret("top-secret-value");
        config.internal_api_key = Some("ingest-key".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("top-secret-value"));
        assert!(!rendered.contains("ingest-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        let value: u64 = parse_env("PULSE_GATEWAY_TEST_UNSET_KEY", 7);
        assert_eq!(value, 7);
        assert!(non_empty_env("PULSE_GATEWAY_TEST_UNSET_KEY").is_none());
    }
}
