use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// Immutable after creation; the process refuses to start on an empty
/// credential or empty target identifiers.
#[derive(Clone, Debug)]
pub struct Config {
    /// Credential token used to authenticate the gateway session.
    pub token: String,
    /// Identifier of the group containing the target channel.
    pub group_id: String,
    /// Identifier of the channel to stay joined to.
    pub channel_id: String,
    /// Gateway endpoint the session client connects to.
    pub gateway_url: String,
    /// Base delay for the reconnect backoff, and the fixed login retry
    /// interval.
    pub reconnect_base_delay: Duration,
    /// Failed attempts tolerated before escalating to a process restart.
    pub max_reconnect_attempts: u32,
    /// Interval between health audits of the session and connection.
    pub health_check_interval: Duration,
    /// Port the liveness endpoint listens on.
    pub liveness_port: u16,
    pub log_level: Level,
}

fn require_non_empty(name: &str) -> Result<String, ConfigError> {
    let value = std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must not be empty".to_string(),
        ));
    }
    Ok(value)
}

fn parse_or_default<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{}' is not a valid number", raw))
        }),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let token = require_non_empty("TETHER_TOKEN")?;
        let group_id = require_non_empty("TETHER_GROUP_ID")?;
        let channel_id = require_non_empty("TETHER_CHANNEL_ID")?;

        let gateway_url = match std::env::var("GATEWAY_URL") {
            Err(_) => "wss://gateway.tether.dev/v1".to_string(),
            Ok(raw) if raw.trim().is_empty() => {
                return Err(ConfigError::InvalidValue(
                    "GATEWAY_URL".to_string(),
                    "must not be empty".to_string(),
                ));
            }
            Ok(raw) => raw,
        };

        let reconnect_base_delay =
            Duration::from_millis(parse_or_default("RECONNECT_BASE_DELAY_MS", 1000u64)?);
        let max_reconnect_attempts = parse_or_default("MAX_RECONNECT_ATTEMPTS", 10u32)?;
        let health_check_interval =
            Duration::from_millis(parse_or_default("HEALTH_CHECK_INTERVAL_MS", 60_000u64)?);
        let liveness_port = parse_or_default("LIVENESS_PORT", 3000u16)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            token,
            group_id,
            channel_id,
            gateway_url,
            reconnect_base_delay,
            max_reconnect_attempts,
            health_check_interval,
            liveness_port,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("TETHER_TOKEN");
            env::remove_var("TETHER_GROUP_ID");
            env::remove_var("TETHER_CHANNEL_ID");
            env::remove_var("GATEWAY_URL");
            env::remove_var("RECONNECT_BASE_DELAY_MS");
            env::remove_var("MAX_RECONNECT_ATTEMPTS");
            env::remove_var("HEALTH_CHECK_INTERVAL_MS");
            env::remove_var("LIVENESS_PORT");
            env::remove_var("RUST_LOG");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("TETHER_TOKEN", "test-token");
            env::set_var("TETHER_GROUP_ID", "group-1");
            env::set_var("TETHER_CHANNEL_ID", "channel-1");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.token, "test-token");
        assert_eq!(config.group_id, "group-1");
        assert_eq!(config.channel_id, "channel-1");
        assert_eq!(config.gateway_url, "wss://gateway.tether.dev/v1");
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(1000));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.health_check_interval, Duration::from_millis(60_000));
        assert_eq!(config.liveness_port, 3000);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("GATEWAY_URL", "wss://gateway.example.com/v2");
            env::set_var("RECONNECT_BASE_DELAY_MS", "250");
            env::set_var("MAX_RECONNECT_ATTEMPTS", "3");
            env::set_var("HEALTH_CHECK_INTERVAL_MS", "5000");
            env::set_var("LIVENESS_PORT", "8080");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.gateway_url, "wss://gateway.example.com/v2");
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.health_check_interval, Duration::from_millis(5000));
        assert_eq!(config.liveness_port, 8080);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_token() {
        clear_env_vars();
        unsafe {
            env::set_var("TETHER_GROUP_ID", "group-1");
            env::set_var("TETHER_CHANNEL_ID", "channel-1");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "TETHER_TOKEN"),
            _ => panic!("Expected MissingVar for TETHER_TOKEN"),
        }
    }

    #[test]
    #[serial]
    fn test_config_empty_identifier_rejected() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("TETHER_CHANNEL_ID", "   ");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "TETHER_CHANNEL_ID"),
            _ => panic!("Expected InvalidValue for TETHER_CHANNEL_ID"),
        }
    }

    #[test]
    #[serial]
    fn test_config_empty_gateway_url_rejected() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("GATEWAY_URL", "  ");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "GATEWAY_URL"),
            _ => panic!("Expected InvalidValue for GATEWAY_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_port() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("LIVENESS_PORT", "not-a-port");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "LIVENESS_PORT"),
            _ => panic!("Expected InvalidValue for LIVENESS_PORT"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
