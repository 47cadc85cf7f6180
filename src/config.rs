//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `SITE_URL` | `http://localhost:3000` |
//! | `SESSION_TTL_SECONDS` | `3600` |
//! | `SIGNIN_MAX_FAILURES` | `5` |
//! | `TODO_STORE_FAILURE_RATE` | `0.0` |
//! | `TODO_STORE_DELAY_MS` | `0` |
//! | `RNG_SEED` | unset |

use thiserror::Error;

use crate::api::AppConfig;
use crate::infrastructure::{FailInjectionConfig, FailInjectionError, IdentitySettings};

// =============================================================================
// Config Error
// =============================================================================

/// Errors that can occur while reading configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("Invalid {name}: {message} (got '{value}')")]
    InvalidValue {
        name: String,
        message: String,
        value: String,
    },

    /// A variable parsed but is out of range.
    #[error("Invalid {name}: {message}")]
    OutOfRange { name: String, message: String },

    #[error(transparent)]
    FailInjection(#[from] FailInjectionError),
}

// =============================================================================
// Server Config
// =============================================================================

/// Everything `main` needs to start the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub app: AppConfig,
    pub identity: IdentitySettings,
    pub fail_injection: FailInjectionConfig,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable or
    /// out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = EnvReader { lookup: &lookup };

        let session_ttl_seconds = env.parse("SESSION_TTL_SECONDS", 3600_i64)?;
        if session_ttl_seconds <= 0 {
            return Err(ConfigError::OutOfRange {
                name: "SESSION_TTL_SECONDS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        let max_failed_signins = env.parse("SIGNIN_MAX_FAILURES", 5_u32)?;
        if max_failed_signins == 0 {
            return Err(ConfigError::OutOfRange {
                name: "SIGNIN_MAX_FAILURES".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let fail_injection = FailInjectionConfig {
            failure_rate: env.parse("TODO_STORE_FAILURE_RATE", 0.0_f64)?,
            delay_ms: env.parse("TODO_STORE_DELAY_MS", 0_u64)?,
            seed: env.parse_optional("RNG_SEED")?,
        };
        fail_injection.validate()?;

        let session_ttl = chrono::Duration::seconds(session_ttl_seconds);
        let defaults = IdentitySettings::default();
        let identity = IdentitySettings {
            session_ttl,
            refresh_window: defaults.refresh_window.min(session_ttl / 2),
            max_failed_signins,
            ..defaults
        };

        Ok(Self {
            host: env.string("HOST", "0.0.0.0"),
            port: env.parse("PORT", 3000_u16)?,
            app: AppConfig {
                site_url: env.string("SITE_URL", &AppConfig::default().site_url),
            },
            identity,
            fail_injection,
        })
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn value(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.value(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_optional(name)?.unwrap_or(default))
    }

    fn parse_optional<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.value(name)
            .map(|value| {
                value.parse().map_err(|error: T::Err| ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: error.to_string(),
                    value,
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        ServerConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[rstest]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.app.site_url, "http://localhost:3000");
        assert_eq!(config.identity, IdentitySettings::default());
        assert!(!config.fail_injection.is_enabled());
    }

    #[rstest]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("SITE_URL", "https://todo.example.com"),
            ("SESSION_TTL_SECONDS", "600"),
            ("TODO_STORE_FAILURE_RATE", "0.25"),
            ("RNG_SEED", "42"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.app.site_url, "https://todo.example.com");
        assert_eq!(config.identity.session_ttl, chrono::Duration::minutes(10));
        assert_eq!(config.identity.refresh_window, chrono::Duration::minutes(5));
        assert_eq!(config.fail_injection.seed, Some(42));
        assert!(config.fail_injection.is_enabled());
    }

    #[rstest]
    #[case("PORT", "eighty")]
    #[case("RNG_SEED", "-1")]
    #[case("TODO_STORE_DELAY_MS", "1.5")]
    fn test_unparsable_values(#[case] name: &str, #[case] value: &str) {
        let error = config_from(&[(name, value)]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { name: ref found, .. } if found == name));
    }

    #[rstest]
    #[case("SESSION_TTL_SECONDS", "0")]
    #[case("SIGNIN_MAX_FAILURES", "0")]
    fn test_out_of_range_values(#[case] name: &str, #[case] value: &str) {
        assert!(matches!(
            config_from(&[(name, value)]),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[rstest]
    fn test_failure_rate_above_one_rejected() {
        assert_eq!(
            config_from(&[("TODO_STORE_FAILURE_RATE", "1.5")]),
            Err(ConfigError::FailInjection(
                FailInjectionError::InvalidFailureRate(1.5)
            ))
        );
    }
}
