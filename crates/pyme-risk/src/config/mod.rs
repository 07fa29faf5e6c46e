use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::credit::analysis::BreakerConfig;
use crate::workflows::credit::orchestrator::EvaluationSettings;
use crate::workflows::credit::scoring::{RiskBands, ScoringConfig, ScoringWeights};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub credit: CreditConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            credit: CreditConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Scoring policy and evaluation limits.
///
/// Values are parsed here; the scoring engine validates them at startup.
#[derive(Debug, Clone, Default)]
pub struct CreditConfig {
    pub scoring: ScoringConfig,
    pub evaluation: EvaluationSettings,
    pub breaker: BreakerConfig,
}

impl CreditConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scoring_defaults = ScoringConfig::default();
        let evaluation_defaults = EvaluationSettings::default();
        let breaker_defaults = BreakerConfig::default();

        let scoring = ScoringConfig {
            weights: ScoringWeights {
                financial: parse_var(
                    "CREDIT_WEIGHT_FINANCIAL",
                    scoring_defaults.weights.financial,
                )?,
                reputational: parse_var(
                    "CREDIT_WEIGHT_REPUTATIONAL",
                    scoring_defaults.weights.reputational,
                )?,
                behavioral: parse_var(
                    "CREDIT_WEIGHT_BEHAVIORAL",
                    scoring_defaults.weights.behavioral,
                )?,
            },
            bands: RiskBands {
                high_risk_below: parse_var(
                    "CREDIT_RISK_HIGH_BELOW",
                    scoring_defaults.bands.high_risk_below,
                )?,
                low_risk_above: parse_var(
                    "CREDIT_RISK_LOW_ABOVE",
                    scoring_defaults.bands.low_risk_above,
                )?,
            },
            neutral_baseline: scoring_defaults.neutral_baseline,
            confidence_threshold: parse_var(
                "CREDIT_CONFIDENCE_THRESHOLD",
                scoring_defaults.confidence_threshold,
            )?,
        };

        let evaluation = EvaluationSettings {
            agent_timeout: Duration::from_secs(parse_var(
                "CREDIT_AGENT_TIMEOUT_SECS",
                evaluation_defaults.agent_timeout.as_secs(),
            )?),
            transport_retries: parse_var(
                "CREDIT_TRANSPORT_RETRIES",
                evaluation_defaults.transport_retries,
            )?,
            max_field_bytes: parse_var(
                "CREDIT_MAX_FIELD_BYTES",
                evaluation_defaults.max_field_bytes,
            )?,
            retained_evaluations: parse_var(
                "CREDIT_MAX_RETAINED_EVALUATIONS",
                evaluation_defaults.retained_evaluations,
            )?,
            retained_scenarios: parse_var(
                "CREDIT_MAX_RETAINED_SCENARIOS",
                evaluation_defaults.retained_scenarios,
            )?,
        };
        if evaluation.agent_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "CREDIT_AGENT_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        let breaker = BreakerConfig {
            failure_threshold: parse_var(
                "CREDIT_BREAKER_FAILURE_THRESHOLD",
                breaker_defaults.failure_threshold,
            )?,
            cooldown: Duration::from_secs(parse_var(
                "CREDIT_BREAKER_COOLDOWN_SECS",
                breaker_defaults.cooldown.as_secs(),
            )?),
        };

        Ok(Self {
            scoring,
            evaluation,
            breaker,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::credit::scoring::{ConfigurationError, ScoringEngine};
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const CREDIT_VARS: [&str; 13] = [
        "CREDIT_WEIGHT_FINANCIAL",
        "CREDIT_WEIGHT_REPUTATIONAL",
        "CREDIT_WEIGHT_BEHAVIORAL",
        "CREDIT_RISK_HIGH_BELOW",
        "CREDIT_RISK_LOW_ABOVE",
        "CREDIT_CONFIDENCE_THRESHOLD",
        "CREDIT_AGENT_TIMEOUT_SECS",
        "CREDIT_TRANSPORT_RETRIES",
        "CREDIT_MAX_FIELD_BYTES",
        "CREDIT_MAX_RETAINED_EVALUATIONS",
        "CREDIT_MAX_RETAINED_SCENARIOS",
        "CREDIT_BREAKER_FAILURE_THRESHOLD",
        "CREDIT_BREAKER_COOLDOWN_SECS",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        for name in CREDIT_VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.credit.scoring, ScoringConfig::default());
        assert_eq!(config.credit.evaluation.agent_timeout, Duration::from_secs(30));
        assert_eq!(config.credit.evaluation.transport_retries, 1);
        assert_eq!(config.credit.breaker.failure_threshold, 5);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_credit_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CREDIT_WEIGHT_FINANCIAL", "0.5");
        env::set_var("CREDIT_WEIGHT_REPUTATIONAL", "0.25");
        env::set_var("CREDIT_WEIGHT_BEHAVIORAL", "0.25");
        env::set_var("CREDIT_AGENT_TIMEOUT_SECS", "5");
        env::set_var("CREDIT_RISK_LOW_ABOVE", "700");
        env::set_var("CREDIT_MAX_RETAINED_EVALUATIONS", "500");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.credit.scoring.weights.financial, 0.5);
        assert_eq!(config.credit.scoring.bands.low_risk_above, 700);
        assert_eq!(config.credit.evaluation.agent_timeout, Duration::from_secs(5));
        assert_eq!(config.credit.evaluation.retained_evaluations, 500);
        assert_eq!(config.credit.evaluation.retained_scenarios, 10_000);
        ScoringEngine::new(config.credit.scoring).expect("weights sum to one");
        reset_env();
    }

    #[test]
    fn weights_not_summing_to_one_fail_at_engine_construction() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CREDIT_WEIGHT_FINANCIAL", "0.7");

        let config = AppConfig::load().expect("values parse");
        let err = ScoringEngine::new(config.credit.scoring).expect_err("weights sum to 1.1");
        assert!(matches!(err, ConfigurationError::WeightsDoNotSumToOne { .. }));
        reset_env();
    }

    #[test]
    fn rejects_unparseable_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CREDIT_TRANSPORT_RETRIES", "twice");

        let err = AppConfig::load().expect_err("retries must be numeric");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "CREDIT_TRANSPORT_RETRIES",
                ..
            }
        ));
        reset_env();
    }
}
