use std::{env::var, path::PathBuf, str::FromStr, time::Duration};

use dotenvy::dotenv;
use thiserror::Error;

use crate::{
    application::handlers::{
        document_processor::DocumentProcessingConfig, outbox_dispatcher::OutboxDispatcherConfig,
    },
    infrastructure::messaging::{in_process::InProcessConsumerConfig, jetstream::JetstreamConfig},
};

pub const DEFAULT_CORRELATION_HEADER: &str = "X-Correlation-Id";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} env param is required")]
    Missing(&'static str),
    #[error("{name} env param has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    InProcess,
    Jetstream,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub scheme: String,
    pub host: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub content_root: Option<PathBuf>,
    pub transport: TransportKind,
    pub correlation_header: String,
    pub outbox: OutboxDispatcherConfig,
    pub processing: DocumentProcessingConfig,
    pub in_process: InProcessConsumerConfig,
    pub jetstream: Option<JetstreamConfig>,
}

impl Config {
    pub fn try_parse() -> Result<Config, ConfigError> {
        let _ = dotenv();
        Self::from_lookup(|name| var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let transport = match env.optional_string("TRANSPORT").as_deref() {
            None | Some("in_process") => TransportKind::InProcess,
            Some("jetstream") => TransportKind::Jetstream,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "TRANSPORT",
                    value: other.to_string(),
                    reason: "expected in_process or jetstream".into(),
                });
            }
        };

        let jetstream = match transport {
            TransportKind::InProcess => None,
            TransportKind::Jetstream => Some(JetstreamConfig {
                url: env.required("NATS_URL")?,
                stream: env.string_or("NATS_STREAM", "SHIPMENTS"),
                subject: env.string_or("NATS_SUBJECT", "shipments.documents"),
                durable: env.string_or("NATS_DURABLE", "document-processor"),
                pull_batch: env.positive("NATS_PULL_BATCH", 10)?,
                ack_wait_seconds: env.positive("NATS_ACK_WAIT_SECONDS", 30)?,
                max_deliver: env.positive("NATS_MAX_DELIVER", 5)?,
            }),
        };

        let correlation_header =
            env.string_or("CORRELATION_HEADER", DEFAULT_CORRELATION_HEADER);
        if poem::http::HeaderName::from_bytes(correlation_header.as_bytes()).is_err() {
            return Err(ConfigError::Invalid {
                name: "CORRELATION_HEADER",
                value: correlation_header,
                reason: "not a valid header name".into(),
            });
        }

        Ok(Config {
            port: env.required_parsed("PORT")?,
            scheme: env.required("SCHEME")?,
            host: env.required("HOST")?,
            database_url: env.optional_string("DATABASE_URL"),
            database_max_connections: env.positive("DATABASE_MAX_CONNECTIONS", 10)?,
            content_root: env.optional_string("CONTENT_ROOT").map(PathBuf::from),
            transport,
            correlation_header,
            outbox: OutboxDispatcherConfig {
                enabled: env.parsed("OUTBOX_ENABLED", true)?,
                dispatch_interval: Duration::from_secs(
                    env.positive("OUTBOX_DISPATCH_INTERVAL_SECONDS", 2)?,
                ),
                batch_size: env.positive("OUTBOX_BATCH_SIZE", 50)?,
                lease_duration: Duration::from_secs(env.positive("OUTBOX_LEASE_SECONDS", 30)?),
                retry_cooldown: Duration::from_secs(
                    env.positive("OUTBOX_RETRY_COOLDOWN_SECONDS", 3)?,
                ),
                max_attempts: env.parsed("OUTBOX_MAX_ATTEMPTS", 10)?,
            },
            processing: DocumentProcessingConfig {
                simulated_delay: Duration::from_millis(
                    env.parsed("PROCESSING_SIMULATED_DELAY_MS", 1500)?,
                ),
            },
            in_process: InProcessConsumerConfig {
                max_deliveries: env.positive("PROCESSING_MAX_DELIVERIES", 5)?,
                redelivery_delay: Duration::from_millis(
                    env.parsed("PROCESSING_REDELIVERY_DELAY_MS", 1000)?,
                ),
            },
            jetstream,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional_string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional_string(name).ok_or(ConfigError::Missing(name))
    }

    fn required_parsed<T>(&self, name: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.required(name)?;
        value.parse::<T>().map_err(|err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
            value,
        })
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.optional_string(name)
            .unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional_string(name) {
            None => Ok(default),
            Some(value) => value.parse::<T>().map_err(|err| ConfigError::Invalid {
                name,
                reason: err.to_string(),
                value,
            }),
        }
    }

    /// Parses into the target type directly, so out-of-range values are
    /// rejected rather than truncated.
    fn positive<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialOrd + ToString,
        T::Err: std::fmt::Display,
    {
        let value = self.parsed(name, default)?;
        if value <= T::default() {
            return Err(ConfigError::Invalid {
                name,
                value: value.to_string(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    const BASE: [(&str, &str); 3] = [("PORT", "3000"), ("HOST", "localhost"), ("SCHEME", "http")];

    fn parse(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = BASE
            .iter()
            .chain(vars.iter())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_run_fully_in_memory() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.transport, TransportKind::InProcess);
        assert!(config.database_url.is_none());
        assert!(config.content_root.is_none());
        assert!(config.jetstream.is_none());
        assert!(config.outbox.enabled);
        assert_eq!(config.outbox.dispatch_interval, Duration::from_secs(2));
        assert_eq!(config.outbox.batch_size, 50);
        assert_eq!(config.outbox.lease_duration, Duration::from_secs(30));
        assert_eq!(config.outbox.retry_cooldown, Duration::from_secs(3));
        assert_eq!(config.outbox.max_attempts, 10);
        assert_eq!(config.processing.simulated_delay, Duration::from_millis(1500));
        assert_eq!(config.correlation_header, DEFAULT_CORRELATION_HEADER);
    }

    #[test]
    fn server_settings_are_required() {
        let err = Config::from_lookup(|_| None).unwrap_err();

        assert_eq!(err, ConfigError::Missing("PORT"));
    }

    #[test]
    fn jetstream_requires_url() {
        let err = parse(&[("TRANSPORT", "jetstream")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("NATS_URL"));

        let config = parse(&[("TRANSPORT", "jetstream"), ("NATS_URL", "nats://nats:4222")]).unwrap();
        let jetstream = config.jetstream.unwrap();
        assert_eq!(jetstream.stream, "SHIPMENTS");
        assert_eq!(jetstream.subject, "shipments.documents");
        assert_eq!(jetstream.max_deliver, 5);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = parse(&[("OUTBOX_BATCH_SIZE", "0")]).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { name: "OUTBOX_BATCH_SIZE", .. }));
    }

    #[rstest]
    #[case("OUTBOX_BATCH_SIZE", "4294967296")]
    #[case("DATABASE_MAX_CONNECTIONS", "4294967296")]
    #[case("PROCESSING_MAX_DELIVERIES", "-1")]
    fn out_of_range_values_are_rejected(#[case] name: &'static str, #[case] value: &str) {
        let err = parse(&[(name, value)]).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { name: invalid, .. } if invalid == name));
    }

    #[test]
    fn nats_limits_must_fit_their_types() {
        let jetstream = [("TRANSPORT", "jetstream"), ("NATS_URL", "nats://nats:4222")];

        let err = parse(&[jetstream[0], jetstream[1], ("NATS_MAX_DELIVER", "9223372036854775808")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "NATS_MAX_DELIVER", .. }));

        let err = parse(&[jetstream[0], jetstream[1], ("NATS_MAX_DELIVER", "-5")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "NATS_MAX_DELIVER", .. }));
    }

    #[test]
    fn unparsable_values_are_rejected() {
        assert!(matches!(
            parse(&[("PORT", "http")]).unwrap_err(),
            ConfigError::Invalid { name: "PORT", .. }
        ));
        assert!(matches!(
            parse(&[("TRANSPORT", "kafka")]).unwrap_err(),
            ConfigError::Invalid { name: "TRANSPORT", .. }
        ));
        assert!(matches!(
            parse(&[("CORRELATION_HEADER", "bad header")]).unwrap_err(),
            ConfigError::Invalid { name: "CORRELATION_HEADER", .. }
        ));
    }

    #[test]
    fn zero_max_attempts_means_unbounded() {
        let config = parse(&[("OUTBOX_MAX_ATTEMPTS", "0"), ("OUTBOX_ENABLED", "false")]).unwrap();

        assert_eq!(config.outbox.max_attempts, 0);
        assert!(!config.outbox.enabled);
    }
}
