//! Configuration validation.
//!
//! Semantic checks that serde cannot express. All problems are reported at
//! once rather than stopping at the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be at least 2")]
    MaxConnections,

    #[error("buffer.initial_capacity must be at least 4 bytes")]
    InitialCapacity,

    #[error("buffer.max_capacity ({max}) is below buffer.initial_capacity ({initial})")]
    MaxCapacity { initial: usize, max: usize },

    #[error("timeouts.connect_ms must be greater than zero")]
    ConnectTimeout,

    #[error("poll.events_capacity must be greater than zero")]
    EventsCapacity,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections < 2 {
        errors.push(ValidationError::MaxConnections);
    }
    if config.buffer.initial_capacity < 4 {
        errors.push(ValidationError::InitialCapacity);
    }
    if config.buffer.max_capacity < config.buffer.initial_capacity {
        errors.push(ValidationError::MaxCapacity {
            initial: config.buffer.initial_capacity,
            max: config.buffer.max_capacity,
        });
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::ConnectTimeout);
    }
    if config.poll.events_capacity == 0 {
        errors.push(ValidationError::EventsCapacity);
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.buffer.initial_capacity = 4096;
        config.buffer.max_capacity = 1024;
        config.timeouts.connect_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("nowhere".into()),
                ValidationError::MaxCapacity {
                    initial: 4096,
                    max: 1024
                },
                ValidationError::ConnectTimeout,
            ]
        );
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::MetricsAddress("bogus".into())])
        );
    }
}
