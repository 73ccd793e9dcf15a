use std::time::Duration;

use confab_common::{Error, Result};

/// Runtime configuration for one hub node, assembled by the CLI.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    /// Pre-shared HMAC secret the auth service signs tokens with.
    pub secret: String,
    /// Pub/sub fabric address; None runs the node in single-node mode.
    pub broker_url: Option<String>,
    /// Refuse to start when the broker cannot be reached.
    pub broker_required: bool,
    pub broker_connect_attempts: u32,
    pub broker_connect_delay: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8001,
            secret: String::new(),
            broker_url: None,
            broker_required: false,
            broker_connect_attempts: 5,
            broker_connect_delay: Duration::from_secs(2),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(Error::message("JWT_SECRET must be set"));
        }
        if self.broker_required && self.broker_url.is_none() {
            return Err(Error::message(
                "broker marked required but no broker url configured",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> HubConfig {
        HubConfig {
            secret: "s3cret".into(),
            ..HubConfig::default()
        }
    }

    #[test]
    fn default_config_is_single_node() {
        let config = HubConfig::default();
        assert!(config.broker_url.is_none());
        assert!(!config.broker_required);
        assert_eq!(config.port, 8001);
    }

    #[test]
    fn validate_requires_secret() {
        assert!(HubConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_required_broker_without_url() {
        let config = HubConfig {
            broker_required: true,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = HubConfig {
            broker_required: true,
            broker_url: Some("redis://127.0.0.1:6379".into()),
            ..valid()
        };
        assert!(config.validate().is_ok());
    }
}
