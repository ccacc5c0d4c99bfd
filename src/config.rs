//! Application configuration module
//! Handles environment variable loading, configuration validation, and
//! application settings.

use crate::payments::providers::{mpesa::MpesaConfig, pesapal::PesapalConfig};
use crate::services::reconciler::CallbackAuthConfig;
use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: OrderStoreConfig,
    pub mpesa: Option<MpesaConfig>,
    pub pesapal: Option<PesapalConfig>,
    pub mpesa_callbacks: CallbackAuthConfig,
    pub pesapal_callbacks: CallbackAuthConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Order store configuration
#[derive(Debug, Clone)]
pub struct OrderStoreConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            store: OrderStoreConfig::from_env()?,
            mpesa: MpesaConfig::from_env().map_err(|e| ConfigError::InvalidValue(e.to_string()))?,
            pesapal: PesapalConfig::from_env()
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?,
            mpesa_callbacks: CallbackAuthConfig::from_env(
                "MPESA_CALLBACK_IPS",
                "MPESA_CALLBACK_SECRET",
            ),
            pesapal_callbacks: CallbackAuthConfig::from_env(
                "PESAPAL_CALLBACK_IPS",
                "PESAPAL_CALLBACK_SECRET",
            ),
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.store.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("PORT cannot be 0".to_string()));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue("HOST cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl OrderStoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(OrderStoreConfig {
            base_url: env::var("ORDER_STORE_URL")
                .map_err(|_| ConfigError::MissingVariable("ORDER_STORE_URL".to_string()))?,
            service_key: env::var("ORDER_STORE_SERVICE_KEY")
                .map_err(|_| ConfigError::MissingVariable("ORDER_STORE_SERVICE_KEY".to_string()))?,
            timeout_secs: env::var("ORDER_STORE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ORDER_STORE_TIMEOUT_SECS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue("ORDER_STORE_URL".to_string()));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "ORDER_STORE_URL must be a valid URL".to_string(),
            ));
        }

        if self.service_key.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ORDER_STORE_SERVICE_KEY".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "ORDER_STORE_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_requires_http_url() {
        let config = OrderStoreConfig {
            base_url: "store.internal/rest/v1".to_string(),
            service_key: "key".to_string(),
            timeout_secs: 15,
        };

        assert!(config.validate().is_err());

        let config = OrderStoreConfig {
            base_url: "https://store.internal/rest/v1".to_string(),
            service_key: "key".to_string(),
            timeout_secs: 15,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_config_rejects_unknown_level() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Plain,
        };

        assert!(config.validate().is_err());
    }
}
