//! Environment-sourced application configuration.
//!
//! All secrets come from the environment; nothing here is persisted.
//! Missing required variables fail fast at startup with the variable name
//! in the error.

use crate::error::{Result, SplitPayError};

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default platform API scopes requested at install time.
pub const DEFAULT_SHOPIFY_SCOPES: &str = "read_checkouts,write_orders";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Provider secret API key.
    pub stripe_secret_key: String,

    /// Provider publishable key, handed to the widget.
    pub stripe_public_key: String,

    /// Provider webhook signing secret.
    pub stripe_webhook_secret: String,

    /// Platform API key.
    pub shopify_api_key: String,

    /// Platform API shared secret (webhook HMAC + admin tokens).
    pub shopify_api_secret: String,

    /// Platform scopes requested at install.
    pub shopify_scopes: String,

    /// Public base URL of this service.
    pub app_url: String,

    /// HTTP listen port.
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::Config`] naming the first missing or
    /// malformed variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            stripe_secret_key: require("STRIPE_SECRET_KEY")?,
            stripe_public_key: require("STRIPE_PUBLIC_KEY")?,
            stripe_webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            shopify_api_key: require("SHOPIFY_API_KEY")?,
            shopify_api_secret: require("SHOPIFY_API_SECRET")?,
            shopify_scopes: std::env::var("SHOPIFY_SCOPES")
                .unwrap_or_else(|_| DEFAULT_SHOPIFY_SCOPES.to_string()),
            app_url: require("APP_URL")?,
            port: match std::env::var("PORT") {
                Ok(raw) => raw.parse().map_err(|_| {
                    SplitPayError::Config(format!("PORT '{raw}' is not a valid port number"))
                })?,
                Err(_) => DEFAULT_PORT,
            },
        })
    }

    /// Set the database URL (tests).
    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Set the listen port (tests).
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

fn require(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(SplitPayError::Config(format!(
            "missing required environment variable {name}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_names_the_variable() {
        // Use a name no test environment will ever define.
        let err = require("SPLITPAY_DEFINITELY_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("SPLITPAY_DEFINITELY_UNSET_VAR"));
    }
}
