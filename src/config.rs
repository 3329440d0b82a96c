//! Provider configuration.
//!
//! The host sends the provider block as JSON on `configure`. Attributes left
//! null fall back to `PORT_*` environment variables.

use std::fmt;

use serde::Deserialize;

use crate::client::{PortClient, DEFAULT_BASE_URL};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::value::Tristate;

pub const ENV_CLIENT_ID: &str = "PORT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "PORT_CLIENT_SECRET";
pub const ENV_TOKEN: &str = "PORT_TOKEN";
pub const ENV_BASE_URL: &str = "PORT_BASE_URL";
pub const ENV_BETA_FEATURES_ENABLED: &str = "PORT_BETA_FEATURES_ENABLED";

/// The provider block as declared.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: Tristate<String>,
    pub secret: Tristate<String>,
    pub token: Tristate<String>,
    pub base_url: Tristate<String>,
    pub json_escape_html: Tristate<bool>,
    pub beta_features_enabled: Tristate<bool>,
}

/// How the client authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    ClientSecret { client_id: String, secret: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::ClientSecret { client_id, .. } => f
                .debug_struct("ClientSecret")
                .field("client_id", client_id)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Configuration after environment fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub credentials: Credentials,
    pub json_escape_html: bool,
    pub beta_features_enabled: bool,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Tristate<String>| v.is_known().then_some("<redacted>");
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("secret", &redacted(&self.secret))
            .field("token", &redacted(&self.token))
            .field("base_url", &self.base_url)
            .field("json_escape_html", &self.json_escape_html)
            .field("beta_features_enabled", &self.beta_features_enabled)
            .finish()
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ProviderError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(ProviderError::Configuration(format!(
            "{} must be true or false, got \"{}\"",
            name, raw
        ))),
    }
}

impl ProviderConfig {
    /// Decode the host's provider block.
    pub fn from_value(config: serde_json::Value) -> Result<Self, ProviderError> {
        if config.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(config)?)
    }

    /// Apply environment fallbacks read through `lookup`.
    pub fn resolve(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedConfig, ProviderError> {
        let string = |value: &Tristate<String>, env: &str| {
            value.cloned().or_else(|| lookup(env)).filter(|v| !v.is_empty())
        };

        let credentials = match (
            string(&self.token, ENV_TOKEN),
            string(&self.client_id, ENV_CLIENT_ID),
            string(&self.secret, ENV_CLIENT_SECRET),
        ) {
            (Some(token), _, _) => Credentials::Token(token),
            (None, Some(client_id), Some(secret)) => Credentials::ClientSecret { client_id, secret },
            _ => {
                return Err(ProviderError::Configuration(format!(
                    "either token or client_id and secret must be set (or {}, {}/{})",
                    ENV_TOKEN, ENV_CLIENT_ID, ENV_CLIENT_SECRET
                )));
            },
        };

        let beta_features_enabled = match self.beta_features_enabled.known() {
            Some(enabled) => *enabled,
            None => match lookup(ENV_BETA_FEATURES_ENABLED) {
                Some(raw) => parse_bool(ENV_BETA_FEATURES_ENABLED, &raw)?,
                None => false,
            },
        };

        Ok(ResolvedConfig {
            base_url: string(&self.base_url, ENV_BASE_URL)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            credentials,
            json_escape_html: self.json_escape_html.unwrap_or(true),
            beta_features_enabled,
        })
    }

    /// Resolve against the process environment.
    pub fn resolve_from_env(&self) -> Result<ResolvedConfig, ProviderError> {
        self.resolve(|name| std::env::var(name).ok())
    }
}

impl ResolvedConfig {
    /// Build the REST client.
    pub fn client(&self) -> Result<PortClient, ProviderError> {
        match &self.credentials {
            Credentials::Token(token) => PortClient::with_token(&self.base_url, token.clone()),
            Credentials::ClientSecret { client_id, secret } => {
                PortClient::with_client_secret(&self.base_url, client_id.clone(), secret.clone())
            },
        }
    }
}

/// Schema of the provider block.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("Port developer portal")
        .with_attribute(
            "client_id",
            Attribute::optional_string()
                .with_description("Client id; falls back to PORT_CLIENT_ID"),
        )
        .with_attribute(
            "secret",
            Attribute::optional_string()
                .sensitive()
                .with_description("Client secret; falls back to PORT_CLIENT_SECRET"),
        )
        .with_attribute(
            "token",
            Attribute::optional_string()
                .sensitive()
                .with_description("Pre-issued access token; falls back to PORT_TOKEN"),
        )
        .with_attribute(
            "base_url",
            Attribute::optional_string()
                .with_description("API endpoint; falls back to PORT_BASE_URL"),
        )
        .with_attribute("json_escape_html", Attribute::defaulted_bool(true))
        .with_attribute("beta_features_enabled", Attribute::optional_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_fallbacks() {
        let config = ProviderConfig::from_value(json!({"client_id": "abc"})).unwrap();
        let resolved = config
            .resolve(env(&[
                (ENV_CLIENT_ID, "ignored"),
                (ENV_CLIENT_SECRET, "s3cret"),
                (ENV_BASE_URL, "https://api.us.getport.io"),
                (ENV_BETA_FEATURES_ENABLED, "true"),
            ]))
            .unwrap();

        assert_eq!(
            resolved.credentials,
            Credentials::ClientSecret {
                client_id: "abc".to_string(),
                secret: "s3cret".to_string()
            }
        );
        assert_eq!(resolved.base_url, "https://api.us.getport.io");
        assert!(resolved.beta_features_enabled);
        assert!(resolved.json_escape_html);
    }

    #[test]
    fn test_token_wins_and_defaults() {
        let config = ProviderConfig::from_value(json!({
            "token": "tok",
            "client_id": "abc",
            "json_escape_html": false
        }))
        .unwrap();
        let resolved = config.resolve(env(&[])).unwrap();
        assert_eq!(resolved.credentials, Credentials::Token("tok".to_string()));
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
        assert!(!resolved.json_escape_html);
        assert!(!resolved.beta_features_enabled);
    }

    #[test]
    fn test_missing_credentials() {
        let config = ProviderConfig::from_value(json!({"client_id": "abc"})).unwrap();
        let err = config.resolve(env(&[])).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_bad_beta_flag() {
        let config = ProviderConfig::from_value(json!({"token": "tok"})).unwrap();
        assert!(config
            .resolve(env(&[(ENV_BETA_FEATURES_ENABLED, "maybe")]))
            .is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ProviderConfig::from_value(json!({
            "client_id": "abc",
            "secret": "s3cret",
            "token": "tok"
        }))
        .unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("s3cret"));
        assert!(!printed.contains("tok\""));

        let resolved = config.resolve(env(&[])).unwrap();
        assert!(!format!("{:?}", resolved).contains("tok\""));
    }
}
