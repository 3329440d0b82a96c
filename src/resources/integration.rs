//! `port_integration`: an integration installation. Beta.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{
    decode, encode, found, require, with_changelog, ChangelogBlocks, Context, Resource,
};
use crate::api;
use crate::canonical::{parse_json, Canonicalizer};
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema, Validator};
use crate::value::Tristate;

pub const INSTALLATION_ID_PATTERN: &str = "^[a-z0-9_-]+$";

/// State of a `port_integration`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationState {
    pub id: Tristate<String>,
    pub installation_id: Tristate<String>,
    pub title: Tristate<String>,
    pub version: Tristate<String>,
    pub installation_app_type: Tristate<String>,
    /// Canonical JSON text.
    pub config: Tristate<String>,
    #[serde(flatten)]
    pub changelog: ChangelogBlocks,
}

impl IntegrationState {
    pub fn to_wire(&self) -> Result<api::Integration, ProviderError> {
        Ok(api::Integration {
            installation_id: require(&self.installation_id, "installation_id")?.to_string(),
            title: self.title.cloned(),
            version: self.version.cloned(),
            installation_app_type: self.installation_app_type.cloned(),
            config: self
                .config
                .known()
                .map(|raw| parse_json("config", raw))
                .transpose()?,
            changelog_destination: self.changelog.to_wire()?,
        })
    }

    pub fn refresh(remote: &api::Integration, json: &Canonicalizer) -> Result<Self, ProviderError> {
        let config = match &remote.config {
            Some(config) if !config.is_null() => Tristate::Known(json.render(config)?),
            _ => Tristate::Null,
        };
        Ok(Self {
            id: Tristate::Known(remote.installation_id.clone()),
            installation_id: Tristate::Known(remote.installation_id.clone()),
            title: Tristate::from_option(remote.title.clone()),
            version: Tristate::from_option(remote.version.clone()),
            installation_app_type: Tristate::from_option(remote.installation_app_type.clone()),
            config,
            changelog: ChangelogBlocks::from_wire(&remote.changelog_destination),
        })
    }
}

fn ensure_beta(ctx: &Context) -> Result<(), ProviderError> {
    if ctx.beta_features_enabled {
        Ok(())
    } else {
        Err(ProviderError::FailedPrecondition(
            "port_integration is a beta resource; set beta_features_enabled = true in the provider configuration (or PORT_BETA_FEATURES_ENABLED=true)"
                .to_string(),
        ))
    }
}

/// Controller for `port_integration`.
#[derive(Debug, Default)]
pub struct IntegrationResource;

#[async_trait]
impl Resource for IntegrationResource {
    fn type_name(&self) -> &'static str {
        "port_integration"
    }

    fn schema(&self) -> Schema {
        with_changelog(
            Schema::v0()
                .with_description("An integration installation (beta)")
                .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
                .with_attribute(
                    "installation_id",
                    Attribute::required_string()
                        .with_force_new()
                        .with_validator(Validator::Regex {
                            pattern: INSTALLATION_ID_PATTERN.to_string(),
                            message: "installation_id may contain only lowercase letters, digits, '_' and '-'"
                                .to_string(),
                        }),
                )
                .with_attribute("title", Attribute::optional_string())
                .with_attribute("version", Attribute::optional_string())
                .with_attribute("installation_app_type", Attribute::optional_string())
                .with_attribute("config", Attribute::optional_string().json()),
        )
    }

    #[instrument(skip_all, fields(resource_type = "port_integration"))]
    async fn create(&self, ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        ensure_beta(ctx)?;
        let mut state: IntegrationState = decode(planned)?;
        let created = ctx.api.create_integration(&state.to_wire()?).await?;
        info!(installation_id = %created.installation_id, "created integration");
        state.id = Tristate::Known(created.installation_id);
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_integration"))]
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError> {
        ensure_beta(ctx)?;
        let prior: IntegrationState = decode(state)?;
        let installation_id = require(&prior.installation_id, "installation_id")?;
        let Some(remote) = found(ctx.api.read_integration(installation_id).await)? else {
            warn!(installation_id = %installation_id, "integration no longer exists, dropping from state");
            return Ok(None);
        };
        encode(&IntegrationState::refresh(&remote, &ctx.json)?).map(Some)
    }

    #[instrument(skip_all, fields(resource_type = "port_integration"))]
    async fn update(
        &self,
        ctx: &Context,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        ensure_beta(ctx)?;
        let mut state: IntegrationState = decode(planned)?;
        let body = state.to_wire()?;
        let updated = ctx.api.update_integration(&body.installation_id, &body).await?;
        info!(installation_id = %updated.installation_id, "updated integration");
        state.id = Tristate::Known(updated.installation_id);
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_integration"))]
    async fn delete(&self, ctx: &Context, state: Value) -> Result<(), ProviderError> {
        ensure_beta(ctx)?;
        let state: IntegrationState = decode(state)?;
        let installation_id = require(&state.installation_id, "installation_id")?;
        if found(ctx.api.delete_integration(installation_id).await)?.is_none() {
            warn!(installation_id = %installation_id, "integration already deleted");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = "port_integration"))]
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError> {
        ensure_beta(ctx)?;
        let remote = ctx.api.read_integration(id).await?;
        encode(&IntegrationState::refresh(&remote, &ctx.json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryPortal;
    use serde_json::json;

    fn github_app() -> Value {
        json!({
            "installation_id": "my-github-app",
            "title": "GitHub",
            "installation_app_type": "GITHUB",
            "config": "{\"resources\":[{\"kind\":\"repository\"}],\"deleteDependentEntities\":true}",
            "webhook_changelog_destination": {"url": "https://hook"}
        })
    }

    #[tokio::test]
    async fn test_requires_beta_flag() {
        let portal = InMemoryPortal::new();
        let mut ctx = portal.context();
        ctx.beta_features_enabled = false;

        let err = IntegrationResource.create(&ctx, github_app()).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(portal.integration("my-github-app").is_none());
    }

    #[tokio::test]
    async fn test_create_patch_and_canonical_config() {
        let portal = InMemoryPortal::new();
        let ctx = portal.context();

        let created = IntegrationResource.create(&ctx, github_app()).await.unwrap();
        let read = IntegrationResource.read(&ctx, created.clone()).await.unwrap().unwrap();
        assert_eq!(
            read["config"],
            json!(r#"{"deleteDependentEntities":true,"resources":[{"kind":"repository"}]}"#)
        );
        assert_eq!(read["webhook_changelog_destination"]["url"], json!("https://hook"));

        let mut planned = read.clone();
        planned["title"] = json!("GitHub App");
        IntegrationResource.update(&ctx, read, planned).await.unwrap();
        assert_eq!(
            portal.integration("my-github-app").unwrap().title.as_deref(),
            Some("GitHub App")
        );
        assert!(portal
            .requests()
            .iter()
            .any(|r| r == "PATCH /v1/integration/my-github-app"));
    }

    #[tokio::test]
    async fn test_malformed_config_rejected() {
        let portal = InMemoryPortal::new();
        let mut planned = github_app();
        planned["config"] = json!("{not json");
        let err = IntegrationResource
            .create(&portal.context(), planned)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidJson { .. }));
    }
}
