//! Resource controllers.
//!
//! Each Portal object kind implements [`Resource`]: a thin sequencer that
//! decodes host state, projects it to the wire, calls [`PortApi`] and refreshes
//! state from the response. [`PortProvider`](crate::PortProvider) dispatches to
//! them by type name.

pub mod action;
pub mod action_permissions;
pub mod aggregation_properties;
pub mod blueprint;
pub mod entity;
pub mod integration;
pub mod system_blueprint;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::api;
use crate::canonical::Canonicalizer;
use crate::client::PortApi;
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use crate::value::{Marker, Tristate};

pub use action::ActionResource;
pub use action_permissions::ActionPermissionsResource;
pub use aggregation_properties::AggregationPropertiesResource;
pub use blueprint::BlueprintResource;
pub use entity::EntityResource;
pub use integration::IntegrationResource;
pub use system_blueprint::SystemBlueprintResource;

/// Everything a controller needs for one operation.
#[derive(Clone)]
pub struct Context {
    /// The Portal client.
    pub api: Arc<dyn PortApi>,
    /// Canonical JSON rendering for JSON-text attributes.
    pub json: Canonicalizer,
    /// Whether beta resources may be used.
    pub beta_features_enabled: bool,
    /// Delay between migration polls.
    pub poll_interval: Duration,
    /// Flips to `true` when the host stops the provider.
    pub cancel: watch::Receiver<bool>,
}

/// CRUD and import for one resource type.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Host-facing type name, e.g. `port_blueprint`.
    fn type_name(&self) -> &'static str;

    /// Declarative schema of the resource.
    fn schema(&self) -> Schema;

    /// Create the remote object and return the new state.
    async fn create(&self, ctx: &Context, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state from the Portal. `None` drops the resource from state.
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError>;

    /// Apply planned changes and return the new state.
    async fn update(
        &self,
        ctx: &Context,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, ctx: &Context, state: Value) -> Result<(), ProviderError>;

    /// Build state for an existing remote object.
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError>;
}

/// A read-only data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Host-facing type name, e.g. `port_search`.
    fn type_name(&self) -> &'static str;

    /// Declarative schema of the data source.
    fn schema(&self) -> Schema;

    /// Resolve the configuration into state.
    async fn read(&self, ctx: &Context, config: Value) -> Result<Value, ProviderError>;
}

pub(crate) fn decode<T: DeserializeOwned>(state: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(state)?)
}

pub(crate) fn encode<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

/// Map a remote 404 to `None`.
pub(crate) fn found<T>(result: Result<T, ProviderError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// A required identifier from decoded state.
pub(crate) fn require<'a>(value: &'a Tristate<String>, name: &str) -> Result<&'a str, ProviderError> {
    value
        .known()
        .map(String::as_str)
        .ok_or_else(|| ProviderError::Validation(format!("'{}' must be known", name)))
}

/// Audit fields copied from the Portal after every write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Audit {
    pub created_at: Tristate<String>,
    pub created_by: Tristate<String>,
    pub updated_at: Tristate<String>,
    pub updated_by: Tristate<String>,
}

impl Audit {
    pub(crate) fn from_wire(
        created_at: &Option<String>,
        created_by: &Option<String>,
        updated_at: &Option<String>,
        updated_by: &Option<String>,
    ) -> Self {
        Self {
            created_at: Tristate::from_option(created_at.clone()),
            created_by: Tristate::from_option(created_by.clone()),
            updated_at: Tristate::from_option(updated_at.clone()),
            updated_by: Tristate::from_option(updated_by.clone()),
        }
    }
}

/// Add the computed audit attributes to a schema.
///
/// `created_*` never change after creation and keep their prior value.
pub(crate) fn with_audit(schema: Schema) -> Schema {
    schema
        .with_attribute(
            "created_at",
            Attribute::computed_string().with_use_state_for_unknown(),
        )
        .with_attribute(
            "created_by",
            Attribute::computed_string().with_use_state_for_unknown(),
        )
        .with_attribute("updated_at", Attribute::computed_string())
        .with_attribute("updated_by", Attribute::computed_string())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookChangelog {
    pub url: String,
    pub agent: Tristate<bool>,
}

/// The flat changelog destination blocks shared by blueprints and integrations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogBlocks {
    pub kafka_changelog_destination: Tristate<Marker>,
    pub webhook_changelog_destination: Tristate<WebhookChangelog>,
}

impl ChangelogBlocks {
    pub(crate) fn to_wire(&self) -> Result<Option<api::ChangelogDestination>, ProviderError> {
        match (
            self.kafka_changelog_destination.known(),
            self.webhook_changelog_destination.known(),
        ) {
            (Some(_), Some(_)) => Err(ProviderError::Validation(
                "only one of kafka_changelog_destination, webhook_changelog_destination may be set"
                    .to_string(),
            )),
            (Some(_), None) => Ok(Some(api::ChangelogDestination::Kafka)),
            (None, Some(webhook)) => Ok(Some(api::ChangelogDestination::Webhook {
                url: webhook.url.clone(),
                agent: webhook.agent.cloned(),
            })),
            (None, None) => Ok(None),
        }
    }

    pub(crate) fn from_wire(destination: &Option<api::ChangelogDestination>) -> Self {
        match destination {
            Some(api::ChangelogDestination::Kafka) => Self {
                kafka_changelog_destination: Tristate::Known(Marker {}),
                ..Default::default()
            },
            Some(api::ChangelogDestination::Webhook { url, agent }) => Self {
                webhook_changelog_destination: Tristate::Known(WebhookChangelog {
                    url: url.clone(),
                    agent: Tristate::from_option(*agent),
                }),
                ..Default::default()
            },
            None => Self::default(),
        }
    }
}

pub(crate) fn with_changelog(schema: Schema) -> Schema {
    schema
        .with_block(
            "kafka_changelog_destination",
            NestedBlock::single(Block::new().with_description("Deliver changes to Kafka")),
        )
        .with_block(
            "webhook_changelog_destination",
            NestedBlock::single(
                Block::new()
                    .with_attribute("url", Attribute::required_string())
                    .with_attribute("agent", Attribute::optional_bool()),
            ),
        )
        .with_at_most_one_of(&["kafka_changelog_destination", "webhook_changelog_destination"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_changelog_blocks_round_trip() {
        let blocks: ChangelogBlocks = serde_json::from_value(json!({
            "webhook_changelog_destination": {"url": "https://hook", "agent": true}
        }))
        .unwrap();
        let wire = blocks.to_wire().unwrap();
        assert_eq!(
            wire,
            Some(api::ChangelogDestination::Webhook {
                url: "https://hook".to_string(),
                agent: Some(true)
            })
        );
        assert_eq!(ChangelogBlocks::from_wire(&wire), blocks);
    }

    #[test]
    fn test_both_changelog_destinations_rejected() {
        let blocks: ChangelogBlocks = serde_json::from_value(json!({
            "kafka_changelog_destination": {},
            "webhook_changelog_destination": {"url": "https://hook"}
        }))
        .unwrap();
        assert!(blocks.to_wire().is_err());
    }

    #[test]
    fn test_found_maps_not_found() {
        let missing: Result<(), ProviderError> = Err(ProviderError::NotFound("x".into()));
        assert_eq!(found(missing).unwrap(), None);
        let other: Result<(), ProviderError> = Err(ProviderError::Sdk("boom".into()));
        assert!(found(other).is_err());
    }
}
