//! `port_system_blueprint`: user extensions of a Portal-owned blueprint.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::blueprint::{
    calculation_from_wire, calculation_to_wire, mirror_from_wire, mirror_to_wire,
    properties_from_wire, properties_to_wire, relations_from_wire, relations_to_wire,
    with_extension_blocks, CalculationState, MirrorState, RelationState,
};
use super::{decode, encode, found, require, Context, Resource};
use crate::api;
use crate::canonical::Canonicalizer;
use crate::error::ProviderError;
use crate::merge::{extract, merge, Extensions};
use crate::properties::BlueprintProperties;
use crate::schema::{Attribute, Schema};
use crate::value::Tristate;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemBlueprintState {
    pub id: Tristate<String>,
    pub identifier: Tristate<String>,
    pub properties: Tristate<BlueprintProperties>,
    pub relations: Tristate<BTreeMap<String, RelationState>>,
    pub mirror_properties: Tristate<BTreeMap<String, MirrorState>>,
    pub calculation_properties: Tristate<BTreeMap<String, CalculationState>>,
}

impl SystemBlueprintState {
    fn extensions(&self) -> Result<Extensions, ProviderError> {
        Ok(Extensions {
            schema: properties_to_wire(&self.properties)?,
            relations: relations_to_wire(&self.relations),
            mirror_properties: mirror_to_wire(&self.mirror_properties),
            calculation_properties: calculation_to_wire(&self.calculation_properties),
        })
    }

    fn refresh(
        identifier: &str,
        owned: &Extensions,
        prior: &SystemBlueprintState,
        json: &Canonicalizer,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            id: Tristate::Known(identifier.to_string()),
            identifier: Tristate::Known(identifier.to_string()),
            properties: properties_from_wire(&owned.schema, &prior.properties, json)?,
            relations: relations_from_wire(&owned.relations, &prior.relations),
            mirror_properties: mirror_from_wire(&owned.mirror_properties, &prior.mirror_properties),
            calculation_properties: calculation_from_wire(
                &owned.calculation_properties,
                &prior.calculation_properties,
            ),
        })
    }
}

/// Controller for `port_system_blueprint`.
#[derive(Debug, Default)]
pub struct SystemBlueprintResource;

impl SystemBlueprintResource {
    async fn fetch(
        ctx: &Context,
        identifier: &str,
    ) -> Result<Option<(api::Blueprint, api::Blueprint)>, ProviderError> {
        let Some(current) = found(ctx.api.read_blueprint(identifier).await)? else {
            return Ok(None);
        };
        let system = ctx.api.read_system_blueprint(identifier).await?;
        Ok(Some((current, system)))
    }

    async fn refresh(
        ctx: &Context,
        identifier: &str,
        prior: &SystemBlueprintState,
    ) -> Result<Option<Value>, ProviderError> {
        let Some((current, system)) = Self::fetch(ctx, identifier).await? else {
            return Ok(None);
        };
        let owned = extract(&Extensions::of(&current), &Extensions::of(&system));
        let state = SystemBlueprintState::refresh(identifier, &owned, prior, &ctx.json)?;
        encode(&state).map(Some)
    }
}

#[async_trait]
impl Resource for SystemBlueprintResource {
    fn type_name(&self) -> &'static str {
        "port_system_blueprint"
    }

    fn schema(&self) -> Schema {
        with_extension_blocks(
            Schema::v0()
                .with_description("Extensions of a blueprint provisioned by the Portal")
                .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
                .with_attribute("identifier", Attribute::required_string().with_force_new()),
        )
    }

    async fn create(&self, _ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        let state: SystemBlueprintState = decode(planned)?;
        Err(ProviderError::FailedPrecondition(format!(
            "system blueprint \"{}\" is owned by the Portal and cannot be created; import it first",
            state.identifier.known().map(String::as_str).unwrap_or_default()
        )))
    }

    #[instrument(skip_all, fields(resource_type = "port_system_blueprint"))]
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: SystemBlueprintState = decode(state)?;
        let identifier = require(&prior.identifier, "identifier")?;
        Self::refresh(ctx, identifier, &prior).await
    }

    #[instrument(skip_all, fields(resource_type = "port_system_blueprint"))]
    async fn update(
        &self,
        ctx: &Context,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let mut state: SystemBlueprintState = decode(planned)?;
        let identifier = require(&state.identifier, "identifier")?.to_string();

        let (mut current, system) = Self::fetch(ctx, &identifier).await?.ok_or_else(|| {
            ProviderError::NotFound(format!("blueprint \"{}\"", identifier))
        })?;

        let (merged, conflicts) = merge(&Extensions::of(&system), &state.extensions()?);
        for conflict in &conflicts {
            warn!(
                identifier = %identifier,
                category = %conflict.category,
                key = %conflict.key,
                "key is owned by the system blueprint, declared value ignored"
            );
        }
        merged.apply_to(&mut current);

        ctx.api.update_blueprint(&identifier, &current).await?;
        info!(identifier = %identifier, "updated system blueprint");

        state.id = Tristate::Known(identifier);
        encode(&state)
    }

    async fn delete(&self, _ctx: &Context, state: Value) -> Result<(), ProviderError> {
        let state: SystemBlueprintState = decode(state)?;
        info!(
            identifier = %state.identifier.known().map(String::as_str).unwrap_or_default(),
            "system blueprints are not deleted, dropping from state"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = "port_system_blueprint"))]
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError> {
        Self::refresh(ctx, id, &SystemBlueprintState::default())
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("blueprint \"{}\"", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryPortal;
    use serde_json::json;

    fn user_baseline() -> api::Blueprint {
        serde_json::from_value(json!({
            "identifier": "_user",
            "title": "User",
            "schema": {
                "properties": {"port_role": {"type": "string", "title": "Port Role"}},
                "required": []
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_points_to_import() {
        let portal = InMemoryPortal::new();
        let err = SystemBlueprintResource
            .create(&portal.context(), json!({"identifier": "_user"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("import"));
    }

    #[tokio::test]
    async fn test_extension_lifecycle() {
        let portal = InMemoryPortal::new();
        portal.insert_system_blueprint(user_baseline());
        let ctx = portal.context();
        let resource = SystemBlueprintResource;

        let imported = resource.import(&ctx, "_user").await.unwrap();
        assert_eq!(imported["properties"], Value::Null);

        let planned = json!({
            "identifier": "_user",
            "properties": {
                "string_props": {"environment": {"required": false}},
                "number_props": {"version": {"required": false}}
            }
        });
        let applied = resource.update(&ctx, imported, planned.clone()).await.unwrap();

        let remote = portal.blueprint("_user").unwrap();
        assert_eq!(
            remote.schema.properties.keys().collect::<Vec<_>>(),
            vec!["environment", "port_role", "version"]
        );
        assert_eq!(remote.title.as_deref(), Some("User"));

        let read = resource.read(&ctx, applied.clone()).await.unwrap().unwrap();
        let refreshed: SystemBlueprintState = decode(read.clone()).unwrap();
        let declared: SystemBlueprintState = decode(planned.clone()).unwrap();
        assert_eq!(refreshed.properties, declared.properties);
        assert!(refreshed.relations.is_null());

        let mut shrunk = planned.clone();
        shrunk["properties"]["number_props"] = json!({});
        resource.update(&ctx, read, shrunk).await.unwrap();

        let remote = portal.blueprint("_user").unwrap();
        assert_eq!(
            remote.schema.properties.keys().collect::<Vec<_>>(),
            vec!["environment", "port_role"]
        );
    }

    #[tokio::test]
    async fn test_delete_keeps_remote() {
        let portal = InMemoryPortal::new();
        portal.insert_system_blueprint(user_baseline());
        SystemBlueprintResource
            .delete(&portal.context(), json!({"identifier": "_user"}))
            .await
            .unwrap();
        assert!(portal.blueprint("_user").is_some());
    }
}
