//! `port_entity`: a catalog entity.
//!
//! Entity values are shaped by the owning blueprint's schema, so every write
//! and every refresh fetches the blueprint first.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{decode, encode, found, require, with_audit, Audit, Context, Resource};
use crate::api;
use crate::canonical::Canonicalizer;
use crate::error::ProviderError;
use crate::ids::{composite, parse_composite};
use crate::properties::entity::{self as values, EntityProperties, EntityRelations};
use crate::properties::refreshed_list;
use crate::schema::{Attribute, AttributeFlags, AttributeType, NestedBlock, Schema};
use crate::value::Tristate;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorecardRuleState {
    pub identifier: String,
    pub status: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorecardState {
    pub level: String,
    pub rules: Vec<ScorecardRuleState>,
}

/// State of a `port_entity`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityState {
    pub id: Tristate<String>,
    pub identifier: Tristate<String>,
    pub blueprint: Tristate<String>,
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub teams: Tristate<Vec<String>>,
    pub properties: Tristate<EntityProperties>,
    pub relations: Tristate<EntityRelations>,
    pub run_id: Tristate<String>,
    pub scorecards: Tristate<BTreeMap<String, ScorecardState>>,
    #[serde(flatten)]
    pub audit: Audit,
}

fn scorecards_from_wire(
    scorecards: &Option<BTreeMap<String, api::ScorecardResult>>,
) -> Tristate<BTreeMap<String, ScorecardState>> {
    Tristate::from_option(scorecards.as_ref().map(|cards| {
        cards
            .iter()
            .map(|(key, card)| {
                let rules = card
                    .rules
                    .iter()
                    .map(|r| ScorecardRuleState {
                        identifier: r.identifier.clone(),
                        status: r.status.clone(),
                        level: r.level.clone(),
                    })
                    .collect();
                (
                    key.clone(),
                    ScorecardState {
                        level: card.level.clone(),
                        rules,
                    },
                )
            })
            .collect()
    }))
}

impl EntityState {
    /// Project to the wire body, typing property values by `blueprint`.
    pub fn to_wire(&self, blueprint: &api::Blueprint) -> Result<api::Entity, ProviderError> {
        let properties = match &self.properties {
            Tristate::Known(bag) => values::project(bag, &blueprint.schema, &blueprint.identifier)?,
            _ => BTreeMap::new(),
        };
        let relations = match &self.relations {
            Tristate::Known(relations) => values::project_relations(relations),
            _ => BTreeMap::new(),
        };
        Ok(api::Entity {
            identifier: self.identifier.cloned(),
            blueprint: blueprint.identifier.clone(),
            title: self.title.cloned(),
            icon: self.icon.cloned(),
            team: self.teams.cloned(),
            properties,
            relations,
            ..Default::default()
        })
    }

    /// Rebuild state from the Portal. `run_id` is write-only and kept from `prior`.
    pub fn refresh(
        remote: &api::Entity,
        blueprint: &api::Blueprint,
        prior: &EntityState,
        json: &Canonicalizer,
    ) -> Result<Self, ProviderError> {
        let prior_properties = prior.properties.known().cloned().unwrap_or_default();
        let properties =
            values::refresh(&remote.properties, &blueprint.schema, &prior_properties, json)?;
        let properties = if properties.is_empty() && !prior.properties.is_known() {
            Tristate::Null
        } else {
            Tristate::Known(properties)
        };

        let prior_relations = prior.relations.known().cloned().unwrap_or_default();
        let relations = values::refresh_relations(&remote.relations, blueprint, &prior_relations);
        let relations = if relations.single_relations.is_null()
            && relations.many_relations.is_null()
            && !prior.relations.is_known()
        {
            Tristate::Null
        } else {
            Tristate::Known(relations)
        };

        let mut state = Self {
            identifier: Tristate::from_option(remote.identifier.clone()),
            blueprint: Tristate::Known(blueprint.identifier.clone()),
            title: Tristate::from_option(remote.title.clone()),
            icon: Tristate::from_option(remote.icon.clone()),
            teams: refreshed_list(&prior.teams, remote.team.clone().unwrap_or_default()),
            properties,
            relations,
            run_id: prior.run_id.clone(),
            ..Default::default()
        };
        state.set_computed(remote);
        Ok(state)
    }

    fn set_computed(&mut self, remote: &api::Entity) {
        if let Some(identifier) = &remote.identifier {
            self.identifier = Tristate::Known(identifier.clone());
        }
        if let (Some(bp), Some(id)) = (self.blueprint.known(), self.identifier.known()) {
            self.id = Tristate::Known(composite(bp, id));
        }
        self.scorecards = scorecards_from_wire(&remote.scorecards);
        self.audit = Audit::from_wire(
            &remote.created_at,
            &remote.created_by,
            &remote.updated_at,
            &remote.updated_by,
        );
    }
}

/// Controller for `port_entity`.
#[derive(Debug, Default)]
pub struct EntityResource;

impl EntityResource {
    async fn refresh(
        ctx: &Context,
        blueprint: &str,
        identifier: &str,
        prior: &EntityState,
    ) -> Result<Option<EntityState>, ProviderError> {
        let Some(remote) = found(ctx.api.read_entity(blueprint, identifier).await)? else {
            return Ok(None);
        };
        let Some(schema) = found(ctx.api.read_blueprint(blueprint).await)? else {
            return Ok(None);
        };
        EntityState::refresh(&remote, &schema, prior, &ctx.json).map(Some)
    }
}

#[async_trait]
impl Resource for EntityResource {
    fn type_name(&self) -> &'static str {
        "port_entity"
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("An entity of a blueprint")
            .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute(
                "identifier",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_use_state_for_unknown()
                    .with_description("Generated by the Portal when not set"),
            )
            .with_attribute("blueprint", Attribute::required_string().with_force_new())
            .with_attribute("title", Attribute::optional_string())
            .with_attribute("icon", Attribute::optional_string())
            .with_attribute("teams", Attribute::optional_list(AttributeType::String))
            .with_attribute(
                "run_id",
                Attribute::optional_string()
                    .with_description("Action run that the change is reported against"),
            )
            .with_attribute(
                "scorecards",
                Attribute::new(AttributeType::Dynamic, AttributeFlags::computed()),
            )
            .with_block(
                "properties",
                NestedBlock::single(values::schema_block()),
            )
            .with_block("relations", NestedBlock::single(values::relations_block()));
        with_audit(schema)
    }

    #[instrument(skip_all, fields(resource_type = "port_entity"))]
    async fn create(&self, ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        let mut state: EntityState = decode(planned)?;
        let blueprint = ctx.api.read_blueprint(require(&state.blueprint, "blueprint")?).await?;

        let body = state.to_wire(&blueprint)?;
        let created = ctx
            .api
            .create_entity(&body, state.run_id.known().map(String::as_str))
            .await?;
        state.set_computed(&created);
        info!(id = ?state.id.known(), "created entity");
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_entity"))]
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: EntityState = decode(state)?;
        let blueprint = require(&prior.blueprint, "blueprint")?;
        let identifier = require(&prior.identifier, "identifier")?;
        match Self::refresh(ctx, blueprint, identifier, &prior).await? {
            Some(state) => encode(&state).map(Some),
            None => {
                warn!(blueprint = %blueprint, identifier = %identifier, "entity no longer exists, dropping from state");
                Ok(None)
            },
        }
    }

    #[instrument(skip_all, fields(resource_type = "port_entity"))]
    async fn update(
        &self,
        ctx: &Context,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: EntityState = decode(prior)?;
        let mut state: EntityState = decode(planned)?;
        let identifier = match state.identifier.known() {
            Some(id) => id.clone(),
            None => require(&prior.identifier, "identifier")?.to_string(),
        };
        state.identifier = Tristate::Known(identifier.clone());
        let blueprint = ctx.api.read_blueprint(require(&state.blueprint, "blueprint")?).await?;

        let body = state.to_wire(&blueprint)?;
        let updated = ctx
            .api
            .update_entity(
                &blueprint.identifier,
                &identifier,
                &body,
                state.run_id.known().map(String::as_str),
            )
            .await?;
        state.set_computed(&updated);
        info!(id = ?state.id.known(), "updated entity");
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_entity"))]
    async fn delete(&self, ctx: &Context, state: Value) -> Result<(), ProviderError> {
        let state: EntityState = decode(state)?;
        let blueprint = require(&state.blueprint, "blueprint")?;
        let identifier = require(&state.identifier, "identifier")?;
        if found(ctx.api.delete_entity(blueprint, identifier).await)?.is_none() {
            warn!(blueprint = %blueprint, identifier = %identifier, "entity already deleted");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = "port_entity"))]
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError> {
        let (blueprint, identifier) = parse_composite(id, "<blueprint>:<identifier>")?;
        let state = Self::refresh(ctx, &blueprint, &identifier, &EntityState::default())
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("entity \"{}\"", id)))?;
        encode(&state)
    }
}
