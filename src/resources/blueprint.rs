//! `port_blueprint`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{
    decode, encode, found, require, with_audit, with_changelog, Audit, ChangelogBlocks, Context,
    Resource,
};
use crate::api;
use crate::canonical::Canonicalizer;
use crate::error::ProviderError;
use crate::migration::wait_for_migration;
use crate::properties::{self, refreshed_map, BlueprintProperties};
use crate::schema::{Attribute, AttributeType, Block, NestedBlock, Schema, Validator};
use crate::value::Tristate;

/// Path syntax accepted for inherited ownership.
pub const OWNERSHIP_PATH_PATTERN: &str = r"^\$relations\.[A-Za-z0-9_-]+$";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationState {
    pub target: String,
    pub title: Tristate<String>,
    pub description: Tristate<String>,
    pub many: Tristate<bool>,
    pub required: Tristate<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorState {
    pub path: String,
    pub title: Tristate<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationState {
    pub calculation: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Tristate<String>,
    pub description: Tristate<String>,
    pub icon: Tristate<String>,
    pub format: Tristate<String>,
    pub colorized: Tristate<bool>,
    pub colors: Tristate<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamInheritanceState {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipState {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: Tristate<String>,
}

/// State of a `port_blueprint`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintState {
    pub id: Tristate<String>,
    pub identifier: Tristate<String>,
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub properties: Tristate<BlueprintProperties>,
    pub relations: Tristate<BTreeMap<String, RelationState>>,
    pub mirror_properties: Tristate<BTreeMap<String, MirrorState>>,
    pub calculation_properties: Tristate<BTreeMap<String, CalculationState>>,
    pub team_inheritance: Tristate<TeamInheritanceState>,
    pub ownership: Tristate<OwnershipState>,
    #[serde(flatten)]
    pub changelog: ChangelogBlocks,
    pub force_delete_entities: Tristate<bool>,
    pub create_catalog_page: Tristate<bool>,
    #[serde(flatten)]
    pub audit: Audit,
}

pub(crate) fn properties_to_wire(
    properties: &Tristate<BlueprintProperties>,
) -> Result<api::BlueprintSchema, ProviderError> {
    match properties.known() {
        Some(bag) => properties::blueprint::project(bag),
        None => Ok(api::BlueprintSchema::default()),
    }
}

pub(crate) fn properties_from_wire(
    schema: &api::BlueprintSchema,
    prior: &Tristate<BlueprintProperties>,
    json: &Canonicalizer,
) -> Result<Tristate<BlueprintProperties>, ProviderError> {
    if schema.properties.is_empty() && !prior.is_known() {
        return Ok(Tristate::Null);
    }
    let empty = BlueprintProperties::default();
    let prior_bag = prior.known().unwrap_or(&empty);
    Ok(Tristate::Known(properties::blueprint::refresh(
        schema, prior_bag, json,
    )?))
}

pub(crate) fn relations_to_wire(
    relations: &Tristate<BTreeMap<String, RelationState>>,
) -> BTreeMap<String, api::Relation> {
    properties::entries(relations)
        .map(|(key, r)| {
            (
                key.clone(),
                api::Relation {
                    target: r.target.clone(),
                    title: r.title.cloned(),
                    description: r.description.cloned(),
                    many: r.many.unwrap_or(false),
                    required: r.required.unwrap_or(false),
                },
            )
        })
        .collect()
}

pub(crate) fn relations_from_wire(
    relations: &BTreeMap<String, api::Relation>,
    prior: &Tristate<BTreeMap<String, RelationState>>,
) -> Tristate<BTreeMap<String, RelationState>> {
    let entries = relations
        .iter()
        .map(|(key, r)| {
            (
                key.clone(),
                RelationState {
                    target: r.target.clone(),
                    title: Tristate::from_option(r.title.clone()),
                    description: Tristate::from_option(r.description.clone()),
                    many: Tristate::Known(r.many),
                    required: Tristate::Known(r.required),
                },
            )
        })
        .collect();
    refreshed_map(prior, entries)
}

pub(crate) fn mirror_to_wire(
    mirror: &Tristate<BTreeMap<String, MirrorState>>,
) -> BTreeMap<String, api::MirrorProperty> {
    properties::entries(mirror)
        .map(|(key, m)| {
            (
                key.clone(),
                api::MirrorProperty {
                    path: m.path.clone(),
                    title: m.title.cloned(),
                },
            )
        })
        .collect()
}

pub(crate) fn mirror_from_wire(
    mirror: &BTreeMap<String, api::MirrorProperty>,
    prior: &Tristate<BTreeMap<String, MirrorState>>,
) -> Tristate<BTreeMap<String, MirrorState>> {
    let entries = mirror
        .iter()
        .map(|(key, m)| {
            (
                key.clone(),
                MirrorState {
                    path: m.path.clone(),
                    title: Tristate::from_option(m.title.clone()),
                },
            )
        })
        .collect();
    refreshed_map(prior, entries)
}

pub(crate) fn calculation_to_wire(
    calculation: &Tristate<BTreeMap<String, CalculationState>>,
) -> BTreeMap<String, api::CalculationProperty> {
    properties::entries(calculation)
        .map(|(key, c)| {
            (
                key.clone(),
                api::CalculationProperty {
                    calculation: c.calculation.clone(),
                    kind: c.kind.clone(),
                    title: c.title.cloned(),
                    description: c.description.cloned(),
                    icon: c.icon.cloned(),
                    format: c.format.cloned(),
                    colorized: c.colorized.cloned(),
                    colors: c.colors.cloned(),
                },
            )
        })
        .collect()
}

pub(crate) fn calculation_from_wire(
    calculation: &BTreeMap<String, api::CalculationProperty>,
    prior: &Tristate<BTreeMap<String, CalculationState>>,
) -> Tristate<BTreeMap<String, CalculationState>> {
    let entries = calculation
        .iter()
        .map(|(key, c)| {
            (
                key.clone(),
                CalculationState {
                    calculation: c.calculation.clone(),
                    kind: c.kind.clone(),
                    title: Tristate::from_option(c.title.clone()),
                    description: Tristate::from_option(c.description.clone()),
                    icon: Tristate::from_option(c.icon.clone()),
                    format: Tristate::from_option(c.format.clone()),
                    colorized: Tristate::from_option(c.colorized),
                    colors: Tristate::from_option(c.colors.clone()),
                },
            )
        })
        .collect();
    refreshed_map(prior, entries)
}

fn ownership_to_wire(ownership: &OwnershipState) -> Result<api::Ownership, ProviderError> {
    if ownership.kind == "Inherited" && !ownership.path.is_known() {
        return Err(ProviderError::Validation(
            "ownership.path is required when ownership.type is \"Inherited\"".to_string(),
        ));
    }
    Ok(api::Ownership {
        kind: ownership.kind.clone(),
        path: ownership.path.cloned(),
    })
}

impl BlueprintState {
    /// Project to the wire body. `aggregationProperties` is left empty.
    pub fn to_wire(&self) -> Result<api::Blueprint, ProviderError> {
        let identifier = require(&self.identifier, "identifier")?;
        Ok(api::Blueprint {
            identifier: identifier.to_string(),
            title: self.title.cloned(),
            icon: self.icon.cloned(),
            description: self.description.cloned(),
            schema: properties_to_wire(&self.properties)?,
            relations: relations_to_wire(&self.relations),
            mirror_properties: mirror_to_wire(&self.mirror_properties),
            calculation_properties: calculation_to_wire(&self.calculation_properties),
            aggregation_properties: BTreeMap::new(),
            changelog_destination: self.changelog.to_wire()?,
            team_inheritance: self.team_inheritance.known().map(|t| api::TeamInheritance {
                path: t.path.clone(),
            }),
            ownership: self.ownership.known().map(ownership_to_wire).transpose()?,
            ..Default::default()
        })
    }

    /// Rebuild state from the Portal, keeping provider-only settings from `prior`.
    pub fn refresh(
        remote: &api::Blueprint,
        prior: &BlueprintState,
        json: &Canonicalizer,
    ) -> Result<Self, ProviderError> {
        let mut state = Self {
            id: Tristate::Known(remote.identifier.clone()),
            identifier: Tristate::Known(remote.identifier.clone()),
            title: Tristate::from_option(remote.title.clone()),
            icon: Tristate::from_option(remote.icon.clone()),
            description: Tristate::from_option(remote.description.clone()),
            properties: properties_from_wire(&remote.schema, &prior.properties, json)?,
            relations: relations_from_wire(&remote.relations, &prior.relations),
            mirror_properties: mirror_from_wire(&remote.mirror_properties, &prior.mirror_properties),
            calculation_properties: calculation_from_wire(
                &remote.calculation_properties,
                &prior.calculation_properties,
            ),
            team_inheritance: Tristate::from_option(remote.team_inheritance.as_ref().map(|t| {
                TeamInheritanceState {
                    path: t.path.clone(),
                }
            })),
            ownership: Tristate::from_option(remote.ownership.as_ref().map(|o| OwnershipState {
                kind: o.kind.clone(),
                path: Tristate::from_option(o.path.clone()),
            })),
            changelog: ChangelogBlocks::from_wire(&remote.changelog_destination),
            force_delete_entities: prior.force_delete_entities.clone(),
            create_catalog_page: prior.create_catalog_page.clone(),
            audit: Audit::default(),
        };
        state.set_computed(remote);
        Ok(state)
    }

    /// Copy computed values from a write response onto planned state.
    fn with_computed(mut self, remote: &api::Blueprint) -> Self {
        self.set_computed(remote);
        self
    }

    fn set_computed(&mut self, remote: &api::Blueprint) {
        self.id = Tristate::Known(remote.identifier.clone());
        self.audit = Audit::from_wire(
            &remote.created_at,
            &remote.created_by,
            &remote.updated_at,
            &remote.updated_by,
        );
        self.force_delete_entities = Tristate::Known(self.force_delete_entities.unwrap_or(false));
        self.create_catalog_page = Tristate::Known(self.create_catalog_page.unwrap_or(true));
    }
}

/// Extension blocks shared with `port_system_blueprint`.
pub(crate) fn with_extension_blocks(schema: Schema) -> Schema {
    schema
        .with_block("properties", NestedBlock::single(properties::blueprint::schema_block()))
        .with_block(
            "relations",
            NestedBlock::map(
                Block::new()
                    .with_attribute("target", Attribute::required_string())
                    .with_attribute("title", Attribute::optional_string())
                    .with_attribute("description", Attribute::optional_string())
                    .with_attribute("many", Attribute::defaulted_bool(false))
                    .with_attribute("required", Attribute::defaulted_bool(false)),
            ),
        )
        .with_block(
            "mirror_properties",
            NestedBlock::map(
                Block::new()
                    .with_attribute("path", Attribute::required_string())
                    .with_attribute("title", Attribute::optional_string()),
            ),
        )
        .with_block(
            "calculation_properties",
            NestedBlock::map(
                Block::new()
                    .with_attribute("calculation", Attribute::required_string())
                    .with_attribute(
                        "type",
                        Attribute::required_string()
                            .one_of(&["string", "number", "boolean", "object", "array"]),
                    )
                    .with_attribute("title", Attribute::optional_string())
                    .with_attribute("description", Attribute::optional_string())
                    .with_attribute("icon", Attribute::optional_string())
                    .with_attribute("format", Attribute::optional_string())
                    .with_attribute("colorized", Attribute::optional_bool())
                    .with_attribute("colors", Attribute::optional_map(AttributeType::String)),
            ),
        )
}

/// Controller for `port_blueprint`.
#[derive(Debug, Default)]
pub struct BlueprintResource;

#[async_trait]
impl Resource for BlueprintResource {
    fn type_name(&self) -> &'static str {
        "port_blueprint"
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("A blueprint: the schema of a catalog entity type")
            .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute("identifier", Attribute::required_string().with_force_new())
            .with_attribute("title", Attribute::optional_string())
            .with_attribute("icon", Attribute::optional_string())
            .with_attribute("description", Attribute::optional_string())
            .with_block(
                "team_inheritance",
                NestedBlock::single(
                    Block::new().with_attribute("path", Attribute::required_string()),
                ),
            )
            .with_block(
                "ownership",
                NestedBlock::single(
                    Block::new()
                        .with_attribute(
                            "type",
                            Attribute::required_string().one_of(&["Inherited", "Direct"]),
                        )
                        .with_attribute(
                            "path",
                            Attribute::optional_string().with_validator(Validator::Regex {
                                pattern: OWNERSHIP_PATH_PATTERN.to_string(),
                                message: "path must look like $relations.<relation>".to_string(),
                            }),
                        )
                        .with_required_when("path", "type", "Inherited"),
                ),
            )
            .with_attribute("force_delete_entities", Attribute::defaulted_bool(false))
            .with_attribute("create_catalog_page", Attribute::defaulted_bool(true));
        with_audit(with_changelog(with_extension_blocks(schema)))
    }

    #[instrument(skip_all, fields(resource_type = "port_blueprint"))]
    async fn create(&self, ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        let state: BlueprintState = decode(planned)?;
        let body = state.to_wire()?;
        let created = ctx
            .api
            .create_blueprint(&body, state.create_catalog_page.unwrap_or(true))
            .await?;
        info!(identifier = %created.identifier, "created blueprint");
        encode(&state.with_computed(&created))
    }

    #[instrument(skip_all, fields(resource_type = "port_blueprint"))]
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: BlueprintState = decode(state)?;
        let identifier = require(&prior.identifier, "identifier")?;
        let Some(remote) = found(ctx.api.read_blueprint(identifier).await)? else {
            warn!(identifier = %identifier, "blueprint no longer exists, dropping from state");
            return Ok(None);
        };
        encode(&BlueprintState::refresh(&remote, &prior, &ctx.json)?).map(Some)
    }

    #[instrument(skip_all, fields(resource_type = "port_blueprint"))]
    async fn update(
        &self,
        ctx: &Context,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: BlueprintState = decode(prior)?;
        let Some(identifier) = prior.identifier.known() else {
            return self.create(ctx, planned).await;
        };
        let state: BlueprintState = decode(planned)?;

        // Aggregation properties belong to port_aggregation_properties
        let current = ctx.api.read_blueprint(identifier).await?;
        let mut body = state.to_wire()?;
        body.aggregation_properties = current.aggregation_properties;

        let updated = ctx.api.update_blueprint(identifier, &body).await?;
        info!(identifier = %identifier, "updated blueprint");
        encode(&state.with_computed(&updated))
    }

    #[instrument(skip_all, fields(resource_type = "port_blueprint"))]
    async fn delete(&self, ctx: &Context, state: Value) -> Result<(), ProviderError> {
        let state: BlueprintState = decode(state)?;
        let identifier = require(&state.identifier, "identifier")?;

        if !state.force_delete_entities.unwrap_or(false) {
            if found(ctx.api.delete_blueprint(identifier).await)?.is_none() {
                warn!(identifier = %identifier, "blueprint already deleted");
            }
            return Ok(());
        }

        let Some(migration_id) = found(ctx.api.delete_blueprint_with_entities(identifier).await)?
        else {
            return Ok(());
        };
        info!(identifier = %identifier, migration_id = %migration_id, "waiting for cascade delete");
        wait_for_migration(
            ctx.api.as_ref(),
            &migration_id,
            ctx.poll_interval,
            ctx.cancel.clone(),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = "port_blueprint"))]
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError> {
        let remote = ctx.api.read_blueprint(id).await?;
        encode(&BlueprintState::refresh(
            &remote,
            &BlueprintState::default(),
            &ctx.json,
        )?)
    }
}
