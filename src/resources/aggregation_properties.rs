//! `port_aggregation_properties`: the aggregation map of a blueprint.
//!
//! A child of `port_blueprint`. Every write is a read-modify-write of the
//! parent blueprint that replaces only `aggregationProperties`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{decode, encode, found, require, Context, Resource};
use crate::api;
use crate::canonical::{parse_json, Canonicalizer};
use crate::error::ProviderError;
use crate::properties::{entries, refreshed_map};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};
use crate::value::Tristate;

pub const DEFAULT_AVERAGE_OF: &str = "day";
pub const DEFAULT_MEASURE_TIME_BY: &str = "$createdAt";

const AVERAGE_PERIODS: &[&str] = &["hour", "day", "week", "month"];
const BY_PROPERTY_PERIODS: &[&str] = &["hour", "day", "week", "month", "total"];
const AGGREGATE_FUNCS: &[&str] = &["sum", "min", "max", "median"];
const METHODS: &[&str] = &[
    "count_entities",
    "average_entities",
    "average_by_property",
    "aggregate_by_property",
];

/// How an aggregation is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationMethod {
    CountEntities,
    AverageEntities {
        average_of: String,
        measure_time_by: String,
    },
    AverageByProperty {
        average_of: String,
        measure_time_by: String,
        property: String,
    },
    AggregateByProperty {
        func: String,
        property: String,
    },
}

impl AggregationMethod {
    pub fn to_spec(&self) -> api::CalculationSpec {
        match self {
            Self::CountEntities => api::CalculationSpec {
                func: "count".to_string(),
                calculation_by: "entities".to_string(),
                ..Default::default()
            },
            Self::AverageEntities {
                average_of,
                measure_time_by,
            } => api::CalculationSpec {
                func: "average".to_string(),
                calculation_by: "entities".to_string(),
                average_of: Some(average_of.clone()),
                measure_time_by: Some(measure_time_by.clone()),
                property: None,
            },
            Self::AverageByProperty {
                average_of,
                measure_time_by,
                property,
            } => api::CalculationSpec {
                func: "average".to_string(),
                calculation_by: "property".to_string(),
                average_of: Some(average_of.clone()),
                measure_time_by: Some(measure_time_by.clone()),
                property: Some(property.clone()),
            },
            Self::AggregateByProperty { func, property } => api::CalculationSpec {
                func: func.clone(),
                calculation_by: "property".to_string(),
                property: Some(property.clone()),
                ..Default::default()
            },
        }
    }

    pub fn from_spec(spec: &api::CalculationSpec) -> Result<Self, ProviderError> {
        let average_of = || {
            spec.average_of
                .clone()
                .unwrap_or_else(|| DEFAULT_AVERAGE_OF.to_string())
        };
        let measure_time_by = || {
            spec.measure_time_by
                .clone()
                .unwrap_or_else(|| DEFAULT_MEASURE_TIME_BY.to_string())
        };
        let property = || {
            spec.property.clone().ok_or_else(|| {
                ProviderError::Sdk(format!(
                    "calculationSpec {}/{} has no property",
                    spec.func, spec.calculation_by
                ))
            })
        };

        match (spec.calculation_by.as_str(), spec.func.as_str()) {
            ("entities", "count") => Ok(Self::CountEntities),
            ("entities", "average") => Ok(Self::AverageEntities {
                average_of: average_of(),
                measure_time_by: measure_time_by(),
            }),
            ("property", "average") => Ok(Self::AverageByProperty {
                average_of: average_of(),
                measure_time_by: measure_time_by(),
                property: property()?,
            }),
            ("property", func) => Ok(Self::AggregateByProperty {
                func: func.to_string(),
                property: property()?,
            }),
            (by, func) => Err(ProviderError::Sdk(format!(
                "unsupported calculationSpec {}/{}",
                func, by
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AverageEntitiesState {
    pub average_of: Tristate<String>,
    pub measure_time_by: Tristate<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AverageByPropertyState {
    pub average_of: Tristate<String>,
    pub measure_time_by: Tristate<String>,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateByPropertyState {
    pub func: String,
    pub property: String,
}

/// The flat method blocks; exactly one is set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodState {
    pub count_entities: Tristate<bool>,
    pub average_entities: Tristate<AverageEntitiesState>,
    pub average_by_property: Tristate<AverageByPropertyState>,
    pub aggregate_by_property: Tristate<AggregateByPropertyState>,
}

fn or_default(value: &Tristate<String>, default: &str) -> String {
    value.cloned().unwrap_or_else(|| default.to_string())
}

impl MethodState {
    fn to_method(&self, path: &str) -> Result<AggregationMethod, ProviderError> {
        let mut methods = Vec::new();
        if self.count_entities.unwrap_or(false) {
            methods.push(AggregationMethod::CountEntities);
        }
        if let Some(m) = self.average_entities.known() {
            methods.push(AggregationMethod::AverageEntities {
                average_of: or_default(&m.average_of, DEFAULT_AVERAGE_OF),
                measure_time_by: or_default(&m.measure_time_by, DEFAULT_MEASURE_TIME_BY),
            });
        }
        if let Some(m) = self.average_by_property.known() {
            methods.push(AggregationMethod::AverageByProperty {
                average_of: or_default(&m.average_of, DEFAULT_AVERAGE_OF),
                measure_time_by: or_default(&m.measure_time_by, DEFAULT_MEASURE_TIME_BY),
                property: m.property.clone(),
            });
        }
        if let Some(m) = self.aggregate_by_property.known() {
            methods.push(AggregationMethod::AggregateByProperty {
                func: m.func.clone(),
                property: m.property.clone(),
            });
        }
        match methods.len() {
            1 => Ok(methods.remove(0)),
            _ => Err(ProviderError::Validation(format!(
                "{}: exactly one of {} must be set",
                path,
                METHODS.join(", ")
            ))),
        }
    }

    fn from_method(method: AggregationMethod) -> Self {
        match method {
            AggregationMethod::CountEntities => Self {
                count_entities: Tristate::Known(true),
                ..Default::default()
            },
            AggregationMethod::AverageEntities {
                average_of,
                measure_time_by,
            } => Self {
                average_entities: Tristate::Known(AverageEntitiesState {
                    average_of: Tristate::Known(average_of),
                    measure_time_by: Tristate::Known(measure_time_by),
                }),
                ..Default::default()
            },
            AggregationMethod::AverageByProperty {
                average_of,
                measure_time_by,
                property,
            } => Self {
                average_by_property: Tristate::Known(AverageByPropertyState {
                    average_of: Tristate::Known(average_of),
                    measure_time_by: Tristate::Known(measure_time_by),
                    property,
                }),
                ..Default::default()
            },
            AggregationMethod::AggregateByProperty { func, property } => Self {
                aggregate_by_property: Tristate::Known(AggregateByPropertyState { func, property }),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFilterState {
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationPropertyState {
    pub target_blueprint_identifier: String,
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub method: Tristate<MethodState>,
    /// Canonical JSON text.
    pub query: Tristate<String>,
    pub path_filter: Tristate<Vec<PathFilterState>>,
}

/// State of a `port_aggregation_properties`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationPropertiesState {
    pub id: Tristate<String>,
    pub blueprint_identifier: Tristate<String>,
    pub properties: Tristate<BTreeMap<String, AggregationPropertyState>>,
}

impl AggregationPropertiesState {
    pub fn to_wire(&self) -> Result<BTreeMap<String, api::AggregationProperty>, ProviderError> {
        let mut out = BTreeMap::new();
        for (key, p) in entries(&self.properties) {
            let path = format!("properties.{}", key);
            let method = p
                .method
                .known()
                .ok_or_else(|| {
                    ProviderError::Validation(format!("{}.method must be set", path))
                })?
                .to_method(&format!("{}.method", path))?;
            let query = p
                .query
                .known()
                .map(|raw| parse_json(&format!("{}.query", path), raw))
                .transpose()?;
            out.insert(
                key.clone(),
                api::AggregationProperty {
                    target: p.target_blueprint_identifier.clone(),
                    title: p.title.cloned(),
                    icon: p.icon.cloned(),
                    description: p.description.cloned(),
                    calculation_spec: method.to_spec(),
                    query,
                    path_filter: p.path_filter.known().map(|filters| {
                        filters
                            .iter()
                            .map(|f| api::PathFilter {
                                path: f.path.clone(),
                            })
                            .collect()
                    }),
                },
            );
        }
        Ok(out)
    }

    pub fn refresh(
        blueprint: &str,
        remote: &BTreeMap<String, api::AggregationProperty>,
        prior: &AggregationPropertiesState,
        json: &Canonicalizer,
    ) -> Result<Self, ProviderError> {
        let mut properties = BTreeMap::new();
        for (key, p) in remote {
            let query = match &p.query {
                Some(query) if !query.is_null() => Tristate::Known(json.render(query)?),
                _ => Tristate::Null,
            };
            properties.insert(
                key.clone(),
                AggregationPropertyState {
                    target_blueprint_identifier: p.target.clone(),
                    title: Tristate::from_option(p.title.clone()),
                    icon: Tristate::from_option(p.icon.clone()),
                    description: Tristate::from_option(p.description.clone()),
                    method: Tristate::Known(MethodState::from_method(
                        AggregationMethod::from_spec(&p.calculation_spec)?,
                    )),
                    query,
                    path_filter: Tristate::from_option(p.path_filter.as_ref().map(|filters| {
                        filters
                            .iter()
                            .map(|f| PathFilterState {
                                path: f.path.clone(),
                            })
                            .collect()
                    })),
                },
            );
        }

        Ok(Self {
            id: Tristate::Known(blueprint.to_string()),
            blueprint_identifier: Tristate::Known(blueprint.to_string()),
            properties: refreshed_map(&prior.properties, properties),
        })
    }
}

/// Controller for `port_aggregation_properties`.
#[derive(Debug, Default)]
pub struct AggregationPropertiesResource;

impl AggregationPropertiesResource {
    async fn write(
        ctx: &Context,
        mut blueprint: api::Blueprint,
        aggregations: BTreeMap<String, api::AggregationProperty>,
    ) -> Result<(), ProviderError> {
        blueprint.aggregation_properties = aggregations;
        let identifier = blueprint.identifier.clone();
        ctx.api.update_blueprint(&identifier, &blueprint).await?;
        Ok(())
    }
}

fn method_block() -> Block {
    let average_of = |periods: &[&str]| {
        Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
            .with_default(Value::from(DEFAULT_AVERAGE_OF))
            .one_of(periods)
    };
    let measure_time_by = || {
        Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
            .with_default(Value::from(DEFAULT_MEASURE_TIME_BY))
    };

    Block::new()
        .with_attribute("count_entities", Attribute::optional_bool())
        .with_block(
            "average_entities",
            NestedBlock::single(
                Block::new()
                    .with_attribute("average_of", average_of(AVERAGE_PERIODS))
                    .with_attribute("measure_time_by", measure_time_by()),
            ),
        )
        .with_block(
            "average_by_property",
            NestedBlock::single(
                Block::new()
                    .with_attribute("average_of", average_of(BY_PROPERTY_PERIODS))
                    .with_attribute("measure_time_by", measure_time_by())
                    .with_attribute("property", Attribute::required_string()),
            ),
        )
        .with_block(
            "aggregate_by_property",
            NestedBlock::single(
                Block::new()
                    .with_attribute("func", Attribute::required_string().one_of(AGGREGATE_FUNCS))
                    .with_attribute("property", Attribute::required_string()),
            ),
        )
        .with_exactly_one_of(METHODS)
}

#[async_trait]
impl Resource for AggregationPropertiesResource {
    fn type_name(&self) -> &'static str {
        "port_aggregation_properties"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Aggregation properties of a blueprint")
            .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute("blueprint_identifier", Attribute::required_string().with_force_new())
            .with_block(
                "properties",
                NestedBlock::map(
                    Block::new()
                        .with_attribute("target_blueprint_identifier", Attribute::required_string())
                        .with_attribute("title", Attribute::optional_string())
                        .with_attribute("icon", Attribute::optional_string())
                        .with_attribute("description", Attribute::optional_string())
                        .with_attribute("query", Attribute::optional_string().json())
                        .with_block("method", NestedBlock::single(method_block()).with_min_items(1))
                        .with_block(
                            "path_filter",
                            NestedBlock::list(Block::new().with_attribute(
                                "path",
                                Attribute::new(
                                    AttributeType::list(AttributeType::String),
                                    AttributeFlags::required(),
                                ),
                            )),
                        ),
                ),
            )
    }

    #[instrument(skip_all, fields(resource_type = "port_aggregation_properties"))]
    async fn create(&self, ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        let mut state: AggregationPropertiesState = decode(planned)?;
        let identifier = require(&state.blueprint_identifier, "blueprint_identifier")?.to_string();
        let blueprint = ctx.api.read_blueprint(&identifier).await?;

        let declared = state.to_wire()?;
        if let Some(key) = declared
            .keys()
            .find(|key| blueprint.aggregation_properties.contains_key(*key))
        {
            return Err(ProviderError::AlreadyExists(format!(
                "aggregation property \"{}\" already exists on blueprint \"{}\"; import it instead",
                key, identifier
            )));
        }

        Self::write(ctx, blueprint, declared).await?;
        info!(blueprint = %identifier, "created aggregation properties");
        state.id = Tristate::Known(identifier);
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_aggregation_properties"))]
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: AggregationPropertiesState = decode(state)?;
        let identifier = require(&prior.blueprint_identifier, "blueprint_identifier")?;
        let Some(blueprint) = found(ctx.api.read_blueprint(identifier).await)? else {
            warn!(blueprint = %identifier, "blueprint no longer exists, dropping aggregations from state");
            return Ok(None);
        };
        let state = AggregationPropertiesState::refresh(
            identifier,
            &blueprint.aggregation_properties,
            &prior,
            &ctx.json,
        )?;
        encode(&state).map(Some)
    }

    #[instrument(skip_all, fields(resource_type = "port_aggregation_properties"))]
    async fn update(
        &self,
        ctx: &Context,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let mut state: AggregationPropertiesState = decode(planned)?;
        let identifier = require(&state.blueprint_identifier, "blueprint_identifier")?.to_string();
        let blueprint = ctx.api.read_blueprint(&identifier).await?;

        Self::write(ctx, blueprint, state.to_wire()?).await?;
        info!(blueprint = %identifier, "updated aggregation properties");
        state.id = Tristate::Known(identifier);
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_aggregation_properties"))]
    async fn delete(&self, ctx: &Context, state: Value) -> Result<(), ProviderError> {
        let state: AggregationPropertiesState = decode(state)?;
        let identifier = require(&state.blueprint_identifier, "blueprint_identifier")?;
        let Some(blueprint) = found(ctx.api.read_blueprint(identifier).await)? else {
            return Ok(());
        };
        Self::write(ctx, blueprint, BTreeMap::new()).await?;
        info!(blueprint = %identifier, "cleared aggregation properties");
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = "port_aggregation_properties"))]
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError> {
        let blueprint = ctx.api.read_blueprint(id).await?;
        encode(&AggregationPropertiesState::refresh(
            id,
            &blueprint.aggregation_properties,
            &AggregationPropertiesState::default(),
            &ctx.json,
        )?)
    }
}
