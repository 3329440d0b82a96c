//! `port_search`: entities matching a search query.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::api;
use crate::canonical::parse_json;
use crate::error::ProviderError;
use crate::ids::content_id;
use crate::resources::entity::EntityState;
use crate::resources::{decode, encode, Context, DataSource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::value::Tristate;

/// State of a `port_search`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchState {
    pub id: Tristate<String>,
    /// JSON text of the search query.
    pub query: Tristate<String>,
    pub include: Tristate<Vec<String>>,
    pub exclude: Tristate<Vec<String>>,
    pub exclude_calculated_properties: Tristate<bool>,
    pub attach_title_to_relation: Tristate<bool>,
    pub matching_blueprints: Tristate<Vec<String>>,
    pub entities: Tristate<Vec<EntityState>>,
}

impl SearchState {
    /// SHA-256 of the inputs, so equal searches share an id.
    fn content_id(&self) -> String {
        let flag = |v: &Tristate<bool>| v.known().map(bool::to_string).unwrap_or_default();
        let list = |v: &Tristate<Vec<String>>| v.known().map(|l| l.join("\u{1f}")).unwrap_or_default();

        let query = self.query.known().cloned().unwrap_or_default();
        let include = list(&self.include);
        let exclude = list(&self.exclude);
        let exclude_calculated = flag(&self.exclude_calculated_properties);
        let attach_title = flag(&self.attach_title_to_relation);
        content_id([
            query.as_str(),
            include.as_str(),
            exclude.as_str(),
            exclude_calculated.as_str(),
            attach_title.as_str(),
        ])
    }

    fn to_request(&self) -> Result<api::SearchRequest, ProviderError> {
        let query = match self.query.known() {
            Some(raw) => parse_json("query", raw)?,
            None => {
                return Err(ProviderError::Validation("'query' must be known".to_string()));
            },
        };
        Ok(api::SearchRequest {
            query,
            include: self.include.cloned(),
            exclude: self.exclude.cloned(),
            exclude_calculated_properties: self.exclude_calculated_properties.cloned(),
            attach_title_to_relation: self.attach_title_to_relation.cloned(),
        })
    }
}

/// Reader for `port_search`.
#[derive(Debug, Default)]
pub struct SearchDataSource;

#[async_trait]
impl DataSource for SearchDataSource {
    fn type_name(&self) -> &'static str {
        "port_search"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Search catalog entities")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "query",
                Attribute::new(AttributeType::String, AttributeFlags::required())
                    .json()
                    .with_description("Search query as JSON: {combinator, rules}"),
            )
            .with_attribute("include", Attribute::optional_list(AttributeType::String))
            .with_attribute("exclude", Attribute::optional_list(AttributeType::String))
            .with_attribute("exclude_calculated_properties", Attribute::optional_bool())
            .with_attribute("attach_title_to_relation", Attribute::optional_bool())
            .with_attribute(
                "matching_blueprints",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::computed(),
                ),
            )
            .with_attribute(
                "entities",
                Attribute::new(AttributeType::Dynamic, AttributeFlags::computed()),
            )
    }

    #[instrument(skip_all, fields(data_source = "port_search"))]
    async fn read(&self, ctx: &Context, config: Value) -> Result<Value, ProviderError> {
        let mut state: SearchState = decode(config)?;
        let response = ctx.api.search_entities(&state.to_request()?).await?;
        debug!(entities = response.entities.len(), "search returned");

        // Schemas of every blueprint the results belong to, fetched once each
        let mut blueprints: BTreeMap<String, api::Blueprint> = response
            .matching_blueprints
            .iter()
            .map(|b| (b.identifier.clone(), b.clone()))
            .collect();
        let mut matching = Vec::new();
        for entity in &response.entities {
            if !matching.contains(&entity.blueprint) {
                matching.push(entity.blueprint.clone());
            }
            if !blueprints.contains_key(&entity.blueprint) {
                let blueprint = ctx.api.read_blueprint(&entity.blueprint).await?;
                blueprints.insert(entity.blueprint.clone(), blueprint);
            }
        }
        for blueprint in &response.matching_blueprints {
            if !matching.contains(&blueprint.identifier) {
                matching.push(blueprint.identifier.clone());
            }
        }

        let prior = EntityState::default();
        let entities = response
            .entities
            .iter()
            .map(|entity| {
                let blueprint = blueprints.get(&entity.blueprint).ok_or_else(|| {
                    ProviderError::Sdk(format!("blueprint \"{}\" not fetched", entity.blueprint))
                })?;
                EntityState::refresh(entity, blueprint, &prior, &ctx.json)
            })
            .collect::<Result<Vec<_>, _>>()?;

        state.id = Tristate::Known(state.content_id());
        state.matching_blueprints = Tristate::Known(matching);
        state.entities = Tristate::Known(entities);
        encode(&state)
    }
}
