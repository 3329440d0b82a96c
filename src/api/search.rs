use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::blueprint::Blueprint;
use super::entity::Entity;

/// `POST /v1/entities/search` body. The query is forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_calculated_properties: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach_title_to_relation: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub matching_blueprints: Vec<Blueprint>,
}
