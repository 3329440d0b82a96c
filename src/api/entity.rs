use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entity as exchanged with `/v1/blueprints/{bp}/entities`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub blueprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Vec<String>>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub relations: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorecards: Option<BTreeMap<String, ScorecardResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScorecardResult {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub rules: Vec<ScorecardRuleResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScorecardRuleResult {
    pub identifier: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_keeps_relation_nulls_and_order() {
        let entity: Entity = serde_json::from_value(json!({
            "identifier": "e",
            "blueprint": "a",
            "relations": {"owner": null, "rel": ["b2", "b1"]},
            "scorecards": {"health": {"level": "Gold", "rules": [{"identifier": "r", "status": "SUCCESS", "level": "Gold"}]}}
        }))
        .unwrap();

        assert_eq!(entity.relations["owner"], Value::Null);
        assert_eq!(entity.relations["rel"], json!(["b2", "b1"]));
        assert_eq!(entity.scorecards.unwrap()["health"].level, "Gold");

        let body = serde_json::to_value(Entity {
            relations: BTreeMap::from([("owner".to_string(), Value::Null)]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body["relations"], json!({"owner": null}));
    }
}
