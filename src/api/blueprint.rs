use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::JqOr;

/// A blueprint as exchanged with `/v1/blueprints`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: BlueprintSchema,
    #[serde(default)]
    pub relations: BTreeMap<String, Relation>,
    #[serde(default)]
    pub mirror_properties: BTreeMap<String, MirrorProperty>,
    #[serde(default)]
    pub calculation_properties: BTreeMap<String, CalculationProperty>,
    #[serde(default)]
    pub aggregation_properties: BTreeMap<String, AggregationProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_destination: Option<ChangelogDestination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_inheritance: Option<TeamInheritance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Ownership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// The `schema` member of a blueprint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlueprintSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// A property definition. Also used for action user inputs, which add the
/// JQ-capable and dataset fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JqOr<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<JqOr<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_colors: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_authentication: Option<SpecAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Items>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<JqOr<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<JqOr<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<JqOr<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<JqOr<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Dataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<EntitySort>,
}

/// The `items` member of an array property.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Items {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<JqOr<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecAuthentication {
    pub authorization_url: String,
    pub token_url: String,
    pub client_id: String,
}

/// Entity filter attached to an entity-selecting input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub combinator: String,
    #[serde(default)]
    pub rules: Vec<DatasetRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<String>,
    pub value: JqOr<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntitySort {
    pub property: String,
    pub order: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Relation {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MirrorProperty {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalculationProperty {
    pub calculation: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationProperty {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub calculation_spec: CalculationSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_filter: Option<Vec<PathFilter>>,
}

/// `calculationSpec` of an aggregation property.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationSpec {
    pub func: String,
    pub calculation_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_time_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathFilter {
    pub path: Vec<String>,
}

/// Where change events for a blueprint or integration are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangelogDestination {
    #[serde(rename = "KAFKA")]
    Kafka,
    #[serde(rename = "WEBHOOK")]
    Webhook {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamInheritance {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ownership {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blueprint_decodes_with_missing_sections() {
        let bp: Blueprint = serde_json::from_value(json!({
            "identifier": "_user",
            "title": "User",
            "schema": {"properties": {"email": {"type": "string", "format": "email"}}}
        }))
        .unwrap();

        assert_eq!(bp.schema.properties["email"].format.as_deref(), Some("email"));
        assert!(bp.schema.required.is_empty());
        assert!(bp.relations.is_empty());
        assert!(bp.changelog_destination.is_none());
    }

    #[test]
    fn test_property_jq_fields() {
        let prop: Property = serde_json::from_value(json!({
            "type": "string",
            "default": {"jqQuery": "'Test'"},
            "visible": true,
            "enum": {"jqQuery": "[\"a\"]"}
        }))
        .unwrap();

        assert_eq!(
            prop.default,
            Some(JqOr::Jq {
                jq_query: "'Test'".to_string()
            })
        );
        assert_eq!(prop.visible, Some(JqOr::Literal(true)));
        assert!(matches!(prop.enum_values, Some(JqOr::Jq { .. })));
    }

    #[test]
    fn test_changelog_destination_tags() {
        let kafka = serde_json::to_value(ChangelogDestination::Kafka).unwrap();
        assert_eq!(kafka, json!({"type": "KAFKA"}));

        let webhook: ChangelogDestination =
            serde_json::from_value(json!({"type": "WEBHOOK", "url": "https://hook", "agent": true}))
                .unwrap();
        assert_eq!(
            webhook,
            ChangelogDestination::Webhook {
                url: "https://hook".to_string(),
                agent: Some(true)
            }
        );
    }

    #[test]
    fn test_enum_colors_keep_numeric_keys() {
        let prop: Property = serde_json::from_value(json!({
            "type": "number",
            "enum": [1, 2],
            "enumColors": {"1": "red", "2": "green"}
        }))
        .unwrap();
        let colors = prop.enum_colors.unwrap();
        assert_eq!(colors["1"], "red");
        assert_eq!(colors["2"], "green");
    }
}
