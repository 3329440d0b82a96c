//! Schema-driven planning.
//!
//! [`plan_resource`] turns a proposed configuration into a planned state:
//! defaults are filled in (recursively through nested blocks), computed
//! attributes are either carried from prior state or marked unknown, and the
//! top-level differences against prior state are reported. A change to any
//! `force_new` attribute makes the plan a replacement. JSON-text attributes
//! are planned in canonical form.

use serde_json::{Map, Value};

use crate::canonical::Canonicalizer;
use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Schema};
use crate::types::{AttributeChange, PlanResult};
use crate::value::{is_unknown, UNKNOWN_VALUE};

/// Plan a resource change.
///
/// `prior` is `None` when the resource is being created. A `Null` proposed
/// state plans a destroy.
pub fn plan_resource(
    schema: &Schema,
    prior: Option<&Value>,
    proposed: &Value,
    json: &Canonicalizer,
) -> PlanResult {
    if proposed.is_null() {
        let changes = prior
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(Value::Null, changes, false);
    }

    let mut planned = match proposed {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    prepare(&schema.block, &mut planned, json);

    let prior_obj = prior.and_then(Value::as_object);
    let empty = Map::new();
    let before = prior_obj.unwrap_or(&empty);

    let mut changes = Vec::new();
    let mut requires_replace = false;

    let mut names: Vec<&String> = schema
        .block
        .attributes
        .keys()
        .chain(schema.block.blocks.keys())
        .collect();
    names.sort();

    for name in &names {
        if let Some(attr) = schema.block.attributes.get(*name) {
            if is_computed_only(attr) {
                continue;
            }
            if attr.flags.computed && is_absent(planned.get(*name)) {
                continue;
            }
            if attr.force_new && prior_obj.is_some() {
                let old = before.get(*name).unwrap_or(&Value::Null);
                let new = planned.get(*name).unwrap_or(&Value::Null);
                if !values_equal(old, new) {
                    requires_replace = true;
                }
            }
        }
        if let Some(change) = diff(name, before.get(*name), planned.get(*name)) {
            changes.push(change);
        }
    }

    // Computed values are settled after diffing configured ones
    let creating = prior_obj.is_none() || requires_replace;
    let dirty = !changes.is_empty();
    for (name, attr) in &schema.block.attributes {
        if !attr.flags.computed || !is_absent(planned.get(name)) {
            continue;
        }
        let prior_value = before.get(name).filter(|v| !v.is_null());
        let value = match (creating, prior_value) {
            (false, Some(v)) if attr.use_state_for_unknown || !dirty || attr.flags.optional => {
                v.clone()
            },
            _ => Value::String(UNKNOWN_VALUE.to_string()),
        };
        planned.insert(name.clone(), value);
    }

    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

/// Fill attribute defaults into `obj` and canonicalize JSON-text values,
/// descending into nested blocks.
///
/// Text that does not parse is left as is; validation reports it.
pub fn prepare(block: &Block, obj: &mut Map<String, Value>, json: &Canonicalizer) {
    for (name, attr) in &block.attributes {
        if let Some(default) = &attr.default {
            if obj.get(name).map_or(true, Value::is_null) {
                obj.insert(name.clone(), default.clone());
            }
        }
        if attr.normalize_json {
            if let Some(value) = obj.get_mut(name) {
                canonicalize_value(name, &attr.attr_type, value, json);
            }
        }
    }

    for (name, nested) in &block.blocks {
        let Some(value) = obj.get_mut(name) else {
            continue;
        };
        match (nested.nesting_mode, value) {
            (BlockNestingMode::Single, Value::Object(inner)) => {
                prepare(&nested.block, inner, json);
            },
            (BlockNestingMode::List, Value::Array(items)) => {
                for item in items.iter_mut() {
                    if let Value::Object(inner) = item {
                        prepare(&nested.block, inner, json);
                    }
                }
            },
            (BlockNestingMode::Map, Value::Object(entries)) => {
                for item in entries.values_mut() {
                    if let Value::Object(inner) = item {
                        prepare(&nested.block, inner, json);
                    }
                }
            },
            _ => {},
        }
    }
}

fn canonicalize_value(name: &str, attr_type: &AttributeType, value: &mut Value, json: &Canonicalizer) {
    match (attr_type, value) {
        (_, Value::String(raw)) if !is_unknown_str(raw) => {
            if let Ok(canonical) = json.canonicalize(name, raw) {
                *raw = canonical;
            }
        },
        (AttributeType::List(inner), Value::Array(items)) => {
            for item in items.iter_mut() {
                canonicalize_value(name, inner, item, json);
            }
        },
        (AttributeType::Map(inner), Value::Object(entries)) => {
            for item in entries.values_mut() {
                canonicalize_value(name, inner, item, json);
            }
        },
        _ => {},
    }
}

fn is_unknown_str(raw: &str) -> bool {
    raw == UNKNOWN_VALUE
}

/// Compare two state values, treating missing object keys as null.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => x
            .keys()
            .chain(y.keys())
            .all(|k| values_equal(x.get(k).unwrap_or(&Value::Null), y.get(k).unwrap_or(&Value::Null))),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        },
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn diff(name: &str, before: Option<&Value>, after: Option<&Value>) -> Option<AttributeChange> {
    let old = before.unwrap_or(&Value::Null);
    let new = after.unwrap_or(&Value::Null);
    if values_equal(old, new) {
        return None;
    }
    Some(match (old.is_null(), new.is_null()) {
        (true, _) => AttributeChange::added(name, new.clone()),
        (false, true) => AttributeChange::removed(name, old.clone()),
        (false, false) => AttributeChange::modified(name, old.clone(), new.clone()),
    })
}

fn is_computed_only(attr: &Attribute) -> bool {
    attr.flags.computed && !attr.flags.optional && !attr.flags.required
}

fn is_absent(value: Option<&Value>) -> bool {
    value.map_or(true, |v| v.is_null() || is_unknown(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("identifier", Attribute::required_string().with_force_new())
            .with_attribute("title", Attribute::optional_string())
            .with_attribute("create_catalog_page", Attribute::defaulted_bool(true))
            .with_attribute("created_at", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute("updated_at", Attribute::computed_string())
            .with_block(
                "string_props",
                NestedBlock::map(
                    Block::new()
                        .with_attribute("title", Attribute::optional_string())
                        .with_attribute("required", Attribute::defaulted_bool(false)),
                ),
            )
    }

    #[test]
    fn test_create_marks_computed_unknown_and_applies_defaults() {
        let plan = plan_resource(
            &schema(),
            None,
            &json!({"identifier": "svc", "string_props": {"env": {"title": "Env"}}}),
            &Canonicalizer::new(true),
        );

        let state = &plan.planned_state;
        assert_eq!(state["create_catalog_page"], json!(true));
        assert_eq!(state["string_props"]["env"]["required"], json!(false));
        assert!(is_unknown(&state["created_at"]));
        assert!(is_unknown(&state["updated_at"]));
        assert!(!plan.requires_replace);
        assert!(plan.changes.iter().any(|c| c.path == "identifier"));
    }

    #[test]
    fn test_refreshed_state_plans_no_changes() {
        let prior = json!({
            "identifier": "svc",
            "title": null,
            "create_catalog_page": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "string_props": {"env": {"title": "Env", "required": false}}
        });
        let plan = plan_resource(
            &schema(),
            Some(&prior),
            &json!({"identifier": "svc", "string_props": {"env": {"title": "Env"}}}),
            &Canonicalizer::new(true),
        );

        assert!(plan.is_empty(), "unexpected changes: {:?}", plan.changes);
        assert_eq!(plan.planned_state["updated_at"], json!("2024-01-02T00:00:00Z"));
    }

    #[test]
    fn test_update_keeps_use_state_for_unknown_values() {
        let prior = json!({
            "identifier": "svc",
            "title": "Old",
            "create_catalog_page": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        });
        let plan = plan_resource(
            &schema(),
            Some(&prior),
            &json!({"identifier": "svc", "title": "New"}),
            &Canonicalizer::new(true),
        );

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "title");
        assert_eq!(plan.planned_state["created_at"], json!("2024-01-01T00:00:00Z"));
        assert!(is_unknown(&plan.planned_state["updated_at"]));
    }

    #[test]
    fn test_force_new_requires_replace() {
        let prior = json!({"identifier": "svc", "created_at": "2024-01-01T00:00:00Z"});
        let plan = plan_resource(
            &schema(),
            Some(&prior),
            &json!({"identifier": "api"}),
            &Canonicalizer::new(true),
        );

        assert!(plan.requires_replace);
        assert!(is_unknown(&plan.planned_state["created_at"]));
    }

    #[test]
    fn test_destroy_plan() {
        let prior = json!({"identifier": "svc", "title": null});
        let plan = plan_resource(&schema(), Some(&prior), &Value::Null, &Canonicalizer::new(true));
        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes, vec![AttributeChange::removed("identifier", json!("svc"))]);
    }

    #[test]
    fn test_json_text_planned_canonically() {
        let schema = Schema::v0().with_attribute("config", Attribute::optional_string().json());
        let prior = json!({"config": "{\"a\":1,\"b\":\"\\u003c\"}"});
        let plan = plan_resource(
            &schema,
            Some(&prior),
            &json!({"config": "{ \"b\": \"<\", \"a\": 1 }"}),
            &Canonicalizer::new(true),
        );

        assert!(plan.is_empty(), "unexpected changes: {:?}", plan.changes);
        assert_eq!(plan.planned_state["config"], prior["config"]);
    }

    #[test]
    fn test_malformed_json_text_left_for_validation() {
        let schema = Schema::v0().with_attribute("config", Attribute::optional_string().json());
        let plan = plan_resource(&schema, None, &json!({"config": "{"}), &Canonicalizer::new(true));
        assert_eq!(plan.planned_state["config"], json!("{"));
    }

    #[test]
    fn test_values_equal_treats_missing_as_null() {
        assert!(values_equal(&json!({"a": 1, "b": null}), &json!({"a": 1})));
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!([]), &Value::Null));
        assert!(!values_equal(&json!(["b1", "b2"]), &json!(["b2", "b1"])));
    }
}
