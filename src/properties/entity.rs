//! Entity property and relation values.
//!
//! Entity values carry no type information of their own on the wire, so both
//! directions consult the owning blueprint's schema to place each key in its
//! value domain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::blueprint::{values_to_numbers, values_to_strings};
use super::{entries, prior_entry, refreshed_map, Domain, PropertyBag};
use crate::api;
use crate::canonical::{parse_json, Canonicalizer};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Block, NestedBlock};
use crate::value::Tristate;

/// Property values declared on an entity.
pub type EntityProperties = PropertyBag<
    Tristate<String>,
    Tristate<f64>,
    Tristate<bool>,
    EntityArrayValue,
    Tristate<String>,
>;

/// An array value, typed by exactly one items field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityArrayValue {
    pub string_items: Tristate<Vec<String>>,
    pub number_items: Tristate<Vec<f64>>,
    pub boolean_items: Tristate<Vec<bool>>,
    /// Each element is a JSON object rendered as a string.
    pub object_items: Tristate<Vec<String>>,
}

/// Relation values declared on an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityRelations {
    /// A null target clears the relation.
    pub single_relations: Tristate<BTreeMap<String, Tristate<String>>>,
    pub many_relations: Tristate<BTreeMap<String, Vec<String>>>,
}

fn schema_domain(
    schema: &api::BlueprintSchema,
    blueprint: &str,
    key: &str,
    declared: Domain,
) -> Result<(), ProviderError> {
    let Some(prop) = schema.properties.get(key) else {
        return Err(ProviderError::Validation(format!(
            "property '{}' is not defined on blueprint '{}'",
            key, blueprint
        )));
    };
    match Domain::from_wire(&prop.kind) {
        Some(domain) if domain == declared => Ok(()),
        _ => Err(ProviderError::Validation(format!(
            "property '{}' of blueprint '{}' has type '{}' but is declared in {}",
            key,
            blueprint,
            prop.kind,
            declared.bag_key()
        ))),
    }
}

fn scalar<T: Into<Value> + Clone>(value: &Tristate<T>) -> Option<Value> {
    match value {
        Tristate::Known(v) => Some(v.clone().into()),
        Tristate::Null => Some(Value::Null),
        Tristate::Unknown => None,
    }
}

fn array_value(value: &EntityArrayValue, path: &str) -> Result<Option<Value>, ProviderError> {
    let mut set = Vec::new();
    if let Some(items) = value.string_items.known() {
        set.push(Value::from(items.clone()));
    }
    if let Some(items) = value.number_items.known() {
        set.push(Value::from(items.clone()));
    }
    if let Some(items) = value.boolean_items.known() {
        set.push(Value::from(items.clone()));
    }
    if let Some(items) = value.object_items.known() {
        let parsed = items
            .iter()
            .enumerate()
            .map(|(n, raw)| parse_json(&format!("{}.object_items.{}", path, n), raw))
            .collect::<Result<Vec<_>, _>>()?;
        set.push(Value::Array(parsed));
    }
    match set.len() {
        0 => Ok(Some(Value::Null)),
        1 => Ok(set.pop()),
        _ => Err(ProviderError::Validation(format!(
            "'{}' may set only one of string_items, number_items, boolean_items, object_items",
            path
        ))),
    }
}

/// Project declared property values to the wire `properties` map.
///
/// Every key must exist on the blueprint with the domain it is declared
/// under. Null values are sent as JSON null; unknown values are left out.
pub fn project(
    bag: &EntityProperties,
    schema: &api::BlueprintSchema,
    blueprint: &str,
) -> Result<BTreeMap<String, Value>, ProviderError> {
    let mut out = BTreeMap::new();

    for (key, v) in entries(&bag.string_props) {
        schema_domain(schema, blueprint, key, Domain::String)?;
        if let Some(v) = scalar(v) {
            out.insert(key.clone(), v);
        }
    }
    for (key, v) in entries(&bag.number_props) {
        schema_domain(schema, blueprint, key, Domain::Number)?;
        if let Some(v) = scalar(v) {
            out.insert(key.clone(), v);
        }
    }
    for (key, v) in entries(&bag.boolean_props) {
        schema_domain(schema, blueprint, key, Domain::Boolean)?;
        if let Some(v) = scalar(v) {
            out.insert(key.clone(), v);
        }
    }
    for (key, v) in entries(&bag.array_props) {
        schema_domain(schema, blueprint, key, Domain::Array)?;
        if let Some(v) = array_value(v, &format!("properties.array_props.{}", key))? {
            out.insert(key.clone(), v);
        }
    }
    for (key, v) in entries(&bag.object_props) {
        schema_domain(schema, blueprint, key, Domain::Object)?;
        let value = match v {
            Tristate::Known(raw) => Some(parse_json(
                &format!("properties.object_props.{}", key),
                raw,
            )?),
            Tristate::Null => Some(Value::Null),
            Tristate::Unknown => None,
        };
        if let Some(value) = value {
            out.insert(key.clone(), value);
        }
    }

    Ok(out)
}

fn known_or_null<T>(value: Option<T>) -> Tristate<T> {
    Tristate::from_option(value)
}

fn refresh_array(
    value: &Value,
    items_kind: Option<Domain>,
    prior: Option<&EntityArrayValue>,
    json: &Canonicalizer,
) -> Result<EntityArrayValue, ProviderError> {
    let Value::Array(items) = value else {
        return Ok(EntityArrayValue::default());
    };
    let domain = items_kind
        .or_else(|| prior.and_then(prior_items_domain))
        .or_else(|| items.first().map(infer_domain))
        .unwrap_or(Domain::String);

    let mut out = EntityArrayValue::default();
    match domain {
        Domain::Number => out.number_items = Tristate::Known(values_to_numbers(items)),
        Domain::Boolean => {
            out.boolean_items = Tristate::Known(items.iter().filter_map(Value::as_bool).collect())
        },
        Domain::Object => {
            out.object_items = Tristate::Known(
                items
                    .iter()
                    .map(|v| json.render(v))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        },
        Domain::String | Domain::Array => {
            out.string_items = Tristate::Known(values_to_strings(items))
        },
    }
    Ok(out)
}

fn prior_items_domain(prior: &EntityArrayValue) -> Option<Domain> {
    if prior.string_items.is_known() {
        Some(Domain::String)
    } else if prior.number_items.is_known() {
        Some(Domain::Number)
    } else if prior.boolean_items.is_known() {
        Some(Domain::Boolean)
    } else if prior.object_items.is_known() {
        Some(Domain::Object)
    } else {
        None
    }
}

fn infer_domain(value: &Value) -> Domain {
    match value {
        Value::Number(_) => Domain::Number,
        Value::Bool(_) => Domain::Boolean,
        Value::Object(_) => Domain::Object,
        _ => Domain::String,
    }
}

/// Rebuild declared property values from the wire `properties` map.
///
/// Keys absent from the blueprint schema (mirror, calculation and
/// aggregation values) are skipped. A null value is kept, typed by its
/// schema domain, only when the prior state declared the key.
pub fn refresh(
    properties: &BTreeMap<String, Value>,
    schema: &api::BlueprintSchema,
    prior: &EntityProperties,
    json: &Canonicalizer,
) -> Result<EntityProperties, ProviderError> {
    let mut strings = BTreeMap::new();
    let mut numbers = BTreeMap::new();
    let mut booleans = BTreeMap::new();
    let mut arrays = BTreeMap::new();
    let mut objects = BTreeMap::new();

    for (key, value) in properties {
        let Some(prop) = schema.properties.get(key) else {
            tracing::trace!(property = %key, "skipping value outside blueprint schema");
            continue;
        };
        let Some(domain) = Domain::from_wire(&prop.kind) else {
            continue;
        };
        if value.is_null() && prior.domain_of(key) != Some(domain) {
            continue;
        }

        match domain {
            Domain::String => {
                strings.insert(key.clone(), known_or_null(value.as_str().map(String::from)));
            },
            Domain::Number => {
                numbers.insert(key.clone(), known_or_null(value.as_f64()));
            },
            Domain::Boolean => {
                booleans.insert(key.clone(), known_or_null(value.as_bool()));
            },
            Domain::Array => {
                let items_kind = prop.items.as_ref().and_then(|i| Domain::from_wire(&i.kind));
                let prior_value = prior_entry(&prior.array_props, key);
                arrays.insert(
                    key.clone(),
                    refresh_array(value, items_kind, prior_value, json)?,
                );
            },
            Domain::Object => {
                let rendered = if value.is_null() {
                    Tristate::Null
                } else {
                    Tristate::Known(json.render(value)?)
                };
                objects.insert(key.clone(), rendered);
            },
        }
    }

    Ok(EntityProperties {
        string_props: refreshed_map(&prior.string_props, strings),
        number_props: refreshed_map(&prior.number_props, numbers),
        boolean_props: refreshed_map(&prior.boolean_props, booleans),
        array_props: refreshed_map(&prior.array_props, arrays),
        object_props: refreshed_map(&prior.object_props, objects),
    })
}

/// Project declared relations to the wire `relations` map.
pub fn project_relations(relations: &EntityRelations) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (key, target) in entries(&relations.single_relations) {
        match target {
            Tristate::Known(id) => {
                out.insert(key.clone(), Value::String(id.clone()));
            },
            Tristate::Null => {
                out.insert(key.clone(), Value::Null);
            },
            Tristate::Unknown => {},
        }
    }
    for (key, targets) in entries(&relations.many_relations) {
        out.insert(key.clone(), Value::from(targets.clone()));
    }
    out
}

/// Rebuild declared relations from the wire `relations` map.
///
/// The blueprint's relation definitions decide single versus many; empty
/// values are kept only for keys the prior state declared.
pub fn refresh_relations(
    relations: &BTreeMap<String, Value>,
    blueprint: &api::Blueprint,
    prior: &EntityRelations,
) -> EntityRelations {
    let mut single = BTreeMap::new();
    let mut many = BTreeMap::new();

    for (key, value) in relations {
        let is_many = blueprint
            .relations
            .get(key)
            .map(|r| r.many)
            .unwrap_or_else(|| value.is_array());

        if is_many {
            let targets = value
                .as_array()
                .map(|v| values_to_strings(v))
                .unwrap_or_default();
            if targets.is_empty() && prior_entry(&prior.many_relations, key).is_none() {
                continue;
            }
            many.insert(key.clone(), targets);
        } else {
            let target = value.as_str().map(String::from);
            if target.is_none() && prior_entry(&prior.single_relations, key).is_none() {
                continue;
            }
            single.insert(key.clone(), Tristate::from_option(target));
        }
    }

    EntityRelations {
        single_relations: refreshed_map(&prior.single_relations, single),
        many_relations: refreshed_map(&prior.many_relations, many),
    }
}

/// Declarative shape of entity `properties`.
pub fn schema_block() -> Block {
    Block::new()
        .with_attribute("string_props", Attribute::optional_map(AttributeType::String))
        .with_attribute("number_props", Attribute::optional_map(AttributeType::Float64))
        .with_attribute("boolean_props", Attribute::optional_map(AttributeType::Bool))
        .with_attribute("object_props", Attribute::optional_map(AttributeType::String).json())
        .with_block(
            "array_props",
            NestedBlock::map(
                Block::new()
                    .with_attribute("string_items", Attribute::optional_list(AttributeType::String))
                    .with_attribute(
                        "number_items",
                        Attribute::optional_list(AttributeType::Float64),
                    )
                    .with_attribute("boolean_items", Attribute::optional_list(AttributeType::Bool))
                    .with_attribute(
                        "object_items",
                        Attribute::optional_list(AttributeType::String).json(),
                    )
                    .with_at_most_one_of(&[
                        "string_items",
                        "number_items",
                        "boolean_items",
                        "object_items",
                    ]),
            ),
        )
}

/// Declarative shape of entity `relations`.
pub fn relations_block() -> Block {
    Block::new()
        .with_attribute("single_relations", Attribute::optional_map(AttributeType::String))
        .with_attribute(
            "many_relations",
            Attribute::optional_map(AttributeType::list(AttributeType::String)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_schema() -> api::BlueprintSchema {
        serde_json::from_value(json!({
            "properties": {
                "language": {"type": "string"},
                "replicas": {"type": "number"},
                "public": {"type": "boolean"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "limits": {"type": "array", "items": {"type": "number"}},
                "meta": {"type": "object"}
            },
            "required": []
        }))
        .unwrap()
    }

    #[test]
    fn test_project_and_refresh_values() {
        let json = Canonicalizer::new(true);
        let bag: EntityProperties = serde_json::from_value(json!({
            "string_props": {"language": "rust"},
            "number_props": {"replicas": 3.0},
            "boolean_props": {"public": false},
            "array_props": {"tags": {"string_items": ["a", "b"]}, "limits": {"number_items": []}},
            "object_props": {"meta": "{\"b\":1,\"a\":2}"}
        }))
        .unwrap();

        let wire = project(&bag, &service_schema(), "service").unwrap();
        assert_eq!(wire["tags"], json!(["a", "b"]));
        assert_eq!(wire["limits"], json!([]));
        assert_eq!(wire["meta"], json!({"a": 2, "b": 1}));

        let refreshed = refresh(&wire, &service_schema(), &bag, &json).unwrap();
        let meta = &refreshed.object_props.known().unwrap()["meta"];
        assert_eq!(meta, &Tristate::Known(r#"{"a":2,"b":1}"#.to_string()));
        assert_eq!(refreshed.array_props, bag.array_props);
        assert_eq!(refreshed.number_props, bag.number_props);
    }

    #[test]
    fn test_unknown_property_rejected() {
        let bag: EntityProperties = serde_json::from_value(json!({
            "string_props": {"owner": "me"}
        }))
        .unwrap();
        let err = project(&bag, &service_schema(), "service").unwrap_err();
        assert!(err.to_string().contains("'owner' is not defined"));
    }

    #[test]
    fn test_domain_mismatch_rejected() {
        let bag: EntityProperties = serde_json::from_value(json!({
            "string_props": {"replicas": "3"}
        }))
        .unwrap();
        assert!(project(&bag, &service_schema(), "service").is_err());
    }

    #[test]
    fn test_null_kept_in_declared_domain() {
        let prior: EntityProperties = serde_json::from_value(json!({
            "number_props": {"replicas": null}
        }))
        .unwrap();
        let wire = BTreeMap::from([
            ("replicas".to_string(), Value::Null),
            ("language".to_string(), Value::Null),
        ]);

        let refreshed =
            refresh(&wire, &service_schema(), &prior, &Canonicalizer::default()).unwrap();
        assert_eq!(refreshed.number_props.known().unwrap()["replicas"], Tristate::Null);
        assert!(refreshed.string_props.is_null());
    }

    #[test]
    fn test_many_relations_keep_order() {
        let blueprint: api::Blueprint = serde_json::from_value(json!({
            "identifier": "a",
            "relations": {
                "rel": {"target": "b", "many": true},
                "owner": {"target": "team", "many": false}
            }
        }))
        .unwrap();
        let declared: EntityRelations = serde_json::from_value(json!({
            "single_relations": {"owner": null},
            "many_relations": {"rel": ["b2", "b1"]}
        }))
        .unwrap();

        let wire = project_relations(&declared);
        assert_eq!(wire["owner"], Value::Null);
        assert_eq!(wire["rel"], json!(["b2", "b1"]));

        let refreshed = refresh_relations(&wire, &blueprint, &declared);
        assert_eq!(refreshed, declared);
    }

    mod laws {
        use super::*;
        use crate::properties::strategies::{maybe, object_text, quarter, text};
        use proptest::prelude::*;

        fn schema() -> api::BlueprintSchema {
            serde_json::from_value(json!({
                "properties": {
                    "language": {"type": "string"},
                    "owner": {"type": "string"},
                    "replicas": {"type": "number"},
                    "public": {"type": "boolean"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "limits": {"type": "array", "items": {"type": "number"}},
                    "flags": {"type": "array", "items": {"type": "boolean"}},
                    "docs": {"type": "array", "items": {"type": "object"}},
                    "loose": {"type": "array"},
                    "meta": {"type": "object"}
                },
                "required": []
            }))
            .unwrap()
        }

        /// A declared map over a subset of `keys`.
        fn values<T: std::fmt::Debug>(
            keys: &'static [&'static str],
            value: impl Strategy<Value = T>,
        ) -> impl Strategy<Value = Tristate<BTreeMap<String, T>>> {
            maybe(prop::collection::btree_map(
                prop::sample::select(keys).prop_map(str::to_string),
                value,
                0..=keys.len(),
            ))
        }

        fn string_items() -> impl Strategy<Value = EntityArrayValue> {
            maybe(prop::collection::vec(text(), 0..3)).prop_map(|string_items| EntityArrayValue {
                string_items,
                ..Default::default()
            })
        }

        fn number_items() -> impl Strategy<Value = EntityArrayValue> {
            maybe(prop::collection::vec(quarter(), 0..3)).prop_map(|number_items| EntityArrayValue {
                number_items,
                ..Default::default()
            })
        }

        fn boolean_items() -> impl Strategy<Value = EntityArrayValue> {
            maybe(prop::collection::vec(any::<bool>(), 0..3)).prop_map(|boolean_items| EntityArrayValue {
                boolean_items,
                ..Default::default()
            })
        }

        fn object_items() -> impl Strategy<Value = EntityArrayValue> {
            maybe(prop::collection::vec(object_text(), 0..3)).prop_map(|object_items| EntityArrayValue {
                object_items,
                ..Default::default()
            })
        }

        fn arrays() -> impl Strategy<Value = Tristate<BTreeMap<String, EntityArrayValue>>> {
            let loose = prop_oneof![string_items(), number_items(), boolean_items(), object_items()];
            maybe((
                prop::option::of(string_items()),
                prop::option::of(number_items()),
                prop::option::of(boolean_items()),
                prop::option::of(object_items()),
                prop::option::of(loose),
            ))
            .prop_map(|arrays| {
                arrays.map(|(tags, limits, flags, docs, loose)| {
                    [("tags", tags), ("limits", limits), ("flags", flags), ("docs", docs), ("loose", loose)]
                        .into_iter()
                        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
                        .collect()
                })
            })
        }

        fn entity_properties() -> impl Strategy<Value = EntityProperties> {
            (
                values(&["language", "owner"], maybe(text())),
                values(&["replicas"], maybe(quarter())),
                values(&["public"], maybe(any::<bool>())),
                arrays(),
                values(&["meta"], maybe(object_text())),
            )
                .prop_map(|(string_props, number_props, boolean_props, array_props, object_props)| {
                    EntityProperties {
                        string_props,
                        number_props,
                        boolean_props,
                        array_props,
                        object_props,
                    }
                })
        }

        proptest! {
            #[test]
            fn project_refresh_project_is_project(declared in entity_properties(), escape in any::<bool>()) {
                let json = Canonicalizer::new(escape);
                let schema = schema();
                let wire = project(&declared, &schema, "service").unwrap();
                let refreshed = refresh(&wire, &schema, &declared, &json).unwrap();
                prop_assert_eq!(project(&refreshed, &schema, "service").unwrap(), wire);
            }
        }
    }
}
