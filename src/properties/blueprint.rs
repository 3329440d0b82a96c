//! Blueprint property schemas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{entries, refreshed_map, Domain, PropertyBag};
use crate::api;
use crate::canonical::{parse_json, Canonicalizer};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Block, NestedBlock, Validator};
use crate::value::{JqOr, Tristate};

/// Property schemas declared on a blueprint.
pub type BlueprintProperties =
    PropertyBag<StringProperty, NumberProperty, BooleanProperty, ArrayProperty, ObjectProperty>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecAuthentication {
    pub authorization_url: String,
    pub token_url: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StringProperty {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub default: Tristate<String>,
    pub format: Tristate<String>,
    pub min_length: Tristate<i64>,
    pub max_length: Tristate<i64>,
    pub pattern: Tristate<String>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<String>>,
    pub enum_colors: Tristate<BTreeMap<String, String>>,
    pub spec: Tristate<String>,
    pub spec_authentication: Tristate<SpecAuthentication>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberProperty {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub default: Tristate<f64>,
    pub minimum: Tristate<f64>,
    pub maximum: Tristate<f64>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<f64>>,
    pub enum_colors: Tristate<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanProperty {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub default: Tristate<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayProperty {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub min_items: Tristate<i64>,
    pub max_items: Tristate<i64>,
    pub string_items: Tristate<StringItems>,
    pub number_items: Tristate<NumberItems>,
    pub boolean_items: Tristate<BooleanItems>,
    pub object_items: Tristate<ObjectItems>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StringItems {
    pub format: Tristate<String>,
    pub pattern: Tristate<String>,
    pub default: Tristate<Vec<String>>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberItems {
    pub default: Tristate<Vec<f64>>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanItems {
    pub default: Tristate<Vec<bool>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectItems {
    /// Each element is a JSON object rendered as a string.
    pub default: Tristate<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectProperty {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    /// JSON object rendered as a string.
    pub default: Tristate<String>,
    pub spec: Tristate<String>,
}

/// The single populated items variant of an array property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrayItems<'a> {
    String(&'a StringItems),
    Number(&'a NumberItems),
    Boolean(&'a BooleanItems),
    Object(&'a ObjectItems),
}

impl ArrayProperty {
    /// The populated items variant, rejecting more than one.
    pub fn items(&self, path: &str) -> Result<Option<ArrayItems<'_>>, ProviderError> {
        let mut found = Vec::new();
        if let Some(items) = self.string_items.known() {
            found.push(ArrayItems::String(items));
        }
        if let Some(items) = self.number_items.known() {
            found.push(ArrayItems::Number(items));
        }
        if let Some(items) = self.boolean_items.known() {
            found.push(ArrayItems::Boolean(items));
        }
        if let Some(items) = self.object_items.known() {
            found.push(ArrayItems::Object(items));
        }
        if found.len() > 1 {
            return Err(ProviderError::Validation(format!(
                "'{}' may declare only one of string_items, number_items, boolean_items, object_items",
                path
            )));
        }
        Ok(found.pop())
    }
}

pub(crate) fn strings_to_values(values: &[String]) -> Vec<Value> {
    values.iter().cloned().map(Value::String).collect()
}

pub(crate) fn numbers_to_values(values: &[f64]) -> Vec<Value> {
    values.iter().copied().map(Value::from).collect()
}

pub(crate) fn values_to_strings(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

pub(crate) fn values_to_numbers(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(Value::as_f64).collect()
}

/// The literal side of a wire value, decoded as `T`.
pub(crate) fn literal<T: serde::de::DeserializeOwned>(value: &Option<JqOr<Value>>) -> Tristate<T> {
    match value {
        Some(JqOr::Literal(v)) if !v.is_null() => serde_json::from_value(v.clone())
            .map(Tristate::Known)
            .unwrap_or(Tristate::Null),
        _ => Tristate::Null,
    }
}

pub(crate) fn literal_list(value: &Option<JqOr<Vec<Value>>>) -> Option<&Vec<Value>> {
    match value {
        Some(JqOr::Literal(v)) => Some(v),
        _ => None,
    }
}

fn wire_spec_auth(auth: &Tristate<SpecAuthentication>) -> Option<api::SpecAuthentication> {
    auth.known().map(|a| api::SpecAuthentication {
        authorization_url: a.authorization_url.clone(),
        token_url: a.token_url.clone(),
        client_id: a.client_id.clone(),
    })
}

fn declared_spec_auth(auth: &Option<api::SpecAuthentication>) -> Tristate<SpecAuthentication> {
    Tristate::from_option(auth.as_ref().map(|a| SpecAuthentication {
        authorization_url: a.authorization_url.clone(),
        token_url: a.token_url.clone(),
        client_id: a.client_id.clone(),
    }))
}

fn base(
    kind: Domain,
    title: &Tristate<String>,
    icon: &Tristate<String>,
    description: &Tristate<String>,
) -> api::Property {
    api::Property {
        kind: kind.as_wire().to_string(),
        title: title.cloned(),
        icon: icon.cloned(),
        description: description.cloned(),
        ..Default::default()
    }
}

/// Project declared property schemas to the wire `schema` member.
pub fn project(bag: &BlueprintProperties) -> Result<api::BlueprintSchema, ProviderError> {
    let mut schema = api::BlueprintSchema::default();
    let mut required = Vec::new();

    for (key, p) in entries(&bag.string_props) {
        let mut prop = base(Domain::String, &p.title, &p.icon, &p.description);
        prop.default = p.default.cloned().map(|d| JqOr::Literal(Value::String(d)));
        prop.format = p.format.cloned();
        prop.min_length = p.min_length.cloned();
        prop.max_length = p.max_length.cloned();
        prop.pattern = p.pattern.cloned();
        prop.enum_values = p
            .enum_values
            .known()
            .map(|v| JqOr::Literal(strings_to_values(v)));
        prop.enum_colors = p.enum_colors.cloned();
        prop.spec = p.spec.cloned();
        prop.spec_authentication = wire_spec_auth(&p.spec_authentication);
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        schema.properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&bag.number_props) {
        let mut prop = base(Domain::Number, &p.title, &p.icon, &p.description);
        prop.default = p.default.cloned().map(|d| JqOr::Literal(Value::from(d)));
        prop.minimum = p.minimum.cloned();
        prop.maximum = p.maximum.cloned();
        prop.enum_values = p
            .enum_values
            .known()
            .map(|v| JqOr::Literal(numbers_to_values(v)));
        prop.enum_colors = p.enum_colors.cloned();
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        schema.properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&bag.boolean_props) {
        let mut prop = base(Domain::Boolean, &p.title, &p.icon, &p.description);
        prop.default = p.default.cloned().map(|d| JqOr::Literal(Value::Bool(d)));
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        schema.properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&bag.array_props) {
        let mut prop = base(Domain::Array, &p.title, &p.icon, &p.description);
        prop.min_items = p.min_items.cloned().map(JqOr::Literal);
        prop.max_items = p.max_items.cloned().map(JqOr::Literal);
        let path = format!("properties.array_props.{}", key);
        let (items, default) = project_items(p.items(&path)?, &path)?;
        prop.items = items;
        prop.default = default.map(JqOr::Literal);
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        schema.properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&bag.object_props) {
        let mut prop = base(Domain::Object, &p.title, &p.icon, &p.description);
        if let Some(raw) = p.default.known() {
            let path = format!("properties.object_props.{}.default", key);
            prop.default = Some(JqOr::Literal(parse_json(&path, raw)?));
        }
        prop.spec = p.spec.cloned();
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        schema.properties.insert(key.clone(), prop);
    }

    required.sort();
    schema.required = required;
    Ok(schema)
}

fn project_items(
    items: Option<ArrayItems<'_>>,
    path: &str,
) -> Result<(Option<api::Items>, Option<Value>), ProviderError> {
    let Some(items) = items else {
        return Ok((None, None));
    };
    let (wire, default) = match items {
        ArrayItems::String(i) => (
            api::Items {
                kind: "string".to_string(),
                format: i.format.cloned(),
                pattern: i.pattern.cloned(),
                enum_values: i
                    .enum_values
                    .known()
                    .map(|v| JqOr::Literal(strings_to_values(v))),
                ..Default::default()
            },
            i.default.known().map(|d| Value::Array(strings_to_values(d))),
        ),
        ArrayItems::Number(i) => (
            api::Items {
                kind: "number".to_string(),
                enum_values: i
                    .enum_values
                    .known()
                    .map(|v| JqOr::Literal(numbers_to_values(v))),
                ..Default::default()
            },
            i.default.known().map(|d| Value::Array(numbers_to_values(d))),
        ),
        ArrayItems::Boolean(i) => (
            api::Items {
                kind: "boolean".to_string(),
                ..Default::default()
            },
            i.default
                .known()
                .map(|d| Value::Array(d.iter().copied().map(Value::Bool).collect())),
        ),
        ArrayItems::Object(i) => {
            let default = match i.default.known() {
                Some(d) => Some(Value::Array(
                    d.iter()
                        .enumerate()
                        .map(|(n, raw)| parse_json(&format!("{}.object_items.default.{}", path, n), raw))
                        .collect::<Result<Vec<_>, _>>()?,
                )),
                None => None,
            };
            (
                api::Items {
                    kind: "object".to_string(),
                    ..Default::default()
                },
                default,
            )
        },
    };
    Ok((Some(wire), default))
}

/// Rebuild declared property schemas from the wire `schema` member.
pub fn refresh(
    schema: &api::BlueprintSchema,
    prior: &BlueprintProperties,
    json: &Canonicalizer,
) -> Result<BlueprintProperties, ProviderError> {
    let mut strings = BTreeMap::new();
    let mut numbers = BTreeMap::new();
    let mut booleans = BTreeMap::new();
    let mut arrays = BTreeMap::new();
    let mut objects = BTreeMap::new();

    for (key, prop) in &schema.properties {
        let required = Tristate::Known(schema.required.contains(key));
        let title = Tristate::from_option(prop.title.clone());
        let icon = Tristate::from_option(prop.icon.clone());
        let description = Tristate::from_option(prop.description.clone());

        match Domain::from_wire(&prop.kind) {
            Some(Domain::String) => {
                strings.insert(
                    key.clone(),
                    StringProperty {
                        title,
                        icon,
                        description,
                        required,
                        default: literal(&prop.default),
                        format: Tristate::from_option(prop.format.clone()),
                        min_length: Tristate::from_option(prop.min_length),
                        max_length: Tristate::from_option(prop.max_length),
                        pattern: Tristate::from_option(prop.pattern.clone()),
                        enum_values: Tristate::from_option(
                            literal_list(&prop.enum_values).map(|v| values_to_strings(v)),
                        ),
                        enum_colors: Tristate::from_option(prop.enum_colors.clone()),
                        spec: Tristate::from_option(prop.spec.clone()),
                        spec_authentication: declared_spec_auth(&prop.spec_authentication),
                    },
                );
            },
            Some(Domain::Number) => {
                numbers.insert(
                    key.clone(),
                    NumberProperty {
                        title,
                        icon,
                        description,
                        required,
                        default: literal(&prop.default),
                        minimum: Tristate::from_option(prop.minimum),
                        maximum: Tristate::from_option(prop.maximum),
                        enum_values: Tristate::from_option(
                            literal_list(&prop.enum_values).map(|v| values_to_numbers(v)),
                        ),
                        enum_colors: Tristate::from_option(prop.enum_colors.clone()),
                    },
                );
            },
            Some(Domain::Boolean) => {
                booleans.insert(
                    key.clone(),
                    BooleanProperty {
                        title,
                        icon,
                        description,
                        required,
                        default: literal(&prop.default),
                    },
                );
            },
            Some(Domain::Array) => {
                let mut array = ArrayProperty {
                    title,
                    icon,
                    description,
                    required,
                    min_items: literal_int(&prop.min_items),
                    max_items: literal_int(&prop.max_items),
                    ..Default::default()
                };
                refresh_items(&mut array, prop, json)?;
                arrays.insert(key.clone(), array);
            },
            Some(Domain::Object) => {
                let default = match &prop.default {
                    Some(JqOr::Literal(v)) if !v.is_null() => Tristate::Known(json.render(v)?),
                    _ => Tristate::Null,
                };
                objects.insert(
                    key.clone(),
                    ObjectProperty {
                        title,
                        icon,
                        description,
                        required,
                        default,
                        spec: Tristate::from_option(prop.spec.clone()),
                    },
                );
            },
            None => {
                tracing::warn!(property = %key, kind = %prop.kind, "skipping property of unsupported type");
            },
        }
    }

    Ok(BlueprintProperties {
        string_props: refreshed_map(&prior.string_props, strings),
        number_props: refreshed_map(&prior.number_props, numbers),
        boolean_props: refreshed_map(&prior.boolean_props, booleans),
        array_props: refreshed_map(&prior.array_props, arrays),
        object_props: refreshed_map(&prior.object_props, objects),
    })
}

fn literal_int(value: &Option<JqOr<i64>>) -> Tristate<i64> {
    match value {
        Some(JqOr::Literal(v)) => Tristate::Known(*v),
        _ => Tristate::Null,
    }
}

fn refresh_items(
    array: &mut ArrayProperty,
    prop: &api::Property,
    json: &Canonicalizer,
) -> Result<(), ProviderError> {
    let default = match &prop.default {
        Some(JqOr::Literal(Value::Array(items))) => Some(items.as_slice()),
        _ => None,
    };
    let Some(items) = &prop.items else {
        return Ok(());
    };
    match Domain::from_wire(&items.kind) {
        Some(Domain::String) => {
            array.string_items = Tristate::Known(StringItems {
                format: Tristate::from_option(items.format.clone()),
                pattern: Tristate::from_option(items.pattern.clone()),
                default: Tristate::from_option(default.map(values_to_strings)),
                enum_values: Tristate::from_option(
                    literal_list(&items.enum_values).map(|v| values_to_strings(v)),
                ),
            });
        },
        Some(Domain::Number) => {
            array.number_items = Tristate::Known(NumberItems {
                default: Tristate::from_option(default.map(values_to_numbers)),
                enum_values: Tristate::from_option(
                    literal_list(&items.enum_values).map(|v| values_to_numbers(v)),
                ),
            });
        },
        Some(Domain::Boolean) => {
            array.boolean_items = Tristate::Known(BooleanItems {
                default: Tristate::from_option(
                    default.map(|d| d.iter().filter_map(Value::as_bool).collect()),
                ),
            });
        },
        Some(Domain::Object) => {
            let default = match default {
                Some(d) => Tristate::Known(
                    d.iter()
                        .map(|v| json.render(v))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                None => Tristate::Null,
            };
            array.object_items = Tristate::Known(ObjectItems { default });
        },
        _ => {},
    }
    Ok(())
}

/// Specification kinds a string property may embed.
pub const SPEC_KINDS: &[&str] = &["open-api", "async-api", "embedded-url"];

/// Specification kinds an object property may embed.
pub const OBJECT_SPEC_KINDS: &[&str] = &["async-api", "open-api"];

/// Formats a string property may declare.
pub const STRING_FORMATS: &[&str] = &[
    "date-time",
    "url",
    "email",
    "ipv4",
    "ipv6",
    "yaml",
    "entity",
    "user",
    "team",
    "timer",
    "proto",
    "markdown",
];

fn common(block: Block) -> Block {
    block
        .with_attribute("title", Attribute::optional_string())
        .with_attribute("icon", Attribute::optional_string())
        .with_attribute("description", Attribute::optional_string())
        .with_attribute("required", Attribute::defaulted_bool(false))
}

fn non_negative() -> Attribute {
    Attribute::optional_int64().with_validator(Validator::AtLeast(0))
}

fn unique_list(element: AttributeType) -> Attribute {
    Attribute::optional_list(element).with_validator(Validator::UniqueNonEmpty)
}

/// Declarative shape of blueprint `properties`.
pub fn schema_block() -> Block {
    let string_props = common(Block::new())
        .with_attribute("default", Attribute::optional_string())
        .with_attribute("format", Attribute::optional_string().one_of(STRING_FORMATS))
        .with_attribute("min_length", non_negative())
        .with_attribute("max_length", non_negative())
        .with_attribute("pattern", Attribute::optional_string())
        .with_attribute("enum", unique_list(AttributeType::String))
        .with_attribute("enum_colors", Attribute::optional_map(AttributeType::String))
        .with_attribute(
            "spec",
            Attribute::optional_string().one_of(SPEC_KINDS),
        )
        .with_block(
            "spec_authentication",
            NestedBlock::single(
                Block::new()
                    .with_attribute("authorization_url", Attribute::required_string())
                    .with_attribute("token_url", Attribute::required_string())
                    .with_attribute("client_id", Attribute::required_string()),
            ),
        );

    let number_props = common(Block::new())
        .with_attribute("default", Attribute::optional_float64())
        .with_attribute("minimum", Attribute::optional_float64())
        .with_attribute("maximum", Attribute::optional_float64())
        .with_attribute("enum", unique_list(AttributeType::Float64))
        .with_attribute("enum_colors", Attribute::optional_map(AttributeType::String));

    let boolean_props = common(Block::new()).with_attribute("default", Attribute::optional_bool());

    let array_props = common(Block::new())
        .with_attribute("min_items", non_negative())
        .with_attribute("max_items", non_negative())
        .with_block(
            "string_items",
            NestedBlock::single(
                Block::new()
                    .with_attribute("format", Attribute::optional_string().one_of(STRING_FORMATS))
                    .with_attribute("pattern", Attribute::optional_string())
                    .with_attribute("default", Attribute::optional_list(AttributeType::String))
                    .with_attribute("enum", unique_list(AttributeType::String)),
            ),
        )
        .with_block(
            "number_items",
            NestedBlock::single(
                Block::new()
                    .with_attribute("default", Attribute::optional_list(AttributeType::Float64))
                    .with_attribute("enum", unique_list(AttributeType::Float64)),
            ),
        )
        .with_block(
            "boolean_items",
            NestedBlock::single(
                Block::new()
                    .with_attribute("default", Attribute::optional_list(AttributeType::Bool)),
            ),
        )
        .with_block(
            "object_items",
            NestedBlock::single(Block::new().with_attribute(
                "default",
                Attribute::optional_list(AttributeType::String).json(),
            )),
        )
        .with_at_most_one_of(&["string_items", "number_items", "boolean_items", "object_items"]);

    let object_props = common(Block::new())
        .with_attribute("default", Attribute::optional_string().json())
        .with_attribute("spec", Attribute::optional_string().one_of(OBJECT_SPEC_KINDS));

    Block::new()
        .with_block("string_props", NestedBlock::map(string_props))
        .with_block("number_props", NestedBlock::map(number_props))
        .with_block("boolean_props", NestedBlock::map(boolean_props))
        .with_block("array_props", NestedBlock::map(array_props))
        .with_block("object_props", NestedBlock::map(object_props))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn microservice_props() -> BlueprintProperties {
        serde_json::from_value(json!({
            "string_props": {
                "env": {
                    "title": "Env",
                    "required": false,
                    "default": "dev",
                    "enum": ["dev", "prod"],
                    "enum_colors": {"dev": "blue", "prod": "green"}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_project_string_property_with_enum_colors() {
        let schema = project(&microservice_props()).unwrap();
        let wire = serde_json::to_value(&schema).unwrap();

        assert_eq!(
            wire,
            json!({
                "properties": {
                    "env": {
                        "type": "string",
                        "title": "Env",
                        "default": "dev",
                        "enum": ["dev", "prod"],
                        "enumColors": {"dev": "blue", "prod": "green"}
                    }
                },
                "required": []
            })
        );
    }

    #[test]
    fn test_round_trip_is_stable() {
        let json = Canonicalizer::new(true);
        let declared: BlueprintProperties = serde_json::from_value(json!({
            "string_props": {
                "env": {"title": "Env", "required": true, "enum": ["dev", "prod"], "enum_colors": {"dev": "blue"}}
            },
            "number_props": {
                "replicas": {"required": false, "default": 2.0, "minimum": 0.0, "enum": [1.0, 2.0], "enum_colors": {"1": "red", "2": "green"}}
            },
            "boolean_props": {"public": {"required": false, "default": true}},
            "array_props": {
                "tags": {"required": false, "min_items": 0, "string_items": {"format": "user", "default": []}},
                "ports": {"required": false, "number_items": {"default": [80.0, 443.0]}}
            },
            "object_props": {"meta": {"required": false, "default": "{\"a\":1,\"b\":[true]}", "spec": "open-api"}}
        }))
        .unwrap();

        let wire = project(&declared).unwrap();
        assert_eq!(wire.required, vec!["env".to_string()]);

        let refreshed = refresh(&wire, &declared, &json).unwrap();
        assert_eq!(refreshed, declared);
        assert_eq!(project(&refreshed).unwrap(), wire);
    }

    #[test]
    fn test_empty_array_default_is_not_absent() {
        let json = Canonicalizer::new(true);
        let declared: BlueprintProperties = serde_json::from_value(json!({
            "array_props": {"tags": {"required": false, "string_items": {"default": []}}}
        }))
        .unwrap();

        let wire = project(&declared).unwrap();
        assert_eq!(
            wire.properties["tags"].default,
            Some(JqOr::Literal(json!([])))
        );

        let refreshed = refresh(&wire, &declared, &json).unwrap();
        let items = refreshed.array_props.known().unwrap()["tags"]
            .string_items
            .cloned()
            .unwrap();
        assert_eq!(items.default, Tristate::Known(vec![]));
    }

    #[test]
    fn test_two_items_variants_rejected() {
        let declared: BlueprintProperties = serde_json::from_value(json!({
            "array_props": {"bad": {"string_items": {}, "number_items": {}}}
        }))
        .unwrap();
        let err = project(&declared).unwrap_err();
        assert!(err.to_string().contains("properties.array_props.bad"));
    }

    #[test]
    fn test_malformed_object_default() {
        let declared: BlueprintProperties = serde_json::from_value(json!({
            "object_props": {"meta": {"default": "{nope"}}
        }))
        .unwrap();
        let err = project(&declared).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::InvalidJson { ref attribute, .. } if attribute == "properties.object_props.meta.default"
        ));
    }

    #[test]
    fn test_refresh_skips_unsupported_types() {
        let wire: api::BlueprintSchema = serde_json::from_value(json!({
            "properties": {"when": {"type": "date"}, "name": {"type": "string"}},
            "required": []
        }))
        .unwrap();
        let refreshed = refresh(&wire, &BlueprintProperties::default(), &Canonicalizer::default()).unwrap();
        assert_eq!(refreshed.keys(), vec!["name"]);
    }

    mod laws {
        use super::*;
        use crate::properties::strategies::{keyed, maybe, object_text, quarter, text};
        use proptest::prelude::*;

        fn string_property() -> impl Strategy<Value = StringProperty> {
            (
                maybe(text()),
                maybe(text()),
                maybe(any::<bool>()),
                maybe(text()),
                maybe(prop::collection::vec(text(), 0..3)),
                maybe(prop::collection::btree_map(text(), text(), 0..3)),
                maybe(prop::sample::select(STRING_FORMATS)),
                maybe(0i64..64),
            )
                .prop_map(|(title, description, required, default, enum_values, enum_colors, format, max_length)| {
                    StringProperty {
                        title,
                        description,
                        required,
                        default,
                        enum_values,
                        enum_colors,
                        format: format.map(str::to_string),
                        max_length,
                        ..Default::default()
                    }
                })
        }

        fn number_property() -> impl Strategy<Value = NumberProperty> {
            (
                maybe(text()),
                maybe(any::<bool>()),
                maybe(quarter()),
                maybe(quarter()),
                maybe(prop::collection::vec(quarter(), 0..3)),
            )
                .prop_map(|(title, required, default, minimum, enum_values)| NumberProperty {
                    title,
                    required,
                    default,
                    minimum,
                    enum_values,
                    ..Default::default()
                })
        }

        fn boolean_property() -> impl Strategy<Value = BooleanProperty> {
            (maybe(text()), maybe(any::<bool>()), maybe(any::<bool>())).prop_map(
                |(icon, required, default)| BooleanProperty {
                    icon,
                    required,
                    default,
                    ..Default::default()
                },
            )
        }

        fn array_property() -> impl Strategy<Value = ArrayProperty> {
            let items = prop_oneof![
                Just(ArrayProperty::default()),
                (maybe(prop::collection::vec(text(), 0..3)), maybe(text())).prop_map(|(default, pattern)| {
                    ArrayProperty {
                        string_items: Tristate::Known(StringItems {
                            default,
                            pattern,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }
                }),
                maybe(prop::collection::vec(quarter(), 0..3)).prop_map(|default| ArrayProperty {
                    number_items: Tristate::Known(NumberItems {
                        default,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                maybe(prop::collection::vec(any::<bool>(), 0..3)).prop_map(|default| ArrayProperty {
                    boolean_items: Tristate::Known(BooleanItems { default }),
                    ..Default::default()
                }),
                maybe(prop::collection::vec(object_text(), 0..3)).prop_map(|default| ArrayProperty {
                    object_items: Tristate::Known(ObjectItems { default }),
                    ..Default::default()
                }),
            ];
            (items, maybe(any::<bool>()), maybe(0i64..5), maybe(text())).prop_map(
                |(items, required, min_items, description)| ArrayProperty {
                    required,
                    min_items,
                    description,
                    ..items
                },
            )
        }

        fn object_property() -> impl Strategy<Value = ObjectProperty> {
            (
                maybe(text()),
                maybe(any::<bool>()),
                maybe(object_text()),
                maybe(prop::sample::select(OBJECT_SPEC_KINDS)),
            )
                .prop_map(|(title, required, default, spec)| ObjectProperty {
                    title,
                    required,
                    default,
                    spec: spec.map(str::to_string),
                    ..Default::default()
                })
        }

        fn properties() -> impl Strategy<Value = BlueprintProperties> {
            (
                keyed("s_", string_property()),
                keyed("n_", number_property()),
                keyed("b_", boolean_property()),
                keyed("a_", array_property()),
                keyed("o_", object_property()),
            )
                .prop_map(|(string_props, number_props, boolean_props, array_props, object_props)| {
                    BlueprintProperties {
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
            fn project_refresh_project_is_project(declared in properties(), escape in any::<bool>()) {
                let json = Canonicalizer::new(escape);
                let wire = project(&declared).unwrap();
                let refreshed = refresh(&wire, &declared, &json).unwrap();
                prop_assert_eq!(project(&refreshed).unwrap(), wire);
            }

            #[test]
            fn refresh_keeps_every_declared_key(declared in properties()) {
                let wire = project(&declared).unwrap();
                let refreshed = refresh(&wire, &declared, &Canonicalizer::default()).unwrap();
                let mut keys = refreshed.keys();
                let mut expected = declared.keys();
                keys.sort_unstable();
                expected.sort_unstable();
                prop_assert_eq!(keys, expected);
            }
        }
    }
}
