//! Action user inputs.
//!
//! Inputs share the blueprint property shape but most scalars may instead be a
//! JQ expression evaluated by the Portal when the form is rendered. Each such
//! field has a `*_jq_query` sibling; on the wire the pair collapses into a
//! single [`JqOr`] value, with the expression winning when both are set.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::blueprint::{
    literal_list, numbers_to_values, strings_to_values, values_to_numbers, values_to_strings,
};
use super::{entries, refreshed_map, Domain, PropertyBag};
use crate::api;
use crate::canonical::{parse_json, Canonicalizer};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Block, NestedBlock, Validator};
use crate::value::{split_jq, JqOr, Tristate};

/// User inputs declared on an action.
pub type ActionInputs =
    PropertyBag<StringInput, NumberInput, BooleanInput, ArrayInput, ObjectInput>;

/// Entity filter for inputs that select entities.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub combinator: String,
    #[serde(default)]
    pub rules: Vec<DatasetRule>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetRule {
    #[serde(default)]
    pub property: Tristate<String>,
    pub operator: String,
    #[serde(default)]
    pub blueprint: Tristate<String>,
    pub value: DatasetValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetValue {
    pub jq_query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntitySort {
    pub property: String,
    pub order: String,
}

/// Visibility and dependency controls shared by every input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputControls {
    pub visible: Tristate<bool>,
    pub visible_jq_query: Tristate<String>,
    pub disabled: Tristate<bool>,
    pub disabled_jq_query: Tristate<String>,
    pub depends_on: Tristate<Vec<String>>,
    pub dataset: Tristate<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StringInput {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub default: Tristate<String>,
    pub default_jq_query: Tristate<String>,
    pub format: Tristate<String>,
    pub blueprint: Tristate<String>,
    pub min_length: Tristate<i64>,
    pub max_length: Tristate<i64>,
    pub pattern: Tristate<String>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<String>>,
    pub enum_jq_query: Tristate<String>,
    pub sort: Tristate<EntitySort>,
    #[serde(flatten)]
    pub controls: InputControls,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberInput {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub default: Tristate<f64>,
    pub default_jq_query: Tristate<String>,
    pub minimum: Tristate<f64>,
    pub maximum: Tristate<f64>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<f64>>,
    pub enum_jq_query: Tristate<String>,
    #[serde(flatten)]
    pub controls: InputControls,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanInput {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub default: Tristate<bool>,
    pub default_jq_query: Tristate<String>,
    #[serde(flatten)]
    pub controls: InputControls,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayInput {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    pub default_jq_query: Tristate<String>,
    pub min_items: Tristate<i64>,
    pub min_items_jq_query: Tristate<String>,
    pub max_items: Tristate<i64>,
    pub max_items_jq_query: Tristate<String>,
    pub string_items: Tristate<StringInputItems>,
    pub number_items: Tristate<NumberInputItems>,
    pub boolean_items: Tristate<BooleanInputItems>,
    pub object_items: Tristate<ObjectInputItems>,
    #[serde(flatten)]
    pub controls: InputControls,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StringInputItems {
    pub format: Tristate<String>,
    pub blueprint: Tristate<String>,
    pub pattern: Tristate<String>,
    pub default: Tristate<Vec<String>>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<String>>,
    pub enum_jq_query: Tristate<String>,
    pub dataset: Tristate<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberInputItems {
    pub default: Tristate<Vec<f64>>,
    #[serde(rename = "enum")]
    pub enum_values: Tristate<Vec<f64>>,
    pub enum_jq_query: Tristate<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanInputItems {
    pub default: Tristate<Vec<bool>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectInputItems {
    pub default: Tristate<Vec<String>>,
}

/// The single populated items variant of an array input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputItems<'a> {
    String(&'a StringInputItems),
    Number(&'a NumberInputItems),
    Boolean(&'a BooleanInputItems),
    Object(&'a ObjectInputItems),
}

impl ArrayInput {
    /// The populated items variant, rejecting more than one.
    pub fn items(&self, path: &str) -> Result<Option<InputItems<'_>>, ProviderError> {
        let candidates = [
            self.string_items.known().map(InputItems::String),
            self.number_items.known().map(InputItems::Number),
            self.boolean_items.known().map(InputItems::Boolean),
            self.object_items.known().map(InputItems::Object),
        ];
        let mut found = candidates.into_iter().flatten();
        let first = found.next();
        if found.next().is_some() {
            return Err(ProviderError::Validation(format!(
                "'{}' may declare only one of string_items, number_items, boolean_items, object_items",
                path
            )));
        }
        Ok(first)
    }
}

fn wire_dataset(dataset: &Dataset) -> api::Dataset {
    api::Dataset {
        combinator: dataset.combinator.clone(),
        rules: dataset
            .rules
            .iter()
            .map(|r| api::DatasetRule {
                property: r.property.cloned(),
                operator: r.operator.clone(),
                blueprint: r.blueprint.cloned(),
                value: JqOr::Jq {
                    jq_query: r.value.jq_query.clone(),
                },
            })
            .collect(),
    }
}

fn declared_dataset(dataset: &api::Dataset) -> Dataset {
    Dataset {
        combinator: dataset.combinator.clone(),
        rules: dataset
            .rules
            .iter()
            .map(|r| DatasetRule {
                property: Tristate::from_option(r.property.clone()),
                operator: r.operator.clone(),
                blueprint: Tristate::from_option(r.blueprint.clone()),
                value: DatasetValue {
                    jq_query: match &r.value {
                        JqOr::Jq { jq_query } => jq_query.clone(),
                        JqOr::Literal(v) => v.to_string(),
                    },
                },
            })
            .collect(),
    }
}

fn pair<T>(literal: Option<T>, jq: &Tristate<String>) -> Option<JqOr<T>> {
    JqOr::from_pair(literal, jq.cloned())
}

fn apply_controls(prop: &mut api::Property, controls: &InputControls) {
    prop.visible = pair(controls.visible.cloned(), &controls.visible_jq_query);
    prop.disabled = pair(controls.disabled.cloned(), &controls.disabled_jq_query);
    prop.depends_on = controls.depends_on.cloned();
    prop.dataset = controls.dataset.known().map(wire_dataset);
}

fn refresh_controls(prop: &api::Property) -> InputControls {
    let (visible, visible_jq_query) = split_jq(prop.visible.clone());
    let (disabled, disabled_jq_query) = split_jq(prop.disabled.clone());
    InputControls {
        visible,
        visible_jq_query,
        disabled,
        disabled_jq_query,
        depends_on: Tristate::from_option(prop.depends_on.clone()),
        dataset: Tristate::from_option(prop.dataset.as_ref().map(declared_dataset)),
    }
}

/// Split a JQ-capable wire value and decode its literal side as `T`.
fn split_value<T: DeserializeOwned>(value: &Option<JqOr<Value>>) -> (Tristate<T>, Tristate<String>) {
    let (literal, jq) = split_jq(value.clone());
    let literal = match literal {
        Tristate::Known(v) if !v.is_null() => serde_json::from_value(v)
            .map(Tristate::Known)
            .unwrap_or(Tristate::Null),
        _ => Tristate::Null,
    };
    (literal, jq)
}

fn split_list(value: &Option<JqOr<Vec<Value>>>) -> (Option<&Vec<Value>>, Tristate<String>) {
    match value {
        Some(JqOr::Jq { jq_query }) => (None, Tristate::Known(jq_query.clone())),
        _ => (literal_list(value), Tristate::Null),
    }
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

/// Project declared inputs to the wire `userInputs` member (without `order`).
///
/// A known `required_jq_query` replaces the per-input `required` flags.
pub fn project(
    inputs: &ActionInputs,
    required_jq_query: &Tristate<String>,
) -> Result<api::UserInputs, ProviderError> {
    let mut properties = BTreeMap::new();
    let mut required = Vec::new();

    for (key, p) in entries(&inputs.string_props) {
        let mut prop = base(Domain::String, &p.title, &p.icon, &p.description);
        prop.default = pair(p.default.cloned().map(Value::String), &p.default_jq_query);
        prop.format = p.format.cloned();
        prop.blueprint = p.blueprint.cloned();
        prop.min_length = p.min_length.cloned();
        prop.max_length = p.max_length.cloned();
        prop.pattern = p.pattern.cloned();
        prop.enum_values = pair(
            p.enum_values.known().map(|v| strings_to_values(v)),
            &p.enum_jq_query,
        );
        prop.sort = p.sort.known().map(|s| api::EntitySort {
            property: s.property.clone(),
            order: s.order.clone(),
        });
        apply_controls(&mut prop, &p.controls);
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&inputs.number_props) {
        let mut prop = base(Domain::Number, &p.title, &p.icon, &p.description);
        prop.default = pair(p.default.cloned().map(Value::from), &p.default_jq_query);
        prop.minimum = p.minimum.cloned();
        prop.maximum = p.maximum.cloned();
        prop.enum_values = pair(
            p.enum_values.known().map(|v| numbers_to_values(v)),
            &p.enum_jq_query,
        );
        apply_controls(&mut prop, &p.controls);
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&inputs.boolean_props) {
        let mut prop = base(Domain::Boolean, &p.title, &p.icon, &p.description);
        prop.default = pair(p.default.cloned().map(Value::Bool), &p.default_jq_query);
        apply_controls(&mut prop, &p.controls);
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&inputs.array_props) {
        let path = format!("user_properties.array_props.{}", key);
        let mut prop = base(Domain::Array, &p.title, &p.icon, &p.description);
        prop.min_items = pair(p.min_items.cloned(), &p.min_items_jq_query);
        prop.max_items = pair(p.max_items.cloned(), &p.max_items_jq_query);
        let (items, default) = project_items(p.items(&path)?, &path)?;
        prop.items = items;
        prop.default = pair(default, &p.default_jq_query);
        apply_controls(&mut prop, &p.controls);
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        properties.insert(key.clone(), prop);
    }

    for (key, p) in entries(&inputs.object_props) {
        let mut prop = base(Domain::Object, &p.title, &p.icon, &p.description);
        let literal = match p.default.known() {
            Some(raw) => Some(parse_json(
                &format!("user_properties.object_props.{}.default", key),
                raw,
            )?),
            None => None,
        };
        prop.default = pair(literal, &p.default_jq_query);
        apply_controls(&mut prop, &p.controls);
        if p.required.unwrap_or(false) {
            required.push(key.clone());
        }
        properties.insert(key.clone(), prop);
    }

    let required = match required_jq_query.known() {
        Some(jq_query) => JqOr::Jq {
            jq_query: jq_query.clone(),
        },
        None => {
            required.sort();
            JqOr::Literal(required)
        },
    };

    Ok(api::UserInputs {
        properties,
        required: Some(required),
        order: None,
    })
}

fn project_items(
    items: Option<InputItems<'_>>,
    path: &str,
) -> Result<(Option<api::Items>, Option<Value>), ProviderError> {
    let Some(items) = items else {
        return Ok((None, None));
    };
    Ok(match items {
        InputItems::String(i) => (
            Some(api::Items {
                kind: "string".to_string(),
                format: i.format.cloned(),
                pattern: i.pattern.cloned(),
                blueprint: i.blueprint.cloned(),
                enum_values: pair(
                    i.enum_values.known().map(|v| strings_to_values(v)),
                    &i.enum_jq_query,
                ),
                dataset: i.dataset.known().map(wire_dataset),
            }),
            i.default.known().map(|d| Value::Array(strings_to_values(d))),
        ),
        InputItems::Number(i) => (
            Some(api::Items {
                kind: "number".to_string(),
                enum_values: pair(
                    i.enum_values.known().map(|v| numbers_to_values(v)),
                    &i.enum_jq_query,
                ),
                ..Default::default()
            }),
            i.default.known().map(|d| Value::Array(numbers_to_values(d))),
        ),
        InputItems::Boolean(i) => (
            Some(api::Items {
                kind: "boolean".to_string(),
                ..Default::default()
            }),
            i.default
                .known()
                .map(|d| Value::Array(d.iter().copied().map(Value::Bool).collect())),
        ),
        InputItems::Object(i) => {
            let default = match i.default.known() {
                Some(d) => Some(Value::Array(
                    d.iter()
                        .enumerate()
                        .map(|(n, raw)| {
                            parse_json(&format!("{}.object_items.default.{}", path, n), raw)
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                )),
                None => None,
            };
            (
                Some(api::Items {
                    kind: "object".to_string(),
                    ..Default::default()
                }),
                default,
            )
        },
    })
}

/// Rebuild declared inputs from the wire `userInputs` member.
///
/// Returns the inputs and the whole-form `required_jq_query`, if any.
pub fn refresh(
    user_inputs: &api::UserInputs,
    prior: &ActionInputs,
    json: &Canonicalizer,
) -> Result<(ActionInputs, Tristate<String>), ProviderError> {
    let (required_keys, required_jq_query) = match &user_inputs.required {
        Some(JqOr::Jq { jq_query }) => (Vec::new(), Tristate::Known(jq_query.clone())),
        Some(JqOr::Literal(keys)) => (keys.clone(), Tristate::Null),
        None => (Vec::new(), Tristate::Null),
    };

    let mut strings = BTreeMap::new();
    let mut numbers = BTreeMap::new();
    let mut booleans = BTreeMap::new();
    let mut arrays = BTreeMap::new();
    let mut objects = BTreeMap::new();

    for (key, prop) in &user_inputs.properties {
        let required = Tristate::Known(required_keys.contains(key));
        let title = Tristate::from_option(prop.title.clone());
        let icon = Tristate::from_option(prop.icon.clone());
        let description = Tristate::from_option(prop.description.clone());
        let controls = refresh_controls(prop);

        match Domain::from_wire(&prop.kind) {
            Some(Domain::String) => {
                let (default, default_jq_query) = split_value(&prop.default);
                let (enum_values, enum_jq_query) = split_list(&prop.enum_values);
                strings.insert(
                    key.clone(),
                    StringInput {
                        title,
                        icon,
                        description,
                        required,
                        default,
                        default_jq_query,
                        format: Tristate::from_option(prop.format.clone()),
                        blueprint: Tristate::from_option(prop.blueprint.clone()),
                        min_length: Tristate::from_option(prop.min_length),
                        max_length: Tristate::from_option(prop.max_length),
                        pattern: Tristate::from_option(prop.pattern.clone()),
                        enum_values: Tristate::from_option(enum_values.map(|v| values_to_strings(v))),
                        enum_jq_query,
                        sort: Tristate::from_option(prop.sort.as_ref().map(|s| EntitySort {
                            property: s.property.clone(),
                            order: s.order.clone(),
                        })),
                        controls,
                    },
                );
            },
            Some(Domain::Number) => {
                let (default, default_jq_query) = split_value(&prop.default);
                let (enum_values, enum_jq_query) = split_list(&prop.enum_values);
                numbers.insert(
                    key.clone(),
                    NumberInput {
                        title,
                        icon,
                        description,
                        required,
                        default,
                        default_jq_query,
                        minimum: Tristate::from_option(prop.minimum),
                        maximum: Tristate::from_option(prop.maximum),
                        enum_values: Tristate::from_option(enum_values.map(|v| values_to_numbers(v))),
                        enum_jq_query,
                        controls,
                    },
                );
            },
            Some(Domain::Boolean) => {
                let (default, default_jq_query) = split_value(&prop.default);
                booleans.insert(
                    key.clone(),
                    BooleanInput {
                        title,
                        icon,
                        description,
                        required,
                        default,
                        default_jq_query,
                        controls,
                    },
                );
            },
            Some(Domain::Array) => {
                let (min_items, min_items_jq_query) = split_jq(prop.min_items.clone());
                let (max_items, max_items_jq_query) = split_jq(prop.max_items.clone());
                let (default, default_jq_query) = split_jq(prop.default.clone());
                let mut input = ArrayInput {
                    title,
                    icon,
                    description,
                    required,
                    default_jq_query,
                    min_items,
                    min_items_jq_query,
                    max_items,
                    max_items_jq_query,
                    controls,
                    ..Default::default()
                };
                let default = match default {
                    Tristate::Known(Value::Array(items)) => Some(items),
                    _ => None,
                };
                refresh_items(&mut input, prop.items.as_ref(), default.as_deref(), json)?;
                arrays.insert(key.clone(), input);
            },
            Some(Domain::Object) => {
                let (literal, default_jq_query) = split_jq(prop.default.clone());
                let default = match literal {
                    Tristate::Known(v) if !v.is_null() => Tristate::Known(json.render(&v)?),
                    _ => Tristate::Null,
                };
                objects.insert(
                    key.clone(),
                    ObjectInput {
                        title,
                        icon,
                        description,
                        required,
                        default,
                        default_jq_query,
                        controls,
                    },
                );
            },
            None => {
                tracing::warn!(input = %key, kind = %prop.kind, "skipping input of unsupported type");
            },
        }
    }

    let inputs = ActionInputs {
        string_props: refreshed_map(&prior.string_props, strings),
        number_props: refreshed_map(&prior.number_props, numbers),
        boolean_props: refreshed_map(&prior.boolean_props, booleans),
        array_props: refreshed_map(&prior.array_props, arrays),
        object_props: refreshed_map(&prior.object_props, objects),
    };
    Ok((inputs, required_jq_query))
}

fn refresh_items(
    input: &mut ArrayInput,
    items: Option<&api::Items>,
    default: Option<&[Value]>,
    json: &Canonicalizer,
) -> Result<(), ProviderError> {
    let Some(items) = items else {
        return Ok(());
    };
    match Domain::from_wire(&items.kind) {
        Some(Domain::String) => {
            let (enum_values, enum_jq_query) = split_list(&items.enum_values);
            input.string_items = Tristate::Known(StringInputItems {
                format: Tristate::from_option(items.format.clone()),
                blueprint: Tristate::from_option(items.blueprint.clone()),
                pattern: Tristate::from_option(items.pattern.clone()),
                default: Tristate::from_option(default.map(values_to_strings)),
                enum_values: Tristate::from_option(enum_values.map(|v| values_to_strings(v))),
                enum_jq_query,
                dataset: Tristate::from_option(items.dataset.as_ref().map(declared_dataset)),
            });
        },
        Some(Domain::Number) => {
            let (enum_values, enum_jq_query) = split_list(&items.enum_values);
            input.number_items = Tristate::Known(NumberInputItems {
                default: Tristate::from_option(default.map(values_to_numbers)),
                enum_values: Tristate::from_option(enum_values.map(|v| values_to_numbers(v))),
                enum_jq_query,
            });
        },
        Some(Domain::Boolean) => {
            input.boolean_items = Tristate::Known(BooleanInputItems {
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
            input.object_items = Tristate::Known(ObjectInputItems { default });
        },
        _ => {},
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectInput {
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub required: Tristate<bool>,
    /// JSON object rendered as a string.
    pub default: Tristate<String>,
    pub default_jq_query: Tristate<String>,
    #[serde(flatten)]
    pub controls: InputControls,
}

fn dataset_block() -> NestedBlock {
    NestedBlock::single(
        Block::new()
            .with_attribute(
                "combinator",
                Attribute::required_string().one_of(&["and", "or"]),
            )
            .with_block(
                "rules",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("property", Attribute::optional_string())
                        .with_attribute("operator", Attribute::required_string())
                        .with_attribute("blueprint", Attribute::optional_string())
                        .with_block(
                            "value",
                            NestedBlock::single(
                                Block::new()
                                    .with_attribute("jq_query", Attribute::required_string()),
                            )
                            .with_min_items(1),
                        ),
                ),
            ),
    )
}

fn jq_alternate(block: Block, name: &str, literal: Attribute) -> Block {
    let jq = format!("{}_jq_query", name);
    block
        .with_attribute(name, literal)
        .with_attribute(jq, Attribute::optional_string().conflicts_with(&[name]))
}

fn input(block: Block) -> Block {
    let block = block
        .with_attribute("title", Attribute::optional_string())
        .with_attribute("icon", Attribute::optional_string())
        .with_attribute("description", Attribute::optional_string())
        .with_attribute("required", Attribute::defaulted_bool(false))
        .with_attribute("depends_on", Attribute::optional_list(AttributeType::String))
        .with_block("dataset", dataset_block());
    let block = jq_alternate(block, "visible", Attribute::optional_bool());
    jq_alternate(block, "disabled", Attribute::optional_bool())
}

/// Declarative shape of action `user_properties`.
pub fn schema_block() -> Block {
    let string_props = input(Block::new())
        .with_attribute(
            "format",
            Attribute::optional_string().one_of(super::blueprint::STRING_FORMATS),
        )
        .with_attribute("blueprint", Attribute::optional_string())
        .with_attribute(
            "min_length",
            Attribute::optional_int64().with_validator(Validator::AtLeast(0)),
        )
        .with_attribute(
            "max_length",
            Attribute::optional_int64().with_validator(Validator::AtLeast(0)),
        )
        .with_attribute("pattern", Attribute::optional_string())
        .with_block(
            "sort",
            NestedBlock::single(
                Block::new()
                    .with_attribute("property", Attribute::required_string())
                    .with_attribute("order", Attribute::required_string().one_of(&["ASC", "DESC"])),
            ),
        );
    let string_props = jq_alternate(string_props, "default", Attribute::optional_string());
    let string_props = jq_alternate(
        string_props,
        "enum",
        Attribute::optional_list(AttributeType::String).with_validator(Validator::UniqueNonEmpty),
    );

    let number_props = input(Block::new())
        .with_attribute("minimum", Attribute::optional_float64())
        .with_attribute("maximum", Attribute::optional_float64());
    let number_props = jq_alternate(number_props, "default", Attribute::optional_float64());
    let number_props = jq_alternate(
        number_props,
        "enum",
        Attribute::optional_list(AttributeType::Float64).with_validator(Validator::UniqueNonEmpty),
    );

    let boolean_props = jq_alternate(input(Block::new()), "default", Attribute::optional_bool());

    let string_items = Block::new()
        .with_attribute(
            "format",
            Attribute::optional_string().one_of(super::blueprint::STRING_FORMATS),
        )
        .with_attribute("blueprint", Attribute::optional_string())
        .with_attribute("pattern", Attribute::optional_string())
        .with_attribute("default", Attribute::optional_list(AttributeType::String))
        .with_block("dataset", dataset_block());
    let string_items = jq_alternate(
        string_items,
        "enum",
        Attribute::optional_list(AttributeType::String).with_validator(Validator::UniqueNonEmpty),
    );
    let number_items = jq_alternate(
        Block::new().with_attribute("default", Attribute::optional_list(AttributeType::Float64)),
        "enum",
        Attribute::optional_list(AttributeType::Float64).with_validator(Validator::UniqueNonEmpty),
    );

    let array_props = input(Block::new())
        .with_attribute("default_jq_query", Attribute::optional_string())
        .with_block("string_items", NestedBlock::single(string_items))
        .with_block("number_items", NestedBlock::single(number_items))
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
    let array_props = jq_alternate(
        array_props,
        "min_items",
        Attribute::optional_int64().with_validator(Validator::AtLeast(0)),
    );
    let array_props = jq_alternate(
        array_props,
        "max_items",
        Attribute::optional_int64().with_validator(Validator::AtLeast(0)),
    );

    let object_props = jq_alternate(
        input(Block::new()),
        "default",
        Attribute::optional_string().json(),
    );

    Block::new()
        .with_block("string_props", NestedBlock::map(string_props))
        .with_block("number_props", NestedBlock::map(number_props))
        .with_block("boolean_props", NestedBlock::map(boolean_props))
        .with_block("array_props", NestedBlock::map(array_props))
        .with_block("object_props", NestedBlock::map(object_props))
}
