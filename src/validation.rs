//! Schema validation helpers.
//!
//! This module validates a resource configuration (`serde_json::Value`) against a
//! [`Schema`]: presence, types, nested block cardinality, per-attribute
//! [`Validator`]s and block-level [`BlockConstraint`]s. Values carrying the
//! unknown-until-apply marker are skipped; they are checked again once known.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_port::schema::{Schema, Attribute};
//! use hemmer_provider_port::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("identifier", Attribute::required_string())
//!     .with_attribute("average_of", Attribute::optional_string().one_of(&["hour", "day"]));
//!
//! let diagnostics = validate(&schema, &json!({"identifier": "svc", "average_of": "day"}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"identifier": "svc", "average_of": "year"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("average_of".to_string()));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockConstraint, BlockNestingMode, Diagnostic,
    DiagnosticSeverity, NestedBlock, Schema, Validator,
};
use crate::value::is_unknown;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{LazyLock, Mutex, PoisonError};

/// Compiled validator patterns, keyed by source.
static PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> = LazyLock::new(Default::default);

fn compiled(pattern: &str) -> Result<Regex, regex::Error> {
    let mut cache = PATTERNS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Attribute validators run on known values
/// - Nested blocks are validated recursively with min/max item constraints
/// - Exactly-one-of, at-most-one-of and required-when constraints are checked per block
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        v if is_unknown(v) => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value)))
                    .with_attribute_if_not_empty(path),
            );
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), obj, &attr_path, diagnostics);
    }

    for (name, nested_block) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested_block, obj.get(name), &block_path, diagnostics);
    }

    for constraint in &block.constraints {
        validate_constraint(constraint, obj, path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    siblings: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Computed-only attributes are set by the provider
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) if is_unknown(v) => {},
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before {
                for validator in &attr.validators {
                    run_validator(validator, v, siblings, path, diagnostics);
                }
            }
        },
    }
}

fn run_validator(
    validator: &Validator,
    value: &Value,
    siblings: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match validator {
        Validator::OneOf(allowed) => {
            if let Some(s) = value.as_str() {
                if !allowed.iter().any(|a| a == s) {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                            .with_detail(format!(
                                "Value must be one of [{}], got \"{}\"",
                                allowed.join(", "),
                                s
                            ))
                            .with_attribute(path),
                    );
                }
            }
        },
        Validator::Regex { pattern, message } => {
            let Some(s) = value.as_str() else { return };
            match compiled(pattern) {
                Ok(re) if re.is_match(s) => {},
                Ok(_) => diagnostics.push(
                    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                        .with_detail(message.clone())
                        .with_attribute(path),
                ),
                Err(e) => diagnostics.push(
                    Diagnostic::error(format!("Invalid pattern for attribute '{}'", path))
                        .with_detail(e.to_string())
                        .with_attribute(path),
                ),
            }
        },
        Validator::AtLeast(min) => {
            if let Some(n) = value.as_f64() {
                if n < *min as f64 {
                    diagnostics.push(
                        Diagnostic::error(format!("Value out of range for attribute '{}'", path))
                            .with_detail(format!("Value must be at least {}, got {}", min, n))
                            .with_attribute(path),
                    );
                }
            }
        },
        Validator::UniqueNonEmpty => {
            let Some(items) = value.as_array() else { return };
            if items.is_empty() {
                diagnostics.push(
                    Diagnostic::error(format!("Empty list for attribute '{}'", path))
                        .with_detail("List must contain at least one value")
                        .with_attribute(path),
                );
                return;
            }
            let mut seen = HashSet::new();
            for item in items {
                if !seen.insert(item.to_string()) {
                    diagnostics.push(
                        Diagnostic::error(format!("Duplicate value for attribute '{}'", path))
                            .with_detail(format!("Value {} appears more than once", item))
                            .with_attribute(path),
                    );
                    return;
                }
            }
        },
        Validator::Json => {
            if let Some(s) = value.as_str() {
                if let Err(e) = serde_json::from_str::<Value>(s) {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid JSON in '{}'", path))
                            .with_detail(e.to_string())
                            .with_attribute(path),
                    );
                }
            }
        },
        Validator::ConflictsWith(others) => {
            for other in others {
                if siblings.get(other).is_some_and(|v| !v.is_null()) {
                    diagnostics.push(
                        Diagnostic::error(format!("Conflicting attributes for '{}'", path))
                            .with_detail(format!("'{}' cannot be set together with '{}'", path, other))
                            .with_attribute(path),
                    );
                }
            }
        },
    }
}

fn validate_constraint(
    constraint: &BlockConstraint,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let BlockConstraint::RequiredWhen {
        member,
        sibling,
        equals,
    } = constraint
    {
        let triggered = obj.get(sibling).and_then(Value::as_str) == Some(equals.as_str());
        if triggered && !obj.get(member).is_some_and(|v| !v.is_null()) {
            let member_path = join_path(path, member);
            diagnostics.push(
                Diagnostic::error(format!("Missing required attribute '{}'", member_path))
                    .with_detail(format!(
                        "'{}' is required when '{}' is \"{}\"",
                        member_path,
                        join_path(path, sibling),
                        equals
                    ))
                    .with_attribute(member_path),
            );
        }
        return;
    }

    let members = constraint.members();
    if members
        .iter()
        .any(|m| obj.get(m).is_some_and(is_unknown))
    {
        return;
    }
    let set: Vec<&String> = members
        .iter()
        .filter(|m| obj.get(*m).is_some_and(|v| !v.is_null()))
        .collect();

    let requirement = match constraint {
        BlockConstraint::ExactlyOneOf(_) if set.len() != 1 => "Exactly one of",
        BlockConstraint::AtMostOneOf(_) if set.len() > 1 => "At most one of",
        _ => return,
    };
    let names: Vec<String> = members.iter().map(|m| join_path(path, m)).collect();
    diagnostics.push(
        Diagnostic::error("Invalid attribute combination")
            .with_detail(format!(
                "{} [{}] must be specified, got {}",
                requirement,
                names.join(", "),
                set.len()
            ))
            .with_attribute_if_not_empty(path),
    );
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Null collection elements are allowed
    if value.is_null() || is_unknown(value) {
        return;
    }
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
        AttributeType::Object(attrs) => {
            if let Some(obj) = value.as_object() {
                validate_object_type(attrs, obj, path, diagnostics);
            } else {
                diagnostics.push(type_error(path, "object", value));
            }
        },
        AttributeType::Dynamic => {},
    }
}

fn validate_object_type(
    attrs: &HashMap<String, AttributeType>,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, attr_type) in attrs {
        let attr_path = join_path(path, name);
        if let Some(value) = obj.get(name) {
            if !value.is_null() {
                validate_attribute_type(attr_type, value, &attr_path, diagnostics);
            }
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if value.is_some_and(is_unknown) {
        return;
    }
    match nested.nesting_mode {
        BlockNestingMode::Single => validate_single_block(nested, value, path, diagnostics),
        BlockNestingMode::List => validate_list_block(nested, value, path, diagnostics),
        BlockNestingMode::Map => validate_map_block(nested, value, path, diagnostics),
    }
}

fn validate_single_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required block '{}'", path))
                        .with_detail("At least one block is required")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_block(&nested.block, v, path, diagnostics),
    }
}

fn check_item_count(nested: &NestedBlock, len: u32, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }

    // max_items of 0 means unlimited
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }
}

fn validate_list_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        Some(Value::Array(arr)) => {
            check_item_count(nested, arr.len() as u32, path, diagnostics);
            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        },
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

fn validate_map_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        Some(Value::Object(obj)) => {
            check_item_count(nested, obj.len() as u32, path, diagnostics);
            for (key, item) in obj {
                let item_path = format!("{}.{}", path, key);
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        },
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected map for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            if n.as_i64().is_some() {
                true
            } else if let Some(f) = n.as_f64() {
                f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
            } else {
                false
            }
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}

trait DiagnosticExt {
    fn with_attribute_if_not_empty(self, path: &str) -> Self;
}

impl DiagnosticExt for Diagnostic {
    fn with_attribute_if_not_empty(self, path: &str) -> Self {
        if path.is_empty() {
            self
        } else {
            self.with_attribute(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use crate::value::UNKNOWN_VALUE;
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("identifier", Attribute::required_string());

        assert!(validate(&schema, &json!({"identifier": "svc"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("identifier".to_string()));

        let diagnostics = validate(&schema, &json!({"identifier": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_unknown_values_are_skipped() {
        let schema = Schema::v0()
            .with_attribute("count", Attribute::optional_int64())
            .with_attribute(
                "installation_id",
                Attribute::required_string().with_validator(Validator::Regex {
                    pattern: "^[a-z0-9_-]+$".to_string(),
                    message: "lowercase".to_string(),
                }),
            );

        let diagnostics = validate(
            &schema,
            &json!({"count": UNKNOWN_VALUE, "installation_id": UNKNOWN_VALUE}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("min_length", Attribute::optional_int64());

        assert!(validate(&schema, &json!({"min_length": 42})).is_empty());
        assert!(validate(&schema, &json!({"min_length": 42.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"min_length": 42.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"min_length": "42"})).len(), 1);
    }

    #[test]
    fn test_validate_list_and_map() {
        let schema = Schema::v0()
            .with_attribute("teams", Attribute::optional_list(AttributeType::String))
            .with_attribute("enum_colors", Attribute::optional_map(AttributeType::String));

        assert!(validate(&schema, &json!({"teams": [], "enum_colors": {"1": "red"}})).is_empty());

        let diagnostics = validate(&schema, &json!({"teams": ["a", 1]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("teams.1".to_string()));

        let diagnostics = validate(&schema, &json!({"enum_colors": {"dev": 3}}));
        assert_eq!(diagnostics[0].attribute, Some("enum_colors.dev".to_string()));
    }

    #[test]
    fn test_one_of_validator() {
        let schema = Schema::v0().with_attribute(
            "spec",
            Attribute::optional_string().one_of(&["open-api", "async-api", "embedded-url"]),
        );

        assert!(validate(&schema, &json!({"spec": "open-api"})).is_empty());

        let diagnostics = validate(&schema, &json!({"spec": "swagger"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("open-api, async-api, embedded-url"));
    }

    #[test]
    fn test_regex_validator() {
        let schema = Schema::v0().with_attribute(
            "path",
            Attribute::optional_string().with_validator(Validator::Regex {
                pattern: r"^\$relations\.[A-Za-z0-9_-]+$".to_string(),
                message: "path must reference a relation".to_string(),
            }),
        );

        assert!(validate(&schema, &json!({"path": "$relations.team"})).is_empty());

        let diagnostics = validate(&schema, &json!({"path": "relations.team"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail,
            Some("path must reference a relation".to_string())
        );
    }

    #[test]
    fn test_patterns_compiled_once() {
        let pattern = r"^compiled-once-[0-9]+$";
        let first = compiled(pattern).unwrap();
        let second = compiled(pattern).unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert!(PATTERNS.lock().unwrap().contains_key(pattern));

        assert!(compiled("(").is_err());
        assert!(!PATTERNS.lock().unwrap().contains_key("("));

        let schema = Schema::v0().with_attribute(
            "name",
            Attribute::optional_string().with_validator(Validator::Regex {
                pattern: "(".to_string(),
                message: "unused".to_string(),
            }),
        );
        let diagnostics = validate(&schema, &json!({"name": "x"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.starts_with("Invalid pattern"));
    }

    #[test]
    fn test_at_least_validator() {
        let schema = Schema::v0().with_attribute(
            "max_items",
            Attribute::optional_int64().with_validator(Validator::AtLeast(0)),
        );
        assert!(validate(&schema, &json!({"max_items": 0})).is_empty());
        assert_eq!(validate(&schema, &json!({"max_items": -1})).len(), 1);
    }

    #[test]
    fn test_unique_non_empty_validator() {
        let schema = Schema::v0().with_attribute(
            "enum",
            Attribute::optional_list(AttributeType::String)
                .with_validator(Validator::UniqueNonEmpty),
        );

        assert!(validate(&schema, &json!({"enum": ["dev", "prod"]})).is_empty());
        assert!(validate(&schema, &json!({"enum": []}))[0]
            .summary
            .contains("Empty list"));
        assert!(validate(&schema, &json!({"enum": ["dev", "dev"]}))[0]
            .summary
            .contains("Duplicate"));
    }

    #[test]
    fn test_json_validator() {
        let schema = Schema::v0().with_attribute(
            "query",
            Attribute::optional_string().with_validator(Validator::Json),
        );

        assert!(validate(&schema, &json!({"query": "{\"combinator\":\"and\"}"})).is_empty());
        let diagnostics = validate(&schema, &json!({"query": "{"}));
        assert_eq!(diagnostics[0].attribute, Some("query".to_string()));
    }

    #[test]
    fn test_conflicts_with_validator() {
        let schema = Schema::v0()
            .with_attribute(
                "default",
                Attribute::optional_string().conflicts_with(&["default_jq_query"]),
            )
            .with_attribute("default_jq_query", Attribute::optional_string());

        assert!(validate(&schema, &json!({"default": "x"})).is_empty());
        assert!(validate(&schema, &json!({"default": "x", "default_jq_query": null})).is_empty());

        let diagnostics = validate(&schema, &json!({"default": "x", "default_jq_query": "'y'"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("default".to_string()));
    }

    #[test]
    fn test_required_when_constraint() {
        let schema = Schema::v0().with_block(
            "ownership",
            NestedBlock::single(
                Block::new()
                    .with_attribute("type", Attribute::required_string())
                    .with_attribute("path", Attribute::optional_string())
                    .with_required_when("path", "type", "Inherited"),
            ),
        );

        assert!(validate(&schema, &json!({"ownership": {"type": "Direct"}})).is_empty());
        assert!(validate(
            &schema,
            &json!({"ownership": {"type": "Inherited", "path": UNKNOWN_VALUE}})
        )
        .is_empty());

        let diagnostics = validate(&schema, &json!({"ownership": {"type": "Inherited", "path": null}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("ownership.path".to_string()));
        assert!(diagnostics[0].detail.as_deref().unwrap().contains("Inherited"));
    }

    #[test]
    fn test_exactly_one_of_constraint() {
        let schema = Schema::v0()
            .with_block("kafka_method", NestedBlock::single(Block::new()))
            .with_block(
                "webhook_method",
                NestedBlock::single(Block::new().with_attribute("url", Attribute::required_string())),
            )
            .with_exactly_one_of(&["kafka_method", "webhook_method"]);

        assert!(validate(&schema, &json!({"kafka_method": {}})).is_empty());

        let none = validate(&schema, &json!({}));
        assert_eq!(none.len(), 1);
        assert!(none[0].detail.as_deref().unwrap().contains("got 0"));

        let both = validate(
            &schema,
            &json!({"kafka_method": {}, "webhook_method": {"url": "https://x"}}),
        );
        assert_eq!(both.len(), 1);
        assert!(both[0].detail.as_deref().unwrap().contains("got 2"));
    }

    #[test]
    fn test_at_most_one_of_constraint_in_nested_block() {
        let method = Block::new()
            .with_attribute("count_entities", Attribute::optional_bool())
            .with_block("average_entities", NestedBlock::single(Block::new()))
            .with_at_most_one_of(&["count_entities", "average_entities"]);
        let schema = Schema::v0().with_block(
            "properties",
            NestedBlock::map(Block::new().with_block("method", NestedBlock::single(method))),
        );

        assert!(validate(&schema, &json!({"properties": {"n": {"method": {"count_entities": true}}}}))
            .is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"properties": {"n": {"method": {"count_entities": true, "average_entities": {}}}}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("properties.n.method".to_string())
        );
    }

    #[test]
    fn test_validate_nested_block_list() {
        let schema = Schema::v0().with_block(
            "path_filter",
            NestedBlock::list(Block::new().with_attribute(
                "path",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::required(),
                ),
            ))
            .with_max_items(2),
        );

        assert!(validate(&schema, &json!({"path_filter": [{"path": ["a", "b"]}]})).is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"path_filter": [{"path": []}, {"path": []}, {"path": []}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 2"));

        let diagnostics = validate(&schema, &json!({"path_filter": [{"path": "a"}]}));
        assert_eq!(diagnostics[0].attribute, Some("path_filter.0.path".to_string()));
    }

    #[test]
    fn test_validate_nested_block_map() {
        let schema = Schema::v0().with_block(
            "relations",
            NestedBlock::map(Block::new().with_attribute("target", Attribute::required_string())),
        );

        assert!(validate(&schema, &json!({"relations": {"owner": {"target": "team"}}})).is_empty());

        let diagnostics = validate(&schema, &json!({"relations": {"owner": {}}}));
        assert_eq!(
            diagnostics[0].attribute,
            Some("relations.owner.target".to_string())
        );
    }

    #[test]
    fn test_is_valid_and_result_helpers() {
        let schema = Schema::v0().with_attribute("identifier", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"identifier": "svc"})));
        assert!(!is_valid(&schema, &json!({})));
        assert!(validate_result(&schema, &json!({"identifier": "svc"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("identifier", Attribute::required_string());
        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }
}
