//! Canonical JSON rendering.
//!
//! Opaque JSON attributes (`policy`, `query`, object defaults, integration
//! `config`) are stored in state as strings. To keep plans stable they are
//! always re-rendered through [`Canonicalizer`]: object keys sorted at every
//! level, compact separators, and optional HTML escaping of `<`, `>` and `&`
//! inside string scalars.
//!
//! The escaping policy has a process-wide default (see
//! [`set_default_escape_html`]) which a provider instance may override.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter};
use serde_json::{Map, Value};

use crate::error::ProviderError;

static DEFAULT_ESCAPE_HTML: AtomicBool = AtomicBool::new(true);

/// Set the process-wide HTML escaping default.
pub fn set_default_escape_html(escape: bool) {
    DEFAULT_ESCAPE_HTML.store(escape, Ordering::Relaxed);
}

/// The process-wide HTML escaping default (initially `true`).
pub fn default_escape_html() -> bool {
    DEFAULT_ESCAPE_HTML.load(Ordering::Relaxed)
}

/// Renders JSON values in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canonicalizer {
    escape_html: bool,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new(default_escape_html())
    }
}

impl Canonicalizer {
    /// Create a canonicalizer with an explicit escaping policy.
    pub fn new(escape_html: bool) -> Self {
        Self { escape_html }
    }

    /// Whether `<`, `>` and `&` are escaped.
    pub fn escape_html(&self) -> bool {
        self.escape_html
    }

    /// Render a value canonically.
    pub fn render(&self, value: &Value) -> Result<String, ProviderError> {
        let sorted = sort_keys(value);
        let mut out = Vec::new();
        if self.escape_html {
            let mut ser = serde_json::Serializer::with_formatter(&mut out, HtmlEscapeFormatter);
            sorted.serialize(&mut ser)?;
        } else {
            let mut ser = serde_json::Serializer::with_formatter(&mut out, CompactFormatter);
            sorted.serialize(&mut ser)?;
        }
        String::from_utf8(out).map_err(|e| ProviderError::Sdk(e.to_string()))
    }

    /// Parse a user supplied JSON string and render it canonically.
    pub fn canonicalize(&self, attribute: &str, raw: &str) -> Result<String, ProviderError> {
        let value = parse_json(attribute, raw)?;
        self.render(&value)
    }
}

/// Parse a user supplied JSON string, attributing failures to `attribute`.
pub fn parse_json(attribute: &str, raw: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(raw).map_err(|e| ProviderError::invalid_json(attribute, e))
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_keys(v));
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Compact formatter that escapes HTML-significant characters in strings.
struct HtmlEscapeFormatter;

impl Formatter for HtmlEscapeFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                _ => continue,
            };
            writer.write_all(fragment[start..i].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sorts_keys_at_every_level() {
        let raw = r#"{"queries":{"executingUser":{"rules":[{"value":"user","operator":"=","property":"$blueprint"}],"combinator":"or"}},"conditions":["true"]}"#;
        let rendered = Canonicalizer::new(true).canonicalize("policy", raw).unwrap();
        assert_eq!(
            rendered,
            r#"{"conditions":["true"],"queries":{"executingUser":{"combinator":"or","rules":[{"operator":"=","property":"$blueprint","value":"user"}]}}}"#
        );
    }

    #[test]
    fn test_is_idempotent() {
        let canonicalizer = Canonicalizer::new(true);
        let once = canonicalizer
            .canonicalize("config", r#"{ "b": [3, 1, 2], "a": {"z": "<&>", "y": null} }"#)
            .unwrap();
        let twice = canonicalizer.canonicalize("config", &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_array_order_is_preserved() {
        let rendered = Canonicalizer::new(false)
            .render(&json!({"rules": [{"b": 1}, {"a": 2}]}))
            .unwrap();
        assert_eq!(rendered, r#"{"rules":[{"b":1},{"a":2}]}"#);
    }

    #[test]
    fn test_html_escaping_policy() {
        let value = json!({"q": "a < b && c > d"});

        let escaped = Canonicalizer::new(true).render(&value).unwrap();
        assert_eq!(escaped, r#"{"q":"a \u003c b \u0026\u0026 c \u003e d"}"#);

        let literal = Canonicalizer::new(false).render(&value).unwrap();
        assert_eq!(literal, r#"{"q":"a < b && c > d"}"#);
    }

    #[test]
    fn test_escaped_output_parses_back_to_same_value() {
        let value = json!({"html": "<b>&</b>", "quote": "\"x\""});
        let escaped = Canonicalizer::new(true).render(&value).unwrap();
        let parsed: Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_malformed_json_names_attribute() {
        let err = Canonicalizer::default()
            .canonicalize("query", "{\"combinator\":")
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidJson { ref attribute, .. } if attribute == "query"));
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        fn json_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::from),
                (-100_000i32..100_000).prop_map(|n| Value::from(f64::from(n) / 4.0)),
                prop_oneof!["\\PC{0,8}", "[<>&\"a ]{0,6}"].prop_map(Value::String),
            ];
            leaf.prop_recursive(4, 32, 6, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z$<]{0,4}", inner, 0..6)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #[test]
            fn canonicalize_is_idempotent(value in json_value(), escape in any::<bool>()) {
                let canonicalizer = Canonicalizer::new(escape);
                let raw = serde_json::to_string_pretty(&value).unwrap();
                let once = canonicalizer.canonicalize("value", &raw).unwrap();
                let twice = canonicalizer.canonicalize("value", &once).unwrap();
                prop_assert_eq!(&once, &twice);

                let parsed: Value = serde_json::from_str(&once).unwrap();
                prop_assert_eq!(parsed, value);
            }
        }
    }
}
