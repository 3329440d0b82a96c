//! Declarative value wrappers.
//!
//! Every optional attribute in resource state is a [`Tristate`]: a known value,
//! an explicit null, or a value the host will only know after apply. Null and
//! unknown are kept apart in the type system because planning depends on the
//! difference, while projection to the Portal treats both as "do not send".
//!
//! [`JqOr`] is the wire-side union of a literal and a `{"jqQuery": ...}`
//! expression that the Portal evaluates server-side.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Marker the host writes into state for values known only after apply.
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// Returns true when `value` is the host's unknown marker.
pub fn is_unknown(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == UNKNOWN_VALUE)
}

/// A declarative value: known, null, or unknown until apply.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Tristate<T> {
    /// A concrete value.
    Known(T),
    /// Explicitly absent.
    #[default]
    Null,
    /// Will be computed during apply.
    Unknown,
}

impl<T> Tristate<T> {
    /// The known value, if any. Null and unknown both yield `None`.
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Null | Self::Unknown => None,
        }
    }

    /// Consume into the known value, if any.
    pub fn into_known(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Null | Self::Unknown => None,
        }
    }

    /// Whether the value is known.
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Whether the value is explicitly null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is unknown until apply.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Borrow the inner value.
    pub fn as_ref(&self) -> Tristate<&T> {
        match self {
            Self::Known(v) => Tristate::Known(v),
            Self::Null => Tristate::Null,
            Self::Unknown => Tristate::Unknown,
        }
    }

    /// Map the known value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tristate<U> {
        match self {
            Self::Known(v) => Tristate::Known(f(v)),
            Self::Null => Tristate::Null,
            Self::Unknown => Tristate::Unknown,
        }
    }

    /// Build from an option: `Some` is known, `None` is null.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Known(v),
            None => Self::Null,
        }
    }
}

impl<T: Clone> Tristate<T> {
    /// Clone out the known value, if any.
    pub fn cloned(&self) -> Option<T> {
        self.known().cloned()
    }
}

impl Tristate<bool> {
    /// The known value or `default` for null/unknown.
    pub fn unwrap_or(&self, default: bool) -> bool {
        self.known().copied().unwrap_or(default)
    }
}

impl<T> From<T> for Tristate<T> {
    fn from(value: T) -> Self {
        Self::Known(value)
    }
}

impl<T: Serialize> Serialize for Tristate<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::Null => serializer.serialize_none(),
            Self::Unknown => serializer.serialize_str(UNKNOWN_VALUE),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Tristate<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Self::Null);
        }
        if is_unknown(&value) {
            return Ok(Self::Unknown);
        }
        serde_json::from_value(value)
            .map(Self::Known)
            .map_err(serde::de::Error::custom)
    }
}

/// A wire value that is either a literal or a server-side JQ expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JqOr<T> {
    /// `{"jqQuery": "<expression>"}`.
    Jq {
        /// The JQ expression.
        #[serde(rename = "jqQuery")]
        jq_query: String,
    },
    /// A concrete value.
    Literal(T),
}

impl<T> JqOr<T> {
    /// Pick the JQ form when an expression is present, otherwise the literal.
    ///
    /// The JQ expression wins when both are set.
    pub fn from_pair(literal: Option<T>, jq_query: Option<String>) -> Option<Self> {
        match (literal, jq_query) {
            (_, Some(jq_query)) => Some(Self::Jq { jq_query }),
            (Some(v), None) => Some(Self::Literal(v)),
            (None, None) => None,
        }
    }

    /// Split back into `(literal, jq_query)`; at most one side is `Some`.
    pub fn into_pair(self) -> (Option<T>, Option<String>) {
        match self {
            Self::Jq { jq_query } => (None, Some(jq_query)),
            Self::Literal(v) => (Some(v), None),
        }
    }
}

/// Split an optional wire value into declared `(literal, jq_query)` fields.
pub fn split_jq<T>(value: Option<JqOr<T>>) -> (Tristate<T>, Tristate<String>) {
    match value.map(JqOr::into_pair) {
        Some((literal, jq)) => (Tristate::from_option(literal), Tristate::from_option(jq)),
        None => (Tristate::Null, Tristate::Null),
    }
}

/// An empty marker block such as `kafka_method {}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Marker {}
