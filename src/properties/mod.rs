//! Five-domain property bags and their wire projections.
//!
//! Blueprints, action inputs and entities all group their properties the same
//! way: one map per value domain (string, number, boolean, array, object).
//! [`PropertyBag`] captures that shape once and is specialised per use:
//!
//! - [`BlueprintProperties`]: property schemas on a blueprint
//! - [`ActionInputs`]: user inputs of an action, with JQ alternates
//! - [`EntityProperties`]: property values on an entity

pub mod action;
pub mod blueprint;
pub mod entity;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::value::Tristate;

pub use action::ActionInputs;
pub use blueprint::BlueprintProperties;
pub use entity::EntityProperties;

/// The wire `type` of each value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl Domain {
    /// Parse a wire `type` tag.
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// The wire `type` tag.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// The declared map holding this domain.
    pub fn bag_key(&self) -> &'static str {
        match self {
            Self::String => "string_props",
            Self::Number => "number_props",
            Self::Boolean => "boolean_props",
            Self::Array => "array_props",
            Self::Object => "object_props",
        }
    }
}

/// One map per value domain, keyed by property identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize, N: Serialize, B: Serialize, A: Serialize, O: Serialize",
    deserialize = "S: DeserializeOwned, N: DeserializeOwned, B: DeserializeOwned, \
                   A: DeserializeOwned, O: DeserializeOwned"
))]
pub struct PropertyBag<S, N, B, A, O> {
    #[serde(default)]
    pub string_props: Tristate<BTreeMap<String, S>>,
    #[serde(default)]
    pub number_props: Tristate<BTreeMap<String, N>>,
    #[serde(default)]
    pub boolean_props: Tristate<BTreeMap<String, B>>,
    #[serde(default)]
    pub array_props: Tristate<BTreeMap<String, A>>,
    #[serde(default)]
    pub object_props: Tristate<BTreeMap<String, O>>,
}

impl<S, N, B, A, O> Default for PropertyBag<S, N, B, A, O> {
    fn default() -> Self {
        Self {
            string_props: Tristate::Null,
            number_props: Tristate::Null,
            boolean_props: Tristate::Null,
            array_props: Tristate::Null,
            object_props: Tristate::Null,
        }
    }
}

impl<S, N, B, A, O> PropertyBag<S, N, B, A, O> {
    /// All declared keys across domains.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        keys.extend(map_keys(&self.string_props));
        keys.extend(map_keys(&self.number_props));
        keys.extend(map_keys(&self.boolean_props));
        keys.extend(map_keys(&self.array_props));
        keys.extend(map_keys(&self.object_props));
        keys
    }

    /// Whether no domain holds any entry.
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// The domain of a declared key, if any.
    pub fn domain_of(&self, key: &str) -> Option<Domain> {
        if map_has(&self.string_props, key) {
            Some(Domain::String)
        } else if map_has(&self.number_props, key) {
            Some(Domain::Number)
        } else if map_has(&self.boolean_props, key) {
            Some(Domain::Boolean)
        } else if map_has(&self.array_props, key) {
            Some(Domain::Array)
        } else if map_has(&self.object_props, key) {
            Some(Domain::Object)
        } else {
            None
        }
    }

    /// Remove `key` from whichever domain holds it.
    pub fn remove(&mut self, key: &str) {
        remove_from(&mut self.string_props, key);
        remove_from(&mut self.number_props, key);
        remove_from(&mut self.boolean_props, key);
        remove_from(&mut self.array_props, key);
        remove_from(&mut self.object_props, key);
    }
}

fn map_keys<T>(map: &Tristate<BTreeMap<String, T>>) -> impl Iterator<Item = &str> {
    map.known().into_iter().flat_map(|m| m.keys().map(String::as_str))
}

fn map_has<T>(map: &Tristate<BTreeMap<String, T>>, key: &str) -> bool {
    map.known().is_some_and(|m| m.contains_key(key))
}

fn remove_from<T>(map: &mut Tristate<BTreeMap<String, T>>, key: &str) {
    if let Tristate::Known(m) = map {
        m.remove(key);
    }
}

/// Build a refreshed declared map.
///
/// An empty remote map refreshes to null unless the prior declared value was
/// an explicitly empty map, so `{}` and absent both round-trip.
pub fn refreshed_map<T, P>(
    prior: &Tristate<BTreeMap<String, P>>,
    entries: BTreeMap<String, T>,
) -> Tristate<BTreeMap<String, T>> {
    if entries.is_empty() && !prior.known().is_some_and(|m| m.is_empty()) {
        Tristate::Null
    } else {
        Tristate::Known(entries)
    }
}

/// Same as [`refreshed_map`] for lists.
pub fn refreshed_list<T, P>(prior: &Tristate<Vec<P>>, items: Vec<T>) -> Tristate<Vec<T>> {
    if items.is_empty() && !prior.known().is_some_and(|l| l.is_empty()) {
        Tristate::Null
    } else {
        Tristate::Known(items)
    }
}

/// The prior declared entry for `key`, if the map is known.
pub fn prior_entry<'a, T>(map: &'a Tristate<BTreeMap<String, T>>, key: &str) -> Option<&'a T> {
    map.known().and_then(|m| m.get(key))
}

/// Iterate over the known entries of a declared map.
pub fn entries<T>(map: &Tristate<BTreeMap<String, T>>) -> impl Iterator<Item = (&String, &T)> {
    map.known().into_iter().flat_map(|m| m.iter())
}

/// Generators shared by the round-trip laws of each property module.
#[cfg(test)]
pub(crate) mod strategies {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde_json::{json, Value};

    use crate::value::Tristate;

    /// Free text, including characters the canonicalizer escapes.
    pub fn text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 <>&.$]{0,8}"
    }

    pub fn maybe<T: std::fmt::Debug>(inner: impl Strategy<Value = T>) -> impl Strategy<Value = Tristate<T>> {
        prop::option::of(inner).prop_map(Tristate::from_option)
    }

    /// Numbers that survive a text round trip exactly.
    pub fn quarter() -> impl Strategy<Value = f64> {
        (-4000i32..4000).prop_map(|n| f64::from(n) / 4.0)
    }

    /// JSON object text in pretty, non-canonical layout.
    pub fn object_text() -> impl Strategy<Value = String> {
        prop::collection::btree_map("[a-c]{1,2}", prop_oneof![
            any::<i32>().prop_map(Value::from),
            text().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(json!([1, {"z": null, "a": "<"}])),
        ], 0..4)
        .prop_map(|m| {
            let object: serde_json::Map<String, Value> = m.into_iter().collect();
            serde_json::to_string_pretty(&Value::Object(object)).unwrap()
        })
    }

    /// A domain map whose keys all start with `prefix`, so domains never share a key.
    pub fn keyed<T: std::fmt::Debug>(
        prefix: &'static str,
        entry: impl Strategy<Value = T>,
    ) -> impl Strategy<Value = Tristate<BTreeMap<String, T>>> {
        maybe(prop::collection::btree_map(
            "[a-c]{1,2}".prop_map(move |k| format!("{}{}", prefix, k)),
            entry,
            0..3,
        ))
    }
}
