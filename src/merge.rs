//! Extension merge for Portal-owned blueprints.
//!
//! A system blueprint has a server-owned baseline. Users may add keys to the
//! four extensible categories (properties, relations, mirror properties and
//! calculation properties) but never own a key the baseline has.
//!
//! [`merge`] overlays the declared extension onto the baseline, the baseline
//! winning every conflict. [`extract`] is its inverse on refresh: the keys of
//! the current blueprint that the baseline does not have.

use std::collections::BTreeMap;
use std::fmt;

use crate::api::{Blueprint, BlueprintSchema};

/// An extensible category of a blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Properties,
    Relations,
    MirrorProperties,
    CalculationProperties,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Properties => "properties",
            Self::Relations => "relations",
            Self::MirrorProperties => "mirror_properties",
            Self::CalculationProperties => "calculation_properties",
        })
    }
}

/// A declared key dropped because the baseline owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub category: Category,
    pub key: String,
}

/// The four extensible categories of a blueprint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extensions {
    pub schema: BlueprintSchema,
    pub relations: BTreeMap<String, crate::api::Relation>,
    pub mirror_properties: BTreeMap<String, crate::api::MirrorProperty>,
    pub calculation_properties: BTreeMap<String, crate::api::CalculationProperty>,
}

impl Extensions {
    /// The extensible categories of `blueprint`.
    pub fn of(blueprint: &Blueprint) -> Self {
        Self {
            schema: blueprint.schema.clone(),
            relations: blueprint.relations.clone(),
            mirror_properties: blueprint.mirror_properties.clone(),
            calculation_properties: blueprint.calculation_properties.clone(),
        }
    }

    /// Replace the extensible categories of `blueprint`, leaving the rest as is.
    pub fn apply_to(self, blueprint: &mut Blueprint) {
        blueprint.schema = self.schema;
        blueprint.relations = self.relations;
        blueprint.mirror_properties = self.mirror_properties;
        blueprint.calculation_properties = self.calculation_properties;
    }
}

fn overlay<T: Clone>(
    category: Category,
    system: &BTreeMap<String, T>,
    declared: &BTreeMap<String, T>,
    conflicts: &mut Vec<Conflict>,
) -> BTreeMap<String, T> {
    let mut merged = system.clone();
    for (key, value) in declared {
        if system.contains_key(key) {
            conflicts.push(Conflict {
                category,
                key: key.clone(),
            });
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn difference<T: Clone>(
    current: &BTreeMap<String, T>,
    system: &BTreeMap<String, T>,
) -> BTreeMap<String, T> {
    current
        .iter()
        .filter(|(key, _)| !system.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Overlay `declared` onto the `system` baseline.
///
/// Declared keys the baseline already has are dropped and reported.
pub fn merge(system: &Extensions, declared: &Extensions) -> (Extensions, Vec<Conflict>) {
    let mut conflicts = Vec::new();

    let properties = overlay(
        Category::Properties,
        &system.schema.properties,
        &declared.schema.properties,
        &mut conflicts,
    );
    let mut required: Vec<String> = system.schema.required.clone();
    required.extend(
        declared
            .schema
            .required
            .iter()
            .filter(|key| !system.schema.properties.contains_key(*key))
            .cloned(),
    );
    required.sort();
    required.dedup();

    let merged = Extensions {
        schema: BlueprintSchema {
            properties,
            required,
        },
        relations: overlay(
            Category::Relations,
            &system.relations,
            &declared.relations,
            &mut conflicts,
        ),
        mirror_properties: overlay(
            Category::MirrorProperties,
            &system.mirror_properties,
            &declared.mirror_properties,
            &mut conflicts,
        ),
        calculation_properties: overlay(
            Category::CalculationProperties,
            &system.calculation_properties,
            &declared.calculation_properties,
            &mut conflicts,
        ),
    };
    (merged, conflicts)
}

/// The keys of `current` that the `system` baseline does not own.
pub fn extract(current: &Extensions, system: &Extensions) -> Extensions {
    let properties = difference(&current.schema.properties, &system.schema.properties);
    let required = current
        .schema
        .required
        .iter()
        .filter(|key| properties.contains_key(*key))
        .cloned()
        .collect();

    Extensions {
        schema: BlueprintSchema {
            properties,
            required,
        },
        relations: difference(&current.relations, &system.relations),
        mirror_properties: difference(&current.mirror_properties, &system.mirror_properties),
        calculation_properties: difference(
            &current.calculation_properties,
            &system.calculation_properties,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_system() -> Extensions {
        let blueprint: Blueprint = serde_json::from_value(json!({
            "identifier": "_user",
            "schema": {
                "properties": {
                    "status": {"type": "string"},
                    "port_role": {"type": "string"}
                },
                "required": ["status"]
            },
            "relations": {}
        }))
        .unwrap();
        Extensions::of(&blueprint)
    }

    fn declared() -> Extensions {
        let blueprint: Blueprint = serde_json::from_value(json!({
            "identifier": "_user",
            "schema": {
                "properties": {
                    "environment": {"type": "string"},
                    "version": {"type": "number"},
                    "status": {"type": "number"}
                },
                "required": ["environment", "status"]
            },
            "relations": {"manager": {"target": "_user"}}
        }))
        .unwrap();
        Extensions::of(&blueprint)
    }

    #[test]
    fn test_merge_keeps_system_keys_and_reports_conflicts() {
        let (merged, conflicts) = merge(&user_system(), &declared());

        assert_eq!(
            merged.schema.properties.keys().collect::<Vec<_>>(),
            vec!["environment", "port_role", "status", "version"]
        );
        assert_eq!(merged.schema.properties["status"].kind, "string");
        assert_eq!(merged.schema.required, vec!["environment", "status"]);
        assert!(merged.relations.contains_key("manager"));
        assert_eq!(
            conflicts,
            vec![Conflict {
                category: Category::Properties,
                key: "status".to_string()
            }]
        );
    }

    #[test]
    fn test_extract_is_disjoint_from_system() {
        let system = user_system();
        let (merged, _) = merge(&system, &declared());
        let extracted = extract(&merged, &system);

        assert_eq!(
            extracted.schema.properties.keys().collect::<Vec<_>>(),
            vec!["environment", "version"]
        );
        assert_eq!(extracted.schema.required, vec!["environment"]);
        assert!(extracted
            .schema
            .properties
            .keys()
            .all(|k| !system.schema.properties.contains_key(k)));
    }

    #[test]
    fn test_apply_to_leaves_other_fields() {
        let mut current: Blueprint = serde_json::from_value(json!({
            "identifier": "_user",
            "title": "User",
            "aggregationProperties": {
                "count": {"target": "x", "calculationSpec": {"func": "count", "calculationBy": "entities"}}
            }
        }))
        .unwrap();
        let (merged, _) = merge(&user_system(), &declared());
        merged.apply_to(&mut current);

        assert_eq!(current.title.as_deref(), Some("User"));
        assert!(current.aggregation_properties.contains_key("count"));
        assert!(current.schema.properties.contains_key("environment"));
    }

    mod laws {
        use super::*;
        use crate::api::{CalculationProperty, MirrorProperty, Property, Relation};
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        fn keys() -> impl Strategy<Value = BTreeSet<String>> {
            prop::collection::btree_set("[a-e]{1,2}", 0..6)
        }

        /// Extensions over the given keys; `tag` marks which side produced each value.
        fn extensions(
            properties: BTreeSet<String>,
            required: Vec<bool>,
            relations: BTreeSet<String>,
            mirrors: BTreeSet<String>,
            calculations: BTreeSet<String>,
            tag: &str,
        ) -> Extensions {
            Extensions {
                schema: BlueprintSchema {
                    required: properties
                        .iter()
                        .zip(required.iter().cycle())
                        .filter(|(_, r)| **r)
                        .map(|(k, _)| k.clone())
                        .collect(),
                    properties: properties
                        .into_iter()
                        .map(|k| {
                            let property = Property {
                                kind: tag.to_string(),
                                ..Default::default()
                            };
                            (k, property)
                        })
                        .collect(),
                },
                relations: relations
                    .into_iter()
                    .map(|k| {
                        let relation = Relation {
                            target: tag.to_string(),
                            ..Default::default()
                        };
                        (k, relation)
                    })
                    .collect(),
                mirror_properties: mirrors
                    .into_iter()
                    .map(|k| {
                        let mirror = MirrorProperty {
                            path: tag.to_string(),
                            ..Default::default()
                        };
                        (k, mirror)
                    })
                    .collect(),
                calculation_properties: calculations
                    .into_iter()
                    .map(|k| {
                        let calculation = CalculationProperty {
                            calculation: tag.to_string(),
                            kind: "string".to_string(),
                            ..Default::default()
                        };
                        (k, calculation)
                    })
                    .collect(),
            }
        }

        fn side(tag: &'static str) -> impl Strategy<Value = Extensions> {
            (
                keys(),
                prop::collection::vec(any::<bool>(), 1..4),
                keys(),
                keys(),
                keys(),
            )
                .prop_map(move |(p, r, rel, m, c)| extensions(p, r, rel, m, c, tag))
        }

        fn disjoint<T>(a: &BTreeMap<String, T>, b: &BTreeMap<String, T>) -> bool {
            a.keys().all(|k| !b.contains_key(k))
        }

        proptest! {
            #[test]
            fn extracted_keys_never_overlap_system(system in side("system"), declared in side("declared")) {
                let (merged, _) = merge(&system, &declared);
                let extracted = extract(&merged, &system);

                prop_assert!(disjoint(&extracted.schema.properties, &system.schema.properties));
                prop_assert!(disjoint(&extracted.relations, &system.relations));
                prop_assert!(disjoint(&extracted.mirror_properties, &system.mirror_properties));
                prop_assert!(disjoint(&extracted.calculation_properties, &system.calculation_properties));
                prop_assert!(extracted
                    .schema
                    .required
                    .iter()
                    .all(|k| extracted.schema.properties.contains_key(k)));
            }

            #[test]
            fn system_wins_every_conflict(system in side("system"), declared in side("declared")) {
                let (merged, conflicts) = merge(&system, &declared);

                for (key, property) in &system.schema.properties {
                    prop_assert_eq!(&merged.schema.properties[key], property);
                }
                for (key, relation) in &system.relations {
                    prop_assert_eq!(&merged.relations[key], relation);
                }
                let overlapping = declared
                    .schema
                    .properties
                    .keys()
                    .filter(|k| system.schema.properties.contains_key(*k))
                    .count()
                    + declared.relations.keys().filter(|k| system.relations.contains_key(*k)).count()
                    + declared
                        .mirror_properties
                        .keys()
                        .filter(|k| system.mirror_properties.contains_key(*k))
                        .count()
                    + declared
                        .calculation_properties
                        .keys()
                        .filter(|k| system.calculation_properties.contains_key(*k))
                        .count();
                prop_assert_eq!(conflicts.len(), overlapping);
            }

            #[test]
            fn merging_the_extract_is_stable(system in side("system"), declared in side("declared")) {
                let (merged, _) = merge(&system, &declared);
                let extracted = extract(&merged, &system);
                let (remerged, conflicts) = merge(&system, &extracted);

                prop_assert!(conflicts.is_empty());
                prop_assert_eq!(remerged, merged);
            }
        }
    }
}
