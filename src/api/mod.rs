//! Portal wire models.
//!
//! These mirror the JSON accepted and returned by the Portal REST API. They are
//! loosely typed on purpose: every field the Portal may omit is optional, and
//! JQ-capable fields use [`JqOr`](crate::value::JqOr).

mod action;
mod blueprint;
mod entity;
mod integration;
mod migration;
mod search;

pub use action::{
    Action, ActionPermissions, ApprovalNotification, ExecutePermissions, InvocationMethod,
    PermissionSet, Trigger, UserInputs,
};
pub use blueprint::{
    AggregationProperty, Blueprint, BlueprintSchema, CalculationProperty, CalculationSpec,
    ChangelogDestination, Dataset, DatasetRule, EntitySort, Items, MirrorProperty, Ownership,
    PathFilter, Property, Relation, SpecAuthentication, TeamInheritance,
};
pub use entity::{Entity, ScorecardResult, ScorecardRuleResult};
pub use integration::Integration;
pub use migration::{Migration, MigrationStatus};
pub use search::{SearchRequest, SearchResponse};
