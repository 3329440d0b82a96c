//! In-memory Portal used by the test suite.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::api::{
    Action, ActionPermissions, AggregationProperty, Blueprint, Entity, Integration, Migration,
    MigrationStatus, SearchRequest, SearchResponse,
};
use crate::canonical::Canonicalizer;
use crate::client::PortApi;
use crate::error::ProviderError;
use crate::ids::generate_identifier;
use crate::resources::Context;

const STAMP: &str = "2024-01-01T00:00:00.000Z";
const AUTHOR: &str = "in-memory-portal";

#[derive(Default)]
struct PortalState {
    blueprints: BTreeMap<String, Blueprint>,
    system_blueprints: BTreeMap<String, Blueprint>,
    entities: BTreeMap<(String, String), Entity>,
    actions: BTreeMap<String, Action>,
    permissions: BTreeMap<String, ActionPermissions>,
    integrations: BTreeMap<String, Integration>,
    migrations: HashMap<String, Vec<MigrationStatus>>,
    migration_polls: HashMap<String, usize>,
    /// Migration id to the blueprint it removes once completed.
    cascades: HashMap<String, String>,
    delete_migration: Option<Vec<MigrationStatus>>,
    next_migration: usize,
    requests: Vec<String>,
    last_search: Option<SearchRequest>,
}

/// A [`PortApi`] backed by in-memory maps.
///
/// Clones share the same state, so a test can hand one clone to the provider
/// and inspect the Portal through another.
#[derive(Clone, Default)]
pub struct InMemoryPortal {
    state: Arc<Mutex<PortalState>>,
}

fn not_found(kind: &str, id: &str) -> ProviderError {
    ProviderError::NotFound(format!("{} \"{}\" was not found", kind, id))
}

impl InMemoryPortal {
    /// An empty Portal.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, method: &str, path: impl AsRef<str>) -> MutexGuard<'_, PortalState> {
        let mut state = self.lock();
        state.requests.push(format!("{} /v1{}", method, path.as_ref()));
        state
    }

    /// A resource context talking to this Portal, with beta features on and
    /// a 1ms migration poll interval.
    pub fn context(&self) -> Context {
        let (_, cancel) = watch::channel(false);
        Context {
            api: Arc::new(self.clone()),
            json: Canonicalizer::new(true),
            beta_features_enabled: true,
            poll_interval: Duration::from_millis(1),
            cancel,
        }
    }

    // Seeding

    /// Store a blueprint as if created out of band.
    pub fn insert_blueprint(&self, blueprint: Blueprint) {
        self.lock()
            .blueprints
            .insert(blueprint.identifier.clone(), blueprint);
    }

    /// Store a Portal-owned blueprint and its system baseline.
    pub fn insert_system_blueprint(&self, blueprint: Blueprint) {
        let mut state = self.lock();
        state
            .system_blueprints
            .insert(blueprint.identifier.clone(), blueprint.clone());
        state.blueprints.insert(blueprint.identifier.clone(), blueprint);
    }

    /// Replace a blueprint's aggregation properties out of band.
    pub fn set_aggregations(&self, blueprint: &str, aggregations: BTreeMap<String, AggregationProperty>) {
        if let Some(bp) = self.lock().blueprints.get_mut(blueprint) {
            bp.aggregation_properties = aggregations;
        }
    }

    /// Store an entity. A missing identifier is generated.
    pub fn insert_entity(&self, mut entity: Entity) {
        let identifier = entity.identifier.get_or_insert_with(generate_identifier).clone();
        self.lock()
            .entities
            .insert((entity.blueprint.clone(), identifier), entity);
    }

    /// Store an action.
    pub fn insert_action(&self, action: Action) {
        self.lock().actions.insert(action.identifier.clone(), action);
    }

    /// Script the statuses reported for `migration_id`, one per poll.
    /// The last status repeats.
    pub fn script_migration(&self, migration_id: &str, statuses: Vec<MigrationStatus>) {
        self.lock()
            .migrations
            .insert(migration_id.to_string(), statuses);
    }

    /// Script the migration started by the next forced blueprint delete.
    pub fn set_delete_migration(&self, statuses: Vec<MigrationStatus>) {
        self.lock().delete_migration = Some(statuses);
    }

    // Inspection

    /// The stored blueprint, if any.
    pub fn blueprint(&self, identifier: &str) -> Option<Blueprint> {
        self.lock().blueprints.get(identifier).cloned()
    }

    /// The stored entity, if any.
    pub fn entity(&self, blueprint: &str, identifier: &str) -> Option<Entity> {
        self.lock()
            .entities
            .get(&(blueprint.to_string(), identifier.to_string()))
            .cloned()
    }

    /// The stored action, if any.
    pub fn action(&self, identifier: &str) -> Option<Action> {
        self.lock().actions.get(identifier).cloned()
    }

    /// Permissions last written for an action.
    pub fn permissions(&self, action_identifier: &str) -> Option<ActionPermissions> {
        self.lock().permissions.get(action_identifier).cloned()
    }

    /// The stored integration, if any.
    pub fn integration(&self, installation_id: &str) -> Option<Integration> {
        self.lock().integrations.get(installation_id).cloned()
    }

    /// How many times `migration_id` was polled.
    pub fn migration_polls(&self, migration_id: &str) -> usize {
        self.lock()
            .migration_polls
            .get(migration_id)
            .copied()
            .unwrap_or_default()
    }

    /// Every request received, as `"METHOD /v1/path"`.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// The body of the most recent search.
    pub fn last_search(&self) -> Option<SearchRequest> {
        self.lock().last_search.clone()
    }
}

fn stamped_blueprint(mut blueprint: Blueprint, previous: Option<&Blueprint>) -> Blueprint {
    blueprint.created_at = Some(
        previous
            .and_then(|p| p.created_at.clone())
            .unwrap_or_else(|| STAMP.to_string()),
    );
    blueprint.created_by = Some(AUTHOR.to_string());
    blueprint.updated_at = Some(STAMP.to_string());
    blueprint.updated_by = Some(AUTHOR.to_string());
    blueprint
}

fn stamped_entity(mut entity: Entity) -> Entity {
    entity.created_at = Some(STAMP.to_string());
    entity.created_by = Some(AUTHOR.to_string());
    entity.updated_at = Some(STAMP.to_string());
    entity.updated_by = Some(AUTHOR.to_string());
    entity
}

/// Field a search rule compares against.
fn field(entity: &Entity, property: &str) -> Option<Value> {
    match property {
        "$identifier" => entity.identifier.clone().map(Value::String),
        "$blueprint" => Some(Value::String(entity.blueprint.clone())),
        "$title" => entity.title.clone().map(Value::String),
        name => entity.properties.get(name).cloned(),
    }
}

/// Evaluate a `{combinator, rules}` query or a single rule.
fn matches(entity: &Entity, query: &Value) -> bool {
    if let Some(combinator) = query.get("combinator").and_then(Value::as_str) {
        let rules = query
            .get("rules")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        return match combinator {
            "or" => rules.iter().any(|rule| matches(entity, rule)),
            _ => rules.iter().all(|rule| matches(entity, rule)),
        };
    }

    let Some(property) = query.get("property").and_then(Value::as_str) else {
        return false;
    };
    let actual = field(entity, property);
    let expected = query.get("value").unwrap_or(&Value::Null);
    match query.get("operator").and_then(Value::as_str) {
        Some("=") => actual.as_ref() == Some(expected),
        Some("!=") => actual.as_ref() != Some(expected),
        Some("in") => expected
            .as_array()
            .is_some_and(|values| actual.is_some_and(|a| values.contains(&a))),
        _ => false,
    }
}

#[async_trait]
impl PortApi for InMemoryPortal {
    async fn create_blueprint(
        &self,
        blueprint: &Blueprint,
        create_catalog_page: bool,
    ) -> Result<Blueprint, ProviderError> {
        let mut state = self.record(
            "POST",
            format!("/blueprints?create_catalog_page={}", create_catalog_page),
        );
        if state.blueprints.contains_key(&blueprint.identifier) {
            return Err(ProviderError::AlreadyExists(format!(
                "blueprint \"{}\"",
                blueprint.identifier
            )));
        }
        let created = stamped_blueprint(blueprint.clone(), None);
        state
            .blueprints
            .insert(created.identifier.clone(), created.clone());
        Ok(created)
    }

    async fn read_blueprint(&self, identifier: &str) -> Result<Blueprint, ProviderError> {
        let state = self.record("GET", format!("/blueprints/{}", identifier));
        state
            .blueprints
            .get(identifier)
            .cloned()
            .ok_or_else(|| not_found("blueprint", identifier))
    }

    async fn read_system_blueprint(&self, identifier: &str) -> Result<Blueprint, ProviderError> {
        let state = self.record("GET", format!("/blueprints/{}/system", identifier));
        state
            .system_blueprints
            .get(identifier)
            .cloned()
            .ok_or_else(|| not_found("system blueprint", identifier))
    }

    async fn update_blueprint(
        &self,
        identifier: &str,
        blueprint: &Blueprint,
    ) -> Result<Blueprint, ProviderError> {
        let mut state = self.record("PUT", format!("/blueprints/{}", identifier));
        let previous = state
            .blueprints
            .get(identifier)
            .ok_or_else(|| not_found("blueprint", identifier))?;
        let updated = stamped_blueprint(blueprint.clone(), Some(previous));
        state
            .blueprints
            .insert(identifier.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_blueprint(&self, identifier: &str) -> Result<(), ProviderError> {
        let mut state = self.record("DELETE", format!("/blueprints/{}", identifier));
        if !state.blueprints.contains_key(identifier) {
            return Err(not_found("blueprint", identifier));
        }
        if state.entities.keys().any(|(bp, _)| bp == identifier) {
            return Err(ProviderError::InvalidRequest(format!(
                "blueprint \"{}\" still has entities",
                identifier
            )));
        }
        state.blueprints.remove(identifier);
        Ok(())
    }

    async fn delete_blueprint_with_entities(
        &self,
        identifier: &str,
    ) -> Result<String, ProviderError> {
        let mut state = self.record(
            "DELETE",
            format!("/blueprints/{}/all-entities?delete_blueprint=true", identifier),
        );
        if !state.blueprints.contains_key(identifier) {
            return Err(not_found("blueprint", identifier));
        }
        state.next_migration += 1;
        let migration_id = format!("migration-{}", state.next_migration);
        let script = state
            .delete_migration
            .take()
            .unwrap_or_else(|| vec![MigrationStatus::Completed]);
        state.migrations.insert(migration_id.clone(), script);
        state
            .cascades
            .insert(migration_id.clone(), identifier.to_string());
        Ok(migration_id)
    }

    async fn read_migration(&self, migration_id: &str) -> Result<Migration, ProviderError> {
        let mut state = self.record("GET", format!("/migrations/{}", migration_id));
        let polls = state
            .migration_polls
            .get(migration_id)
            .copied()
            .unwrap_or_default();
        let status = state
            .migrations
            .get(migration_id)
            .and_then(|script| script.get(polls).or_else(|| script.last()))
            .cloned()
            .ok_or_else(|| not_found("migration", migration_id))?;
        state
            .migration_polls
            .insert(migration_id.to_string(), polls + 1);

        if status == MigrationStatus::Completed {
            if let Some(blueprint) = state.cascades.remove(migration_id) {
                state.entities.retain(|(bp, _), _| *bp != blueprint);
                state.blueprints.remove(&blueprint);
            }
        }
        Ok(Migration {
            id: migration_id.to_string(),
            status,
        })
    }

    async fn create_entity(
        &self,
        entity: &Entity,
        _run_id: Option<&str>,
    ) -> Result<Entity, ProviderError> {
        let mut state = self.record(
            "POST",
            format!("/blueprints/{}/entities?upsert=false", entity.blueprint),
        );
        if !state.blueprints.contains_key(&entity.blueprint) {
            return Err(not_found("blueprint", &entity.blueprint));
        }
        let mut created = stamped_entity(entity.clone());
        let identifier = created
            .identifier
            .get_or_insert_with(generate_identifier)
            .clone();
        let key = (created.blueprint.clone(), identifier);
        if state.entities.contains_key(&key) {
            return Err(ProviderError::AlreadyExists(format!("entity \"{}\"", key.1)));
        }
        state.entities.insert(key, created.clone());
        Ok(created)
    }

    async fn read_entity(&self, blueprint: &str, identifier: &str) -> Result<Entity, ProviderError> {
        let state = self.record(
            "GET",
            format!("/blueprints/{}/entities/{}", blueprint, identifier),
        );
        state
            .entities
            .get(&(blueprint.to_string(), identifier.to_string()))
            .cloned()
            .ok_or_else(|| not_found("entity", identifier))
    }

    async fn update_entity(
        &self,
        blueprint: &str,
        identifier: &str,
        entity: &Entity,
        _run_id: Option<&str>,
    ) -> Result<Entity, ProviderError> {
        let mut state = self.record(
            "PUT",
            format!("/blueprints/{}/entities/{}", blueprint, identifier),
        );
        let key = (blueprint.to_string(), identifier.to_string());
        if !state.entities.contains_key(&key) {
            return Err(not_found("entity", identifier));
        }
        let mut updated = stamped_entity(entity.clone());
        updated.identifier = Some(identifier.to_string());
        updated.blueprint = blueprint.to_string();
        state.entities.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete_entity(&self, blueprint: &str, identifier: &str) -> Result<(), ProviderError> {
        let mut state = self.record(
            "DELETE",
            format!("/blueprints/{}/entities/{}", blueprint, identifier),
        );
        state
            .entities
            .remove(&(blueprint.to_string(), identifier.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("entity", identifier))
    }

    async fn create_action(&self, action: &Action) -> Result<Action, ProviderError> {
        let mut state = self.record("POST", "/actions");
        if state.actions.contains_key(&action.identifier) {
            return Err(ProviderError::AlreadyExists(format!(
                "action \"{}\"",
                action.identifier
            )));
        }
        state
            .actions
            .insert(action.identifier.clone(), action.clone());
        Ok(action.clone())
    }

    async fn read_action(&self, identifier: &str) -> Result<Action, ProviderError> {
        let state = self.record("GET", format!("/actions/{}", identifier));
        state
            .actions
            .get(identifier)
            .cloned()
            .ok_or_else(|| not_found("action", identifier))
    }

    async fn update_action(&self, identifier: &str, action: &Action) -> Result<Action, ProviderError> {
        let mut state = self.record("PUT", format!("/actions/{}", identifier));
        if !state.actions.contains_key(identifier) {
            return Err(not_found("action", identifier));
        }
        state.actions.insert(identifier.to_string(), action.clone());
        Ok(action.clone())
    }

    async fn delete_action(&self, identifier: &str) -> Result<(), ProviderError> {
        let mut state = self.record("DELETE", format!("/actions/{}", identifier));
        state.permissions.remove(identifier);
        state
            .actions
            .remove(identifier)
            .map(|_| ())
            .ok_or_else(|| not_found("action", identifier))
    }

    async fn read_action_permissions(
        &self,
        action_identifier: &str,
    ) -> Result<ActionPermissions, ProviderError> {
        let state = self.record("GET", format!("/actions/{}/permissions", action_identifier));
        if !state.actions.contains_key(action_identifier) {
            return Err(not_found("action", action_identifier));
        }
        Ok(state
            .permissions
            .get(action_identifier)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_action_permissions(
        &self,
        action_identifier: &str,
        permissions: &ActionPermissions,
    ) -> Result<ActionPermissions, ProviderError> {
        let mut state = self.record(
            "PATCH",
            format!("/actions/{}/permissions", action_identifier),
        );
        if !state.actions.contains_key(action_identifier) {
            return Err(not_found("action", action_identifier));
        }
        state
            .permissions
            .insert(action_identifier.to_string(), permissions.clone());
        Ok(permissions.clone())
    }

    async fn create_integration(
        &self,
        integration: &Integration,
    ) -> Result<Integration, ProviderError> {
        let mut state = self.record("POST", "/integration");
        if state
            .integrations
            .contains_key(&integration.installation_id)
        {
            return Err(ProviderError::AlreadyExists(format!(
                "integration \"{}\"",
                integration.installation_id
            )));
        }
        state
            .integrations
            .insert(integration.installation_id.clone(), integration.clone());
        Ok(integration.clone())
    }

    async fn read_integration(&self, installation_id: &str) -> Result<Integration, ProviderError> {
        let state = self.record("GET", format!("/integration/{}", installation_id));
        state
            .integrations
            .get(installation_id)
            .cloned()
            .ok_or_else(|| not_found("integration", installation_id))
    }

    async fn update_integration(
        &self,
        installation_id: &str,
        integration: &Integration,
    ) -> Result<Integration, ProviderError> {
        let mut state = self.record("PATCH", format!("/integration/{}", installation_id));
        if !state.integrations.contains_key(installation_id) {
            return Err(not_found("integration", installation_id));
        }
        state
            .integrations
            .insert(installation_id.to_string(), integration.clone());
        Ok(integration.clone())
    }

    async fn delete_integration(&self, installation_id: &str) -> Result<(), ProviderError> {
        let mut state = self.record("DELETE", format!("/integration/{}", installation_id));
        state
            .integrations
            .remove(installation_id)
            .map(|_| ())
            .ok_or_else(|| not_found("integration", installation_id))
    }

    async fn search_entities(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ProviderError> {
        let mut state = self.record("POST", "/entities/search");
        state.last_search = Some(request.clone());
        let entities = state
            .entities
            .values()
            .filter(|entity| matches(entity, &request.query))
            .cloned()
            .collect();
        Ok(SearchResponse {
            entities,
            matching_blueprints: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(blueprint: &str, identifier: &str, stage: &str) -> Entity {
        Entity {
            identifier: Some(identifier.to_string()),
            blueprint: blueprint.to_string(),
            properties: BTreeMap::from([("stage".to_string(), json!(stage))]),
            ..Default::default()
        }
    }

    #[test]
    fn test_search_rules() {
        let e = entity("svc", "checkout", "prod");
        assert!(matches(
            &e,
            &json!({"combinator": "and", "rules": [
                {"property": "$blueprint", "operator": "=", "value": "svc"},
                {"property": "stage", "operator": "in", "value": ["prod", "staging"]}
            ]})
        ));
        assert!(!matches(
            &e,
            &json!({"combinator": "and", "rules": [
                {"property": "$identifier", "operator": "!=", "value": "checkout"}
            ]})
        ));
        assert!(matches(
            &e,
            &json!({"combinator": "or", "rules": [
                {"property": "$title", "operator": "=", "value": "x"},
                {"combinator": "and", "rules": [{"property": "stage", "operator": "=", "value": "prod"}]}
            ]})
        ));
    }

    #[tokio::test]
    async fn test_cascade_completes_on_poll() {
        let portal = InMemoryPortal::new();
        portal.insert_blueprint(Blueprint {
            identifier: "svc".to_string(),
            ..Default::default()
        });
        portal.insert_entity(entity("svc", "checkout", "prod"));

        assert!(matches!(
            portal.delete_blueprint("svc").await,
            Err(ProviderError::InvalidRequest(_))
        ));

        let migration_id = portal.delete_blueprint_with_entities("svc").await.unwrap();
        assert!(portal.blueprint("svc").is_some());
        portal.read_migration(&migration_id).await.unwrap();
        assert!(portal.blueprint("svc").is_none());
        assert!(portal.entity("svc", "checkout").is_none());
    }
}
