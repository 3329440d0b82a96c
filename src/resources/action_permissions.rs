//! `port_action_permissions`: who may execute and approve an action.
//!
//! The permissions object always exists while its action does, so create is
//! an update and delete only forgets the resource.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{decode, encode, found, require, Context, Resource};
use crate::api;
use crate::canonical::{parse_json, Canonicalizer};
use crate::error::ProviderError;
use crate::properties::refreshed_list;
use crate::schema::{Attribute, AttributeType, Block, NestedBlock, Schema};
use crate::value::Tristate;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteState {
    pub users: Tristate<Vec<String>>,
    pub roles: Tristate<Vec<String>>,
    pub teams: Tristate<Vec<String>>,
    pub owned_by_team: Tristate<bool>,
    /// Canonical JSON text.
    pub policy: Tristate<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproveState {
    pub users: Tristate<Vec<String>>,
    pub roles: Tristate<Vec<String>>,
    pub teams: Tristate<Vec<String>>,
    /// Canonical JSON text.
    pub policy: Tristate<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsState {
    pub execute: Tristate<ExecuteState>,
    pub approve: Tristate<ApproveState>,
}

/// State of a `port_action_permissions`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPermissionsState {
    pub id: Tristate<String>,
    pub action_identifier: Tristate<String>,
    pub blueprint_identifier: Tristate<String>,
    pub permissions: Tristate<PermissionsState>,
}

fn policy_to_wire(policy: &Tristate<String>, path: &str) -> Result<Option<Value>, ProviderError> {
    policy.known().map(|raw| parse_json(path, raw)).transpose()
}

fn policy_from_wire(
    policy: &Option<Value>,
    json: &Canonicalizer,
) -> Result<Tristate<String>, ProviderError> {
    match policy {
        Some(Value::Null) | None => Ok(Tristate::Null),
        Some(policy) => json.render(policy).map(Tristate::Known),
    }
}

impl ActionPermissionsState {
    /// Path segment the permissions are addressed by.
    ///
    /// Legacy state names the action `<blueprint>_<action>`.
    fn request_identifier(&self) -> Result<String, ProviderError> {
        let action = require(&self.action_identifier, "action_identifier")?;
        Ok(match self.blueprint_identifier.known() {
            Some(blueprint) => format!("{}_{}", blueprint, action),
            None => action.to_string(),
        })
    }

    pub fn to_wire(&self) -> Result<api::ActionPermissions, ProviderError> {
        let declared = self.permissions.known().cloned().unwrap_or_default();
        let execute = declared.execute.known().cloned().unwrap_or_default();
        let approve = declared.approve.known().cloned().unwrap_or_default();

        Ok(api::ActionPermissions {
            execute: api::ExecutePermissions {
                users: execute.users.cloned().unwrap_or_default(),
                roles: execute.roles.cloned().unwrap_or_default(),
                teams: execute.teams.cloned().unwrap_or_default(),
                owned_by_team: execute.owned_by_team.cloned(),
                policy: policy_to_wire(&execute.policy, "permissions.execute.policy")?,
            },
            approve: api::PermissionSet {
                users: approve.users.cloned().unwrap_or_default(),
                roles: approve.roles.cloned().unwrap_or_default(),
                teams: approve.teams.cloned().unwrap_or_default(),
                policy: policy_to_wire(&approve.policy, "permissions.approve.policy")?,
            },
        })
    }

    /// Rebuild state from the Portal. `owned_by_team` defaults to true.
    pub fn refresh(
        action_identifier: &str,
        remote: &api::ActionPermissions,
        prior: &ActionPermissionsState,
        json: &Canonicalizer,
    ) -> Result<Self, ProviderError> {
        let prior_permissions = prior.permissions.known().cloned().unwrap_or_default();
        let prior_execute = prior_permissions.execute.known().cloned().unwrap_or_default();
        let prior_approve = prior_permissions.approve.known().cloned().unwrap_or_default();

        let execute = ExecuteState {
            users: refreshed_list(&prior_execute.users, remote.execute.users.clone()),
            roles: refreshed_list(&prior_execute.roles, remote.execute.roles.clone()),
            teams: refreshed_list(&prior_execute.teams, remote.execute.teams.clone()),
            owned_by_team: Tristate::Known(remote.execute.owned_by_team.unwrap_or(true)),
            policy: policy_from_wire(&remote.execute.policy, json)?,
        };
        let approve = ApproveState {
            users: refreshed_list(&prior_approve.users, remote.approve.users.clone()),
            roles: refreshed_list(&prior_approve.roles, remote.approve.roles.clone()),
            teams: refreshed_list(&prior_approve.teams, remote.approve.teams.clone()),
            policy: policy_from_wire(&remote.approve.policy, json)?,
        };

        Ok(Self {
            id: Tristate::Known(action_identifier.to_string()),
            action_identifier: Tristate::Known(action_identifier.to_string()),
            blueprint_identifier: Tristate::Null,
            permissions: Tristate::Known(PermissionsState {
                execute: Tristate::Known(execute),
                approve: Tristate::Known(approve),
            }),
        })
    }
}

/// Controller for `port_action_permissions`.
#[derive(Debug, Default)]
pub struct ActionPermissionsResource;

impl ActionPermissionsResource {
    async fn apply(ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        let mut state: ActionPermissionsState = decode(planned)?;
        let action = require(&state.action_identifier, "action_identifier")?.to_string();
        let request_identifier = state.request_identifier()?;

        ctx.api
            .update_action_permissions(&request_identifier, &state.to_wire()?)
            .await?;
        info!(action = %action, "updated action permissions");

        if state.blueprint_identifier.is_known() {
            debug!(action = %action, "clearing legacy blueprint_identifier");
        }
        state.blueprint_identifier = Tristate::Null;
        state.id = Tristate::Known(action);
        encode(&state)
    }
}

fn principals(block: Block) -> Block {
    block
        .with_attribute("users", Attribute::optional_list(AttributeType::String))
        .with_attribute("roles", Attribute::optional_list(AttributeType::String))
        .with_attribute("teams", Attribute::optional_list(AttributeType::String))
        .with_attribute("policy", Attribute::optional_string().json())
}

#[async_trait]
impl Resource for ActionPermissionsResource {
    fn type_name(&self) -> &'static str {
        "port_action_permissions"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Execution and approval permissions of an action")
            .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute("action_identifier", Attribute::required_string().with_force_new())
            .with_attribute(
                "blueprint_identifier",
                Attribute::optional_string()
                    .with_description("Deprecated; cleared after the first apply"),
            )
            .with_block(
                "permissions",
                NestedBlock::single(
                    Block::new()
                        .with_block(
                            "execute",
                            NestedBlock::single(
                                principals(Block::new())
                                    .with_attribute("owned_by_team", Attribute::defaulted_bool(true)),
                            )
                            .with_min_items(1),
                        )
                        .with_block(
                            "approve",
                            NestedBlock::single(principals(Block::new())).with_min_items(1),
                        ),
                )
                .with_min_items(1),
            )
    }

    #[instrument(skip_all, fields(resource_type = "port_action_permissions"))]
    async fn create(&self, ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        Self::apply(ctx, planned).await
    }

    #[instrument(skip_all, fields(resource_type = "port_action_permissions"))]
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: ActionPermissionsState = decode(state)?;
        let action = require(&prior.action_identifier, "action_identifier")?;
        let Some(remote) = found(ctx.api.read_action_permissions(action).await)? else {
            warn!(action = %action, "action no longer exists, dropping permissions from state");
            return Ok(None);
        };
        encode(&ActionPermissionsState::refresh(action, &remote, &prior, &ctx.json)?).map(Some)
    }

    #[instrument(skip_all, fields(resource_type = "port_action_permissions"))]
    async fn update(
        &self,
        ctx: &Context,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        Self::apply(ctx, planned).await
    }

    async fn delete(&self, _ctx: &Context, state: Value) -> Result<(), ProviderError> {
        let state: ActionPermissionsState = decode(state)?;
        info!(
            action = %state.action_identifier.known().map(String::as_str).unwrap_or_default(),
            "action permissions are removed with their action, dropping from state"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = "port_action_permissions"))]
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError> {
        let remote = ctx.api.read_action_permissions(id).await?;
        encode(&ActionPermissionsState::refresh(
            id,
            &remote,
            &ActionPermissionsState::default(),
            &ctx.json,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryPortal;
    use serde_json::json;

    const POLICY: &str = r#"{"queries":{"executingUser":{"rules":[{"value":"user","operator":"=","property":"$blueprint"}],"combinator":"or"}},"conditions":["true"]}"#;
    const CANONICAL: &str = r#"{"conditions":["true"],"queries":{"executingUser":{"combinator":"or","rules":[{"operator":"=","property":"$blueprint","value":"user"}]}}}"#;

    fn portal_with_action() -> InMemoryPortal {
        let portal = InMemoryPortal::new();
        portal.insert_action(api::Action {
            identifier: "restart".to_string(),
            ..Default::default()
        });
        portal
    }

    #[tokio::test]
    async fn test_policy_is_canonicalized() {
        let portal = portal_with_action();
        let ctx = portal.context();
        let planned = json!({
            "action_identifier": "restart",
            "permissions": {
                "execute": {"roles": ["Member"], "owned_by_team": true, "policy": POLICY},
                "approve": {}
            }
        });

        let created = ActionPermissionsResource.create(&ctx, planned).await.unwrap();
        let read = ActionPermissionsResource.read(&ctx, created).await.unwrap().unwrap();
        assert_eq!(read["permissions"]["execute"]["policy"], json!(CANONICAL));
        assert_eq!(read["permissions"]["execute"]["roles"], json!(["Member"]));
        assert_eq!(read["permissions"]["approve"]["policy"], Value::Null);
    }

    #[tokio::test]
    async fn test_empty_blocks_default_owned_by_team() {
        let portal = portal_with_action();
        let imported = ActionPermissionsResource
            .import(&portal.context(), "restart")
            .await
            .unwrap();
        let state: ActionPermissionsState = decode(imported).unwrap();
        let permissions = state.permissions.known().unwrap();
        let execute = permissions.execute.known().unwrap();
        assert_eq!(execute.owned_by_team, Tristate::Known(true));
        assert!(execute.policy.is_null());
        assert!(execute.users.is_null());
        assert!(permissions.approve.known().unwrap().policy.is_null());
    }

    #[tokio::test]
    async fn test_legacy_identifier_used_then_cleared() {
        let portal = InMemoryPortal::new();
        portal.insert_action(api::Action {
            identifier: "microservice_restart".to_string(),
            ..Default::default()
        });
        let planned = json!({
            "action_identifier": "restart",
            "blueprint_identifier": "microservice",
            "permissions": {"execute": {"owned_by_team": false}, "approve": {}}
        });

        let applied = ActionPermissionsResource
            .create(&portal.context(), planned)
            .await
            .unwrap();
        assert_eq!(applied["blueprint_identifier"], Value::Null);
        assert_eq!(
            portal.permissions("microservice_restart").unwrap().execute.owned_by_team,
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_delete_is_state_only() {
        let portal = portal_with_action();
        ActionPermissionsResource
            .delete(&portal.context(), json!({"action_identifier": "restart"}))
            .await
            .unwrap();
        assert!(portal.action("restart").is_some());
    }
}
