//! `port_action`: a self-service action on a blueprint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{decode, encode, found, require, Context, Resource};
use crate::api;
use crate::canonical::Canonicalizer;
use crate::error::ProviderError;
use crate::ids::parse_composite;
use crate::properties::action::{self as inputs, ActionInputs};
use crate::properties::refreshed_list;
use crate::schema::{Attribute, AttributeType, Block, NestedBlock, Schema};
use crate::value::{Marker, Tristate};

/// Trigger type sent for every action managed here.
pub const SELF_SERVICE_TRIGGER: &str = "self-service";

const INVOCATION_METHODS: &[&str] = &[
    "kafka_method",
    "webhook_method",
    "github_method",
    "azure_method",
    "gitlab_method",
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookMethodState {
    pub url: String,
    pub agent: Tristate<bool>,
    pub synchronized: Tristate<bool>,
    pub method: Tristate<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubMethodState {
    pub org: String,
    pub repo: String,
    pub workflow: Tristate<String>,
    pub omit_payload: Tristate<bool>,
    pub omit_user_inputs: Tristate<bool>,
    pub report_workflow_status: Tristate<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureMethodState {
    pub org: String,
    pub webhook: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitlabMethodState {
    pub project_name: String,
    pub group_name: String,
    pub omit_payload: Tristate<bool>,
    pub omit_user_inputs: Tristate<bool>,
    pub default_ref: Tristate<String>,
    pub agent: Tristate<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalWebhookState {
    pub url: String,
    pub format: Tristate<String>,
}

/// State of a `port_action`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionState {
    pub id: Tristate<String>,
    pub identifier: Tristate<String>,
    pub blueprint: Tristate<String>,
    pub title: Tristate<String>,
    pub icon: Tristate<String>,
    pub description: Tristate<String>,
    pub trigger: Tristate<String>,
    pub kafka_method: Tristate<Marker>,
    pub webhook_method: Tristate<WebhookMethodState>,
    pub github_method: Tristate<GithubMethodState>,
    pub azure_method: Tristate<AzureMethodState>,
    pub gitlab_method: Tristate<GitlabMethodState>,
    pub user_properties: Tristate<ActionInputs>,
    pub required_jq_query: Tristate<String>,
    pub order_properties: Tristate<Vec<String>>,
    pub required_approval: Tristate<bool>,
    pub approval_email_notification: Tristate<Marker>,
    pub approval_webhook_notification: Tristate<ApprovalWebhookState>,
    pub publish: Tristate<bool>,
}

impl ActionState {
    fn invocation_method(&self) -> Result<api::InvocationMethod, ProviderError> {
        let mut methods = Vec::new();
        if self.kafka_method.is_known() {
            methods.push(api::InvocationMethod::Kafka);
        }
        if let Some(m) = self.webhook_method.known() {
            methods.push(api::InvocationMethod::Webhook {
                url: m.url.clone(),
                agent: m.agent.cloned(),
                synchronized: m.synchronized.cloned(),
                method: m.method.cloned(),
            });
        }
        if let Some(m) = self.github_method.known() {
            methods.push(api::InvocationMethod::Github {
                org: m.org.clone(),
                repo: m.repo.clone(),
                workflow: m.workflow.cloned(),
                omit_payload: m.omit_payload.cloned(),
                omit_user_inputs: m.omit_user_inputs.cloned(),
                report_workflow_status: m.report_workflow_status.cloned(),
            });
        }
        if let Some(m) = self.azure_method.known() {
            methods.push(api::InvocationMethod::Azure {
                org: m.org.clone(),
                webhook: m.webhook.clone(),
            });
        }
        if let Some(m) = self.gitlab_method.known() {
            methods.push(api::InvocationMethod::Gitlab {
                project_name: m.project_name.clone(),
                group_name: m.group_name.clone(),
                omit_payload: m.omit_payload.cloned(),
                omit_user_inputs: m.omit_user_inputs.cloned(),
                default_ref: m.default_ref.cloned(),
                agent: m.agent.cloned(),
            });
        }

        match methods.len() {
            1 => Ok(methods.remove(0)),
            _ => Err(ProviderError::Validation(format!(
                "exactly one of {} must be set",
                INVOCATION_METHODS.join(", ")
            ))),
        }
    }

    fn approval_notification(&self) -> Result<Option<api::ApprovalNotification>, ProviderError> {
        match (
            self.approval_email_notification.known(),
            self.approval_webhook_notification.known(),
        ) {
            (Some(_), Some(_)) => Err(ProviderError::Validation(
                "only one of approval_email_notification, approval_webhook_notification may be set"
                    .to_string(),
            )),
            (Some(_), None) => Ok(Some(api::ApprovalNotification::Email)),
            (None, Some(webhook)) => Ok(Some(api::ApprovalNotification::Webhook {
                url: webhook.url.clone(),
                format: webhook.format.cloned(),
            })),
            (None, None) => Ok(None),
        }
    }

    /// Project to the wire body.
    pub fn to_wire(&self) -> Result<api::Action, ProviderError> {
        let identifier = require(&self.identifier, "identifier")?;
        let mut user_inputs = match self.user_properties.known() {
            Some(declared) => inputs::project(declared, &self.required_jq_query)?,
            None => inputs::project(&ActionInputs::default(), &self.required_jq_query)?,
        };
        user_inputs.order = self.order_properties.cloned();

        Ok(api::Action {
            identifier: identifier.to_string(),
            title: self.title.cloned(),
            icon: self.icon.cloned(),
            description: self.description.cloned(),
            trigger: api::Trigger {
                kind: SELF_SERVICE_TRIGGER.to_string(),
                operation: require(&self.trigger, "trigger")?.to_string(),
                blueprint_identifier: self.blueprint.cloned(),
                user_inputs,
            },
            invocation_method: Some(self.invocation_method()?),
            required_approval: self.required_approval.cloned(),
            approval_notification: self.approval_notification()?,
            publish: self.publish.cloned(),
        })
    }

    /// Rebuild state from the Portal.
    pub fn refresh(
        remote: &api::Action,
        prior: &ActionState,
        json: &Canonicalizer,
    ) -> Result<Self, ProviderError> {
        let prior_inputs = prior.user_properties.known().cloned().unwrap_or_default();
        let (user_properties, required_jq_query) =
            inputs::refresh(&remote.trigger.user_inputs, &prior_inputs, json)?;
        let user_properties = if user_properties.is_empty() && !prior.user_properties.is_known() {
            Tristate::Null
        } else {
            Tristate::Known(user_properties)
        };

        let mut state = Self {
            id: Tristate::Known(remote.identifier.clone()),
            identifier: Tristate::Known(remote.identifier.clone()),
            blueprint: Tristate::from_option(remote.trigger.blueprint_identifier.clone()),
            title: Tristate::from_option(remote.title.clone()),
            icon: Tristate::from_option(remote.icon.clone()),
            description: Tristate::from_option(remote.description.clone()),
            trigger: Tristate::Known(remote.trigger.operation.clone()),
            user_properties,
            required_jq_query,
            order_properties: refreshed_list(
                &prior.order_properties,
                remote.trigger.user_inputs.order.clone().unwrap_or_default(),
            ),
            required_approval: Tristate::from_option(remote.required_approval),
            publish: Tristate::from_option(remote.publish),
            ..Default::default()
        };

        match &remote.invocation_method {
            Some(api::InvocationMethod::Kafka) => state.kafka_method = Tristate::Known(Marker {}),
            Some(api::InvocationMethod::Webhook {
                url,
                agent,
                synchronized,
                method,
            }) => {
                state.webhook_method = Tristate::Known(WebhookMethodState {
                    url: url.clone(),
                    agent: Tristate::from_option(*agent),
                    synchronized: Tristate::from_option(*synchronized),
                    method: Tristate::from_option(method.clone()),
                })
            },
            Some(api::InvocationMethod::Github {
                org,
                repo,
                workflow,
                omit_payload,
                omit_user_inputs,
                report_workflow_status,
            }) => {
                state.github_method = Tristate::Known(GithubMethodState {
                    org: org.clone(),
                    repo: repo.clone(),
                    workflow: Tristate::from_option(workflow.clone()),
                    omit_payload: Tristate::from_option(*omit_payload),
                    omit_user_inputs: Tristate::from_option(*omit_user_inputs),
                    report_workflow_status: Tristate::from_option(*report_workflow_status),
                })
            },
            Some(api::InvocationMethod::Azure { org, webhook }) => {
                state.azure_method = Tristate::Known(AzureMethodState {
                    org: org.clone(),
                    webhook: webhook.clone(),
                })
            },
            Some(api::InvocationMethod::Gitlab {
                project_name,
                group_name,
                omit_payload,
                omit_user_inputs,
                default_ref,
                agent,
            }) => {
                state.gitlab_method = Tristate::Known(GitlabMethodState {
                    project_name: project_name.clone(),
                    group_name: group_name.clone(),
                    omit_payload: Tristate::from_option(*omit_payload),
                    omit_user_inputs: Tristate::from_option(*omit_user_inputs),
                    default_ref: Tristate::from_option(default_ref.clone()),
                    agent: Tristate::from_option(*agent),
                })
            },
            None => {},
        }

        match &remote.approval_notification {
            Some(api::ApprovalNotification::Email) => {
                state.approval_email_notification = Tristate::Known(Marker {})
            },
            Some(api::ApprovalNotification::Webhook { url, format }) => {
                state.approval_webhook_notification = Tristate::Known(ApprovalWebhookState {
                    url: url.clone(),
                    format: Tristate::from_option(format.clone()),
                })
            },
            None => {},
        }

        Ok(state)
    }
}

fn invocation_blocks(schema: Schema) -> Schema {
    schema
        .with_block(
            "kafka_method",
            NestedBlock::single(Block::new().with_description("Publish runs to Kafka")),
        )
        .with_block(
            "webhook_method",
            NestedBlock::single(
                Block::new()
                    .with_attribute("url", Attribute::required_string())
                    .with_attribute("agent", Attribute::optional_bool())
                    .with_attribute("synchronized", Attribute::optional_bool())
                    .with_attribute(
                        "method",
                        Attribute::optional_string()
                            .one_of(&["POST", "PUT", "PATCH", "DELETE"]),
                    ),
            ),
        )
        .with_block(
            "github_method",
            NestedBlock::single(
                Block::new()
                    .with_attribute("org", Attribute::required_string())
                    .with_attribute("repo", Attribute::required_string())
                    .with_attribute("workflow", Attribute::optional_string())
                    .with_attribute("omit_payload", Attribute::optional_bool())
                    .with_attribute("omit_user_inputs", Attribute::optional_bool())
                    .with_attribute("report_workflow_status", Attribute::optional_bool()),
            ),
        )
        .with_block(
            "azure_method",
            NestedBlock::single(
                Block::new()
                    .with_attribute("org", Attribute::required_string())
                    .with_attribute("webhook", Attribute::required_string()),
            ),
        )
        .with_block(
            "gitlab_method",
            NestedBlock::single(
                Block::new()
                    .with_attribute("project_name", Attribute::required_string())
                    .with_attribute("group_name", Attribute::required_string())
                    .with_attribute("omit_payload", Attribute::optional_bool())
                    .with_attribute("omit_user_inputs", Attribute::optional_bool())
                    .with_attribute("default_ref", Attribute::optional_string())
                    .with_attribute("agent", Attribute::optional_bool()),
            ),
        )
        .with_exactly_one_of(INVOCATION_METHODS)
}

/// Controller for `port_action`.
#[derive(Debug, Default)]
pub struct ActionResource;

#[async_trait]
impl Resource for ActionResource {
    fn type_name(&self) -> &'static str {
        "port_action"
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_description("A self-service action")
            .with_attribute("id", Attribute::computed_string().with_use_state_for_unknown())
            .with_attribute("identifier", Attribute::required_string().with_force_new())
            .with_attribute("blueprint", Attribute::required_string().with_force_new())
            .with_attribute("title", Attribute::optional_string())
            .with_attribute("icon", Attribute::optional_string())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "trigger",
                Attribute::required_string()
                    .with_description("Operation the action performs, e.g. CREATE or DAY-2"),
            )
            .with_block("user_properties", NestedBlock::single(inputs::schema_block()))
            .with_attribute("required_jq_query", Attribute::optional_string())
            .with_attribute("order_properties", Attribute::optional_list(AttributeType::String))
            .with_attribute("required_approval", Attribute::optional_bool())
            .with_block(
                "approval_email_notification",
                NestedBlock::single(Block::new()),
            )
            .with_block(
                "approval_webhook_notification",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("url", Attribute::required_string())
                        .with_attribute(
                            "format",
                            Attribute::optional_string().one_of(&["json", "slack"]),
                        ),
                ),
            )
            .with_at_most_one_of(&["approval_email_notification", "approval_webhook_notification"])
            .with_attribute("publish", Attribute::optional_bool());
        invocation_blocks(schema)
    }

    #[instrument(skip_all, fields(resource_type = "port_action"))]
    async fn create(&self, ctx: &Context, planned: Value) -> Result<Value, ProviderError> {
        let mut state: ActionState = decode(planned)?;
        let blueprint = require(&state.blueprint, "blueprint")?;
        if found(ctx.api.read_blueprint(blueprint).await)?.is_none() {
            return Err(ProviderError::FailedPrecondition(format!(
                "blueprint \"{}\" of the action does not exist",
                blueprint
            )));
        }

        let body = state.to_wire()?;
        let created = ctx.api.create_action(&body).await?;
        info!(identifier = %created.identifier, "created action");
        state.id = Tristate::Known(created.identifier);
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_action"))]
    async fn read(&self, ctx: &Context, state: Value) -> Result<Option<Value>, ProviderError> {
        let prior: ActionState = decode(state)?;
        let identifier = require(&prior.identifier, "identifier")?;
        let Some(remote) = found(ctx.api.read_action(identifier).await)? else {
            warn!(identifier = %identifier, "action no longer exists, dropping from state");
            return Ok(None);
        };
        encode(&ActionState::refresh(&remote, &prior, &ctx.json)?).map(Some)
    }

    #[instrument(skip_all, fields(resource_type = "port_action"))]
    async fn update(
        &self,
        ctx: &Context,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let mut state: ActionState = decode(planned)?;
        let body = state.to_wire()?;
        let updated = ctx.api.update_action(&body.identifier, &body).await?;
        info!(identifier = %updated.identifier, "updated action");
        state.id = Tristate::Known(updated.identifier);
        encode(&state)
    }

    #[instrument(skip_all, fields(resource_type = "port_action"))]
    async fn delete(&self, ctx: &Context, state: Value) -> Result<(), ProviderError> {
        let state: ActionState = decode(state)?;
        let identifier = require(&state.identifier, "identifier")?;
        if found(ctx.api.delete_action(identifier).await)?.is_none() {
            warn!(identifier = %identifier, "action already deleted");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = "port_action"))]
    async fn import(&self, ctx: &Context, id: &str) -> Result<Value, ProviderError> {
        let (blueprint, identifier) = parse_composite(id, "<blueprint>:<action>")?;
        let remote = ctx.api.read_action(&identifier).await?;
        if remote.trigger.blueprint_identifier.as_deref() != Some(blueprint.as_str()) {
            return Err(ProviderError::NotFound(format!(
                "action \"{}\" on blueprint \"{}\"",
                identifier, blueprint
            )));
        }
        encode(&ActionState::refresh(&remote, &ActionState::default(), &ctx.json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryPortal;
    use serde_json::json;

    fn day2() -> Value {
        json!({
            "identifier": "restart",
            "blueprint": "microservice",
            "title": "Restart",
            "trigger": "DAY-2",
            "kafka_method": {},
            "user_properties": {
                "string_props": {
                    "s": {"title": "S", "required": false, "default_jq_query": "'Test'"}
                }
            }
        })
    }

    fn portal_with_blueprint() -> InMemoryPortal {
        let portal = InMemoryPortal::new();
        portal.insert_blueprint(api::Blueprint {
            identifier: "microservice".to_string(),
            ..Default::default()
        });
        portal
    }

    fn without_id(state: Value) -> ActionState {
        let mut state: ActionState = decode(state).unwrap();
        state.id = Tristate::Null;
        state
    }

    #[tokio::test]
    async fn test_jq_default_round_trip() {
        let portal = portal_with_blueprint();
        let ctx = portal.context();

        let created = ActionResource.create(&ctx, day2()).await.unwrap();
        let wire = serde_json::to_value(portal.action("restart").unwrap()).unwrap();
        assert_eq!(
            wire["trigger"],
            json!({
                "type": "self-service",
                "operation": "DAY-2",
                "blueprintIdentifier": "microservice",
                "userInputs": {
                    "properties": {"s": {"type": "string", "title": "S", "default": {"jqQuery": "'Test'"}}},
                    "required": []
                }
            })
        );
        assert_eq!(wire["invocationMethod"], json!({"type": "KAFKA"}));

        let read = ActionResource.read(&ctx, created).await.unwrap().unwrap();
        let refreshed = without_id(read);
        assert_eq!(refreshed, without_id(day2()));
        let s = &refreshed.user_properties.known().unwrap().string_props.known().unwrap()["s"];
        assert!(s.default.is_null());
    }

    #[tokio::test]
    async fn test_missing_blueprint_rejected() {
        let portal = InMemoryPortal::new();
        let err = ActionResource.create(&portal.context(), day2()).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[test]
    fn test_two_invocation_methods_rejected() {
        let mut planned = day2();
        planned["webhook_method"] = json!({"url": "https://hook"});
        let state: ActionState = decode(planned).unwrap();
        assert!(state.to_wire().is_err());
    }

    #[tokio::test]
    async fn test_webhook_with_approval_and_order() {
        let portal = portal_with_blueprint();
        let ctx = portal.context();
        let mut planned = day2();
        planned.as_object_mut().unwrap().remove("kafka_method");
        planned["webhook_method"] = json!({"url": "https://hook", "synchronized": true});
        planned["approval_webhook_notification"] = json!({"url": "https://approve", "format": "slack"});
        planned["required_approval"] = json!(true);
        planned["order_properties"] = json!(["s"]);
        planned["publish"] = json!(true);

        let created = ActionResource.create(&ctx, planned.clone()).await.unwrap();
        let remote = portal.action("restart").unwrap();
        assert_eq!(remote.trigger.user_inputs.order, Some(vec!["s".to_string()]));

        let read = ActionResource.read(&ctx, created).await.unwrap().unwrap();
        assert_eq!(without_id(read), without_id(planned));
    }

    #[tokio::test]
    async fn test_import_checks_blueprint() {
        let portal = portal_with_blueprint();
        let ctx = portal.context();
        ActionResource.create(&ctx, day2()).await.unwrap();

        let imported = ActionResource.import(&ctx, "microservice:restart").await.unwrap();
        assert_eq!(without_id(imported), without_id(day2()));

        let err = ActionResource.import(&ctx, "other:restart").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
