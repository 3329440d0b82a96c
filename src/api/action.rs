use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::blueprint::Property;
use crate::value::JqOr;

/// A self-service action as exchanged with `/v1/actions`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_method: Option<InvocationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_approval: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_notification: Option<ApprovalNotification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_identifier: Option<String>,
    #[serde(default)]
    pub user_inputs: UserInputs,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserInputs {
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<JqOr<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
}

/// How the Portal delivers a run of the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InvocationMethod {
    #[serde(rename = "KAFKA")]
    Kafka,
    #[serde(rename = "WEBHOOK")]
    Webhook {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        synchronized: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
    },
    #[serde(rename = "GITHUB", rename_all = "camelCase")]
    Github {
        org: String,
        repo: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workflow: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        omit_payload: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        omit_user_inputs: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        report_workflow_status: Option<bool>,
    },
    #[serde(rename = "AZURE-DEVOPS")]
    Azure { org: String, webhook: String },
    #[serde(rename = "GITLAB", rename_all = "camelCase")]
    Gitlab {
        project_name: String,
        group_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        omit_payload: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        omit_user_inputs: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<bool>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApprovalNotification {
    Email,
    Webhook {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
}

/// `/v1/actions/{id}/permissions` body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionPermissions {
    #[serde(default)]
    pub execute: ExecutePermissions,
    #[serde(default)]
    pub approve: PermissionSet,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePermissions {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by_team: Option<bool>,
    #[serde(default)]
    pub policy: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub policy: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_method_tags() {
        let gitlab = InvocationMethod::Gitlab {
            project_name: "svc".to_string(),
            group_name: "platform".to_string(),
            omit_payload: None,
            omit_user_inputs: Some(true),
            default_ref: Some("main".to_string()),
            agent: None,
        };
        assert_eq!(
            serde_json::to_value(&gitlab).unwrap(),
            json!({
                "type": "GITLAB",
                "projectName": "svc",
                "groupName": "platform",
                "omitUserInputs": true,
                "defaultRef": "main"
            })
        );

        let azure: InvocationMethod =
            serde_json::from_value(json!({"type": "AZURE-DEVOPS", "org": "acme", "webhook": "deploy"}))
                .unwrap();
        assert_eq!(
            azure,
            InvocationMethod::Azure {
                org: "acme".to_string(),
                webhook: "deploy".to_string()
            }
        );
    }

    #[test]
    fn test_webhook_optional_fields_are_omitted() {
        let webhook = InvocationMethod::Webhook {
            url: "https://hook".to_string(),
            agent: None,
            synchronized: None,
            method: None,
        };
        assert_eq!(
            serde_json::to_value(&webhook).unwrap(),
            json!({"type": "WEBHOOK", "url": "https://hook"})
        );
    }

    #[test]
    fn test_approval_notification() {
        let email: ApprovalNotification = serde_json::from_value(json!({"type": "email"})).unwrap();
        assert_eq!(email, ApprovalNotification::Email);

        let webhook = serde_json::to_value(ApprovalNotification::Webhook {
            url: "https://approve".to_string(),
            format: Some("slack".to_string()),
        })
        .unwrap();
        assert_eq!(
            webhook,
            json!({"type": "webhook", "url": "https://approve", "format": "slack"})
        );
    }

    #[test]
    fn test_permissions_defaults() {
        let perms: ActionPermissions =
            serde_json::from_value(json!({"execute": {}, "approve": {}})).unwrap();
        assert!(perms.execute.users.is_empty());
        assert_eq!(perms.execute.owned_by_team, None);
        assert_eq!(perms.approve.policy, None);
    }
}
