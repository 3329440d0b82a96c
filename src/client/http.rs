use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::PortApi;
use crate::api::{
    Action, ActionPermissions, Blueprint, Entity, Integration, Migration, SearchRequest,
    SearchResponse,
};
use crate::error::ProviderError;

/// Credentials used to obtain a bearer token.
#[derive(Clone)]
enum Credentials {
    Token(String),
    ClientSecret { client_id: String, secret: String },
}

/// REST client for the Portal.
///
/// Safe to share between concurrent operations; the access token is fetched
/// once and cached.
pub struct PortClient {
    base_url: String,
    client: Client,
    credentials: Credentials,
    token: Mutex<Option<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct BlueprintEnvelope {
    blueprint: Blueprint,
}

#[derive(Deserialize)]
struct EntityEnvelope {
    entity: Entity,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

#[derive(Deserialize)]
struct PermissionsEnvelope {
    permissions: ActionPermissions,
}

#[derive(Deserialize)]
struct IntegrationEnvelope {
    integration: Integration,
}

#[derive(Deserialize)]
struct MigrationEnvelope {
    migration: Migration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MigrationIdEnvelope {
    migration_id: String,
}

impl PortClient {
    /// Build a client authenticating with a pre-issued token.
    pub fn with_token(base_url: &str, token: impl Into<String>) -> Result<Self, ProviderError> {
        let token = token.into();
        Self::build(base_url, Credentials::Token(token.clone()), Some(token))
    }

    /// Build a client that exchanges a client id and secret for a token on first use.
    pub fn with_client_secret(
        base_url: &str,
        client_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::build(
            base_url,
            Credentials::ClientSecret {
                client_id: client_id.into(),
                secret: secret.into(),
            },
            None,
        )
    }

    fn build(
        base_url: &str,
        credentials: Credentials,
        token: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(concat!("hemmer-provider-port/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials,
            token: Mutex::new(token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = match &self.credentials {
            Credentials::Token(token) => token.clone(),
            Credentials::ClientSecret { client_id, secret } => {
                debug!("exchanging client credentials for an access token");
                let response = self
                    .client
                    .post(self.url("/auth/access_token"))
                    .json(&TokenRequest {
                        client_id,
                        client_secret: secret,
                    })
                    .send()
                    .await?;
                decode::<TokenResponse>(response).await?.access_token
            },
        };
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ProviderError> {
        let token = self.access_token().await?;
        Ok(self.client.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ProviderError> {
        let response = builder.send().await?;
        decode(response).await
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ProviderError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), &body))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::from_status(status.as_u16(), &body));
    }
    Ok(serde_json::from_str(&body)?)
}

fn run_id_query(run_id: Option<&str>) -> Vec<(&'static str, &str)> {
    run_id.map(|id| vec![("run_id", id)]).unwrap_or_default()
}

#[async_trait]
impl PortApi for PortClient {
    #[instrument(skip(self, blueprint), fields(identifier = %blueprint.identifier))]
    async fn create_blueprint(
        &self,
        blueprint: &Blueprint,
        create_catalog_page: bool,
    ) -> Result<Blueprint, ProviderError> {
        let req = self
            .request(Method::POST, "/blueprints")
            .await?
            .query(&[("create_catalog_page", create_catalog_page)])
            .json(blueprint);
        Ok(self.send::<BlueprintEnvelope>(req).await?.blueprint)
    }

    #[instrument(skip(self))]
    async fn read_blueprint(&self, identifier: &str) -> Result<Blueprint, ProviderError> {
        let req = self
            .request(Method::GET, &format!("/blueprints/{}", identifier))
            .await?;
        Ok(self.send::<BlueprintEnvelope>(req).await?.blueprint)
    }

    #[instrument(skip(self))]
    async fn read_system_blueprint(&self, identifier: &str) -> Result<Blueprint, ProviderError> {
        let req = self
            .request(Method::GET, &format!("/blueprints/{}/system", identifier))
            .await?;
        Ok(self.send::<BlueprintEnvelope>(req).await?.blueprint)
    }

    #[instrument(skip(self, blueprint))]
    async fn update_blueprint(
        &self,
        identifier: &str,
        blueprint: &Blueprint,
    ) -> Result<Blueprint, ProviderError> {
        let req = self
            .request(Method::PUT, &format!("/blueprints/{}", identifier))
            .await?
            .json(blueprint);
        Ok(self.send::<BlueprintEnvelope>(req).await?.blueprint)
    }

    #[instrument(skip(self))]
    async fn delete_blueprint(&self, identifier: &str) -> Result<(), ProviderError> {
        let req = self
            .request(Method::DELETE, &format!("/blueprints/{}", identifier))
            .await?;
        self.send_empty(req).await
    }

    #[instrument(skip(self))]
    async fn delete_blueprint_with_entities(
        &self,
        identifier: &str,
    ) -> Result<String, ProviderError> {
        let req = self
            .request(
                Method::DELETE,
                &format!("/blueprints/{}/all-entities", identifier),
            )
            .await?
            .query(&[("delete_blueprint", true)]);
        Ok(self.send::<MigrationIdEnvelope>(req).await?.migration_id)
    }

    #[instrument(skip(self))]
    async fn read_migration(&self, migration_id: &str) -> Result<Migration, ProviderError> {
        let req = self
            .request(Method::GET, &format!("/migrations/{}", migration_id))
            .await?;
        Ok(self.send::<MigrationEnvelope>(req).await?.migration)
    }

    #[instrument(skip(self, entity), fields(blueprint = %entity.blueprint))]
    async fn create_entity(
        &self,
        entity: &Entity,
        run_id: Option<&str>,
    ) -> Result<Entity, ProviderError> {
        let req = self
            .request(
                Method::POST,
                &format!("/blueprints/{}/entities", entity.blueprint),
            )
            .await?
            .query(&[("upsert", "false")])
            .query(&run_id_query(run_id))
            .json(entity);
        Ok(self.send::<EntityEnvelope>(req).await?.entity)
    }

    #[instrument(skip(self))]
    async fn read_entity(
        &self,
        blueprint: &str,
        identifier: &str,
    ) -> Result<Entity, ProviderError> {
        let req = self
            .request(
                Method::GET,
                &format!("/blueprints/{}/entities/{}", blueprint, identifier),
            )
            .await?;
        Ok(self.send::<EntityEnvelope>(req).await?.entity)
    }

    #[instrument(skip(self, entity))]
    async fn update_entity(
        &self,
        blueprint: &str,
        identifier: &str,
        entity: &Entity,
        run_id: Option<&str>,
    ) -> Result<Entity, ProviderError> {
        let req = self
            .request(
                Method::PUT,
                &format!("/blueprints/{}/entities/{}", blueprint, identifier),
            )
            .await?
            .query(&run_id_query(run_id))
            .json(entity);
        Ok(self.send::<EntityEnvelope>(req).await?.entity)
    }

    #[instrument(skip(self))]
    async fn delete_entity(&self, blueprint: &str, identifier: &str) -> Result<(), ProviderError> {
        let req = self
            .request(
                Method::DELETE,
                &format!("/blueprints/{}/entities/{}", blueprint, identifier),
            )
            .await?;
        self.send_empty(req).await
    }

    #[instrument(skip(self, action), fields(identifier = %action.identifier))]
    async fn create_action(&self, action: &Action) -> Result<Action, ProviderError> {
        let req = self.request(Method::POST, "/actions").await?.json(action);
        Ok(self.send::<ActionEnvelope>(req).await?.action)
    }

    #[instrument(skip(self))]
    async fn read_action(&self, identifier: &str) -> Result<Action, ProviderError> {
        let req = self
            .request(Method::GET, &format!("/actions/{}", identifier))
            .await?;
        Ok(self.send::<ActionEnvelope>(req).await?.action)
    }

    #[instrument(skip(self, action))]
    async fn update_action(&self, identifier: &str, action: &Action) -> Result<Action, ProviderError> {
        let req = self
            .request(Method::PUT, &format!("/actions/{}", identifier))
            .await?
            .json(action);
        Ok(self.send::<ActionEnvelope>(req).await?.action)
    }

    #[instrument(skip(self))]
    async fn delete_action(&self, identifier: &str) -> Result<(), ProviderError> {
        let req = self
            .request(Method::DELETE, &format!("/actions/{}", identifier))
            .await?;
        self.send_empty(req).await
    }

    #[instrument(skip(self))]
    async fn read_action_permissions(
        &self,
        action_identifier: &str,
    ) -> Result<ActionPermissions, ProviderError> {
        let req = self
            .request(
                Method::GET,
                &format!("/actions/{}/permissions", action_identifier),
            )
            .await?;
        Ok(self.send::<PermissionsEnvelope>(req).await?.permissions)
    }

    #[instrument(skip(self, permissions))]
    async fn update_action_permissions(
        &self,
        action_identifier: &str,
        permissions: &ActionPermissions,
    ) -> Result<ActionPermissions, ProviderError> {
        let req = self
            .request(
                Method::PATCH,
                &format!("/actions/{}/permissions", action_identifier),
            )
            .await?
            .json(permissions);
        Ok(self.send::<PermissionsEnvelope>(req).await?.permissions)
    }

    #[instrument(skip(self, integration), fields(installation_id = %integration.installation_id))]
    async fn create_integration(
        &self,
        integration: &Integration,
    ) -> Result<Integration, ProviderError> {
        let req = self
            .request(Method::POST, "/integration")
            .await?
            .json(integration);
        Ok(self.send::<IntegrationEnvelope>(req).await?.integration)
    }

    #[instrument(skip(self))]
    async fn read_integration(&self, installation_id: &str) -> Result<Integration, ProviderError> {
        let req = self
            .request(Method::GET, &format!("/integration/{}", installation_id))
            .await?;
        Ok(self.send::<IntegrationEnvelope>(req).await?.integration)
    }

    #[instrument(skip(self, integration))]
    async fn update_integration(
        &self,
        installation_id: &str,
        integration: &Integration,
    ) -> Result<Integration, ProviderError> {
        let req = self
            .request(Method::PATCH, &format!("/integration/{}", installation_id))
            .await?
            .json(integration);
        Ok(self.send::<IntegrationEnvelope>(req).await?.integration)
    }

    #[instrument(skip(self))]
    async fn delete_integration(&self, installation_id: &str) -> Result<(), ProviderError> {
        let req = self
            .request(Method::DELETE, &format!("/integration/{}", installation_id))
            .await?;
        self.send_empty(req).await
    }

    #[instrument(skip(self, request))]
    async fn search_entities(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ProviderError> {
        let req = self
            .request(Method::POST, "/entities/search")
            .await?
            .json(request);
        self.send(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = PortClient::with_token("https://api.getport.io/", "t").unwrap();
        assert_eq!(client.url("/blueprints"), "https://api.getport.io/v1/blueprints");
    }

    #[tokio::test]
    async fn test_token_credentials_skip_exchange() {
        let client = PortClient::with_token("https://api.example.test", "tok").unwrap();
        assert_eq!(client.access_token().await.unwrap(), "tok");
    }

    #[test]
    fn test_run_id_query() {
        assert!(run_id_query(None).is_empty());
        assert_eq!(run_id_query(Some("r_1")), vec![("run_id", "r_1")]);
    }
}
