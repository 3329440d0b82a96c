//! Portal API client.
//!
//! [`PortApi`] is the seam between the resource controllers and the Portal.
//! [`PortClient`] talks to the real REST API; tests use
//! [`InMemoryPortal`](crate::testing::InMemoryPortal).

mod http;

pub use http::PortClient;

use async_trait::async_trait;

use crate::api::{
    Action, ActionPermissions, Blueprint, Entity, Integration, Migration, SearchRequest,
    SearchResponse,
};
use crate::error::ProviderError;

/// Default Portal endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.getport.io";

/// Operations the provider needs from the Portal, grouped by resource family.
///
/// Non-2xx responses surface as [`ProviderError`] via
/// [`ProviderError::from_status`], so a missing object is
/// [`ProviderError::NotFound`].
#[async_trait]
pub trait PortApi: Send + Sync {
    // Blueprints

    /// `POST /v1/blueprints?create_catalog_page=<bool>`.
    async fn create_blueprint(
        &self,
        blueprint: &Blueprint,
        create_catalog_page: bool,
    ) -> Result<Blueprint, ProviderError>;

    /// `GET /v1/blueprints/{id}`.
    async fn read_blueprint(&self, identifier: &str) -> Result<Blueprint, ProviderError>;

    /// `GET /v1/blueprints/{id}/system`, the Portal-owned skeleton.
    async fn read_system_blueprint(&self, identifier: &str) -> Result<Blueprint, ProviderError>;

    /// `PUT /v1/blueprints/{id}`.
    async fn update_blueprint(
        &self,
        identifier: &str,
        blueprint: &Blueprint,
    ) -> Result<Blueprint, ProviderError>;

    /// `DELETE /v1/blueprints/{id}`.
    async fn delete_blueprint(&self, identifier: &str) -> Result<(), ProviderError>;

    /// `DELETE /v1/blueprints/{id}/all-entities?delete_blueprint=true`.
    ///
    /// Returns the id of the migration performing the cascade.
    async fn delete_blueprint_with_entities(
        &self,
        identifier: &str,
    ) -> Result<String, ProviderError>;

    /// `GET /v1/migrations/{id}`.
    async fn read_migration(&self, migration_id: &str) -> Result<Migration, ProviderError>;

    // Entities

    /// `POST /v1/blueprints/{bp}/entities?upsert=false`.
    async fn create_entity(
        &self,
        entity: &Entity,
        run_id: Option<&str>,
    ) -> Result<Entity, ProviderError>;

    /// `GET /v1/blueprints/{bp}/entities/{id}`.
    async fn read_entity(&self, blueprint: &str, identifier: &str)
        -> Result<Entity, ProviderError>;

    /// `PUT /v1/blueprints/{bp}/entities/{id}`.
    async fn update_entity(
        &self,
        blueprint: &str,
        identifier: &str,
        entity: &Entity,
        run_id: Option<&str>,
    ) -> Result<Entity, ProviderError>;

    /// `DELETE /v1/blueprints/{bp}/entities/{id}`.
    async fn delete_entity(&self, blueprint: &str, identifier: &str)
        -> Result<(), ProviderError>;

    // Actions

    /// `POST /v1/actions`.
    async fn create_action(&self, action: &Action) -> Result<Action, ProviderError>;

    /// `GET /v1/actions/{id}`.
    async fn read_action(&self, identifier: &str) -> Result<Action, ProviderError>;

    /// `PUT /v1/actions/{id}`.
    async fn update_action(&self, identifier: &str, action: &Action)
        -> Result<Action, ProviderError>;

    /// `DELETE /v1/actions/{id}`.
    async fn delete_action(&self, identifier: &str) -> Result<(), ProviderError>;

    /// `GET /v1/actions/{id}/permissions`.
    async fn read_action_permissions(
        &self,
        action_identifier: &str,
    ) -> Result<ActionPermissions, ProviderError>;

    /// `PATCH /v1/actions/{id}/permissions`.
    async fn update_action_permissions(
        &self,
        action_identifier: &str,
        permissions: &ActionPermissions,
    ) -> Result<ActionPermissions, ProviderError>;

    // Integrations

    /// `POST /v1/integration`.
    async fn create_integration(
        &self,
        integration: &Integration,
    ) -> Result<Integration, ProviderError>;

    /// `GET /v1/integration/{id}`.
    async fn read_integration(&self, installation_id: &str)
        -> Result<Integration, ProviderError>;

    /// `PATCH /v1/integration/{id}`.
    async fn update_integration(
        &self,
        installation_id: &str,
        integration: &Integration,
    ) -> Result<Integration, ProviderError>;

    /// `DELETE /v1/integration/{id}`.
    async fn delete_integration(&self, installation_id: &str) -> Result<(), ProviderError>;

    // Search

    /// `POST /v1/entities/search`.
    async fn search_entities(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ProviderError>;
}
