//! The Port provider: dispatches host calls to resource controllers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::{info, instrument};

use crate::canonical::Canonicalizer;
use crate::client::PortApi;
use crate::config::{self, ProviderConfig};
use crate::data_sources::SearchDataSource;
use crate::error::ProviderError;
use crate::migration::DEFAULT_POLL_INTERVAL;
use crate::plan::plan_resource;
use crate::resources::{
    ActionPermissionsResource, ActionResource, AggregationPropertiesResource, BlueprintResource,
    Context, DataSource, EntityResource, IntegrationResource, Resource, SystemBlueprintResource,
};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

/// Provider name used as the resource type prefix.
pub const PROVIDER_NAME: &str = "port";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The Port provider.
///
/// Unconfigured until the host calls `configure`, except when built with
/// [`PortProvider::with_api`].
pub struct PortProvider {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
    context: RwLock<Option<Context>>,
    cancel: watch::Sender<bool>,
    poll_interval: Duration,
    env: EnvLookup,
}

impl Default for PortProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PortProvider {
    /// A provider reading environment fallbacks from the process environment.
    pub fn new() -> Self {
        let resources: Vec<Box<dyn Resource>> = vec![
            Box::new(BlueprintResource),
            Box::new(SystemBlueprintResource),
            Box::new(EntityResource),
            Box::new(ActionResource),
            Box::new(ActionPermissionsResource),
            Box::new(AggregationPropertiesResource),
            Box::new(IntegrationResource),
        ];
        let data_sources: Vec<Box<dyn DataSource>> = vec![Box::new(SearchDataSource)];
        let (cancel, _) = watch::channel(false);

        Self {
            resources: resources.into_iter().map(|r| (r.type_name(), r)).collect(),
            data_sources: data_sources.into_iter().map(|d| (d.type_name(), d)).collect(),
            context: RwLock::new(None),
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// A provider already configured against `api`.
    pub fn with_api(api: Arc<dyn PortApi>, json_escape_html: bool, beta_features_enabled: bool) -> Self {
        let provider = Self::new();
        let ctx = provider.build_context(api, json_escape_html, beta_features_enabled);
        Self {
            context: RwLock::new(Some(ctx)),
            ..provider
        }
    }

    /// Replace the environment used for configuration fallbacks.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(lookup);
        self
    }

    /// Set the delay between migration polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        if let Some(ctx) = self.context.get_mut() {
            ctx.poll_interval = interval;
        }
        self
    }

    fn build_context(
        &self,
        api: Arc<dyn PortApi>,
        json_escape_html: bool,
        beta_features_enabled: bool,
    ) -> Context {
        Context {
            api,
            json: Canonicalizer::new(json_escape_html),
            beta_features_enabled,
            poll_interval: self.poll_interval,
            cancel: self.cancel.subscribe(),
        }
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    async fn ctx(&self) -> Result<Context, ProviderError> {
        self.context.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }

    async fn canonicalizer(&self) -> Canonicalizer {
        match self.context.read().await.as_ref() {
            Some(ctx) => ctx.json,
            None => Canonicalizer::default(),
        }
    }
}

fn check(schema: &Schema, config: &Value) -> Result<(), ProviderError> {
    let errors: Vec<String> = validate(schema, config)
        .into_iter()
        .filter(|d| d.severity == DiagnosticSeverity::Error)
        .map(|d| match &d.attribute {
            Some(attribute) => format!("{}: {}", attribute, d.summary),
            None => d.summary,
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(errors.join("; ")))
    }
}

#[async_trait]
impl ProviderService for PortProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(config::schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |schema, (name, r)| schema.with_resource(*name, r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |schema, (name, d)| schema.with_data_source(*name, d.schema()))
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&config::schema(), &config))
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validate(&config::schema(), &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        let declared = ProviderConfig::from_value(config)?;
        let resolved = match declared.resolve(|name| (self.env)(name)) {
            Ok(resolved) => resolved,
            Err(e) => {
                return Ok(vec![Diagnostic::error("Invalid provider configuration")
                    .with_detail(e.message().to_string())]);
            },
        };
        let client = resolved.client()?;

        let ctx = self.build_context(
            Arc::new(client),
            resolved.json_escape_html,
            resolved.beta_features_enabled,
        );
        *self.context.write().await = Some(ctx);
        info!(
            base_url = %resolved.base_url,
            beta_features_enabled = resolved.beta_features_enabled,
            "configured Port provider"
        );
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.cancel.send_replace(true);
        info!("stop requested, cancelling in-flight operations");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&self.resource(resource_type)?.schema(), &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        if !proposed_state.is_null() {
            let config = if config.is_null() { &proposed_state } else { &config };
            check(&schema, config)?;
        }
        let json = self.canonicalizer().await;
        Ok(plan_resource(&schema, prior_state.as_ref(), &proposed_state, &json))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.create(&self.ctx().await?, planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.read(&self.ctx().await?, current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource
            .update(&self.ctx().await?, prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        resource.delete(&self.ctx().await?, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let state = resource.import(&self.ctx().await?, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&self.data_source(data_source_type)?.schema(), &config))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        check(&data_source.schema(), &config)?;
        data_source.read(&self.ctx().await?, config).await
    }
}
