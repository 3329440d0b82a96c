//! Hemmer Provider for Port
//!
//! This crate reconciles declared configuration against the Port developer
//! portal. It exposes [`PortProvider`], an implementation of
//! [`ProviderService`] that the Hemmer host drives through the usual
//! plan/apply lifecycle.
//!
//! # Overview
//!
//! - **Resources**: `port_blueprint`, `port_system_blueprint`, `port_entity`,
//!   `port_action`, `port_action_permissions`, `port_aggregation_properties`
//!   and `port_integration`
//! - **Data sources**: `port_search`
//! - **Schema types**: attribute and block descriptions the host uses for
//!   validation and planning
//! - **Canonical JSON**: free-form JSON attributes are stored sorted and
//!   compact so plans stay stable
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_port::{PortProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     hemmer_provider_port::init_logging();
//!
//!     let provider = PortProvider::new();
//!     provider
//!         .configure(json!({"client_id": "...", "secret": "..."}))
//!         .await?;
//!
//!     let plan = provider
//!         .plan("port_blueprint", None, json!({"identifier": "microservice"}), json!(null))
//!         .await?;
//!     let state = provider.create("port_blueprint", plan.planned_state).await?;
//!     println!("{}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! Provider attributes left unset fall back to `PORT_CLIENT_ID`,
//! `PORT_CLIENT_SECRET`, `PORT_TOKEN`, `PORT_BASE_URL` and
//! `PORT_BETA_FEATURES_ENABLED`. See [`config`].

#![warn(missing_docs)]
#![warn(clippy::all)]

#[allow(missing_docs)]
pub mod api;
pub mod canonical;
pub mod client;
#[allow(missing_docs)]
pub mod config;
#[allow(missing_docs)]
pub mod data_sources;
pub mod error;
pub mod ids;
pub mod logging;
pub mod merge;
pub mod migration;
pub mod plan;
#[allow(missing_docs)]
pub mod properties;
pub mod provider;
#[allow(missing_docs)]
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::PortProvider;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
