//! agentdeploy engine
//!
//! Provider-neutral reconciliation for AgentCore deployments: discover what
//! already exists for a deployment name, decide what to do about it, provision
//! the runtime in dependency order and tear down leftovers safely.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 agentdeploy CLI                  │
//! │        (deploy / cleanup / endpoint / status)    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               agentdeploy-cloud                  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          DeploymentOrchestrator           │   │
//! │  └──┬────────────┬─────────────┬────────────┘   │
//! │  ┌──▼───────┐ ┌──▼───────┐ ┌───▼──────────┐     │
//! │  │Discovery │ │ Resolver │ │   Cleanup    │     │
//! │  └──┬───────┘ └──────────┘ └───┬──────────┘     │
//! │  ┌──▼───────────────────────────▼───────────┐   │
//! │  │   Adapters (timeout-bounded registry)     │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │agentdeploy-aws│ │   in-memory   │
//! └───────────────┘ └───────────────┘
//! ```

pub mod cleanup;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod memory;
pub mod metadata;
pub mod naming;
pub mod orchestrator;
pub mod provider;
pub mod resolver;
pub mod resource;

// Re-exports
pub use cleanup::{CleanupExecutor, CleanupPlan, CleanupReport, CleanupResult, PreDeleteStep};
pub use discovery::{Discovery, DiscoveryWarning, ResourceDiscovery};
pub use endpoint::{EndpointResolver, EndpointSource, ResolvedEndpoint, invocation_url};
pub use error::{CloudError, ErrorKind, Result};
pub use identity::{
    IdentityPoolRecord, IdentityProvider, OAuthCredentials, OAuthProviderRecord, OAuthSetup,
};
pub use metadata::{DeploymentMetadata, MetadataStore};
pub use naming::{max_resource_name_len, DeploymentName, MAX_DEPLOYMENT_NAME_LEN, OAUTH_PROVIDER_NAME};
pub use orchestrator::{
    ConflictPrompt, DeploymentFailure, DeploymentOrchestrator, DeploymentOutcome,
    DeploymentRequest, DeploymentState, RuntimeLayout, RuntimeResources, Stage,
};
pub use provider::{Adapters, ResourceAdapter, RolePolicies};
pub use resolver::{
    Conflict, ConflictAction, ConflictDecision, ConflictResolver, PolicyMode, Resolution,
    UserChoice,
};
pub use resource::{CreateSpec, DeleteSpec, JwtAuthorizer, Resource, ResourceKind};
