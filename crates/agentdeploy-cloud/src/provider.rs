//! Resource adapter traits and the timeout-bounded adapter registry

use crate::error::{CloudError, Result};
use crate::resource::{CreateSpec, DeleteSpec, Resource, ResourceKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default bound for a single provider call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider adapter for one resource kind
///
/// Implementations are stateless apart from their client handle and classify
/// every provider failure into [`CloudError`] before returning it. `describe`
/// must return [`CloudError::NotFound`] for absence and nothing else.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Resource kind this adapter manages
    fn kind(&self) -> ResourceKind;

    /// Look up a resource by its derived name
    async fn describe(&self, name: &str) -> Result<Resource>;

    /// Create a resource
    async fn create(&self, spec: &CreateSpec) -> Result<Resource>;

    /// Delete a resource
    async fn delete(&self, spec: &DeleteSpec) -> Result<()>;

    /// Every resource of this kind that carries this tool's naming prefix
    async fn list(&self) -> Result<Vec<Resource>>;
}

/// Managed and inline policy sub-calls on an identity role
#[async_trait]
pub trait RolePolicies: Send + Sync {
    /// ARNs of managed policies attached to the role
    async fn list_attached_policies(&self, role_name: &str) -> Result<Vec<String>>;

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    /// Names of inline policies embedded in the role
    async fn list_inline_policies(&self, role_name: &str) -> Result<Vec<String>>;

    async fn delete_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<()>;
}

/// Run `fut`, failing with [`CloudError::Timeout`] once `after` has elapsed
pub async fn bounded<T, F>(operation: impl Into<String>, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            let operation = operation.into();
            tracing::warn!(operation = %operation, after = ?after, "provider call timed out");
            Err(CloudError::Timeout { operation, after })
        }
    }
}

/// One adapter per resource kind plus the role policy sub-calls
///
/// Every call made through the registry is bounded by the configured call
/// timeout.
#[derive(Clone)]
pub struct Adapters {
    adapters: HashMap<ResourceKind, Arc<dyn ResourceAdapter>>,
    role_policies: Arc<dyn RolePolicies>,
    call_timeout: Duration,
}

impl Adapters {
    pub fn new(role_policies: Arc<dyn RolePolicies>) -> Self {
        Self {
            adapters: HashMap::new(),
            role_policies,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Register an adapter, replacing any previous one for the same kind
    pub fn with_adapter(mut self, adapter: Arc<dyn ResourceAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn supports(&self, kind: ResourceKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Registered kinds in cleanup order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|k| k.cleanup_priority());
        kinds
    }

    fn adapter(&self, kind: ResourceKind) -> Result<&Arc<dyn ResourceAdapter>> {
        self.adapters
            .get(&kind)
            .ok_or_else(|| CloudError::Fatal(format!("no adapter registered for {}", kind)))
    }

    pub async fn describe(&self, kind: ResourceKind, name: &str) -> Result<Resource> {
        let adapter = self.adapter(kind)?;
        bounded(
            format!("describe {} {}", kind, name),
            self.call_timeout,
            adapter.describe(name),
        )
        .await
    }

    pub async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let kind = spec.kind();
        let adapter = self.adapter(kind)?;
        tracing::debug!(kind = %kind, name = %spec.name(), "creating resource");
        bounded(
            format!("create {} {}", kind, spec.name()),
            self.call_timeout,
            adapter.create(spec),
        )
        .await
    }

    pub async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let kind = spec.kind();
        let adapter = self.adapter(kind)?;
        bounded(
            format!("delete {}", kind),
            self.call_timeout,
            adapter.delete(spec),
        )
        .await
    }

    pub async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>> {
        let adapter = self.adapter(kind)?;
        bounded(format!("list {}", kind), self.call_timeout, adapter.list()).await
    }

    pub async fn list_attached_policies(&self, role_name: &str) -> Result<Vec<String>> {
        bounded(
            format!("list attached policies of {}", role_name),
            self.call_timeout,
            self.role_policies.list_attached_policies(role_name),
        )
        .await
    }

    pub async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        bounded(
            format!("attach {} to {}", policy_arn, role_name),
            self.call_timeout,
            self.role_policies.attach_policy(role_name, policy_arn),
        )
        .await
    }

    pub async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        bounded(
            format!("detach {} from {}", policy_arn, role_name),
            self.call_timeout,
            self.role_policies.detach_policy(role_name, policy_arn),
        )
        .await
    }

    pub async fn list_inline_policies(&self, role_name: &str) -> Result<Vec<String>> {
        bounded(
            format!("list inline policies of {}", role_name),
            self.call_timeout,
            self.role_policies.list_inline_policies(role_name),
        )
        .await
    }

    pub async fn delete_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<()> {
        bounded(
            format!("delete inline policy {} of {}", policy_name, role_name),
            self.call_timeout,
            self.role_policies.delete_inline_policy(role_name, policy_name),
        )
        .await
    }
}

impl std::fmt::Debug for Adapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapters")
            .field("kinds", &self.kinds())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
