//! In-memory provider
//!
//! Backs the engine's tests and offline runs. Every call is recorded so tests
//! can assert on ordering and on the absence of mutating calls. Failures and
//! delays can be injected per `(kind, operation)`.

use crate::error::{CloudError, ErrorKind, Result};
use crate::identity::{ATTR_CLIENT_ID, IdentityPoolRecord, IdentityProvider};
use crate::naming::DeploymentName;
use crate::provider::{Adapters, ResourceAdapter, RolePolicies};
use crate::resource::{
    ATTR_AGENT_ID, ATTR_REPOSITORY_URI, CreateSpec, DeleteSpec, Resource, ResourceKind,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const ACCOUNT: &str = "000000000000";
const REGION: &str = "us-east-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Describe,
    Create,
    Delete,
    List,
    ListPolicies,
    AttachPolicy,
    DetachPolicy,
    DeleteInlinePolicy,
}

impl Operation {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::Delete
                | Operation::AttachPolicy
                | Operation::DetachPolicy
                | Operation::DeleteInlinePolicy
        )
    }
}

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: ResourceKind,
    pub operation: Operation,
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    kind: ErrorKind,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct CloudState {
    resources: BTreeMap<(ResourceKind, String), Resource>,
    attached: HashMap<String, Vec<String>>,
    inline: HashMap<String, Vec<String>>,
    reserved_agent_names: HashSet<String>,
    failures: HashMap<(ResourceKind, Operation), Failure>,
    delays: HashMap<(ResourceKind, Operation), Duration>,
    calls: Vec<Call>,
    next_id: u64,
}

impl CloudState {
    fn take_failure(&mut self, kind: ResourceKind, operation: Operation) -> Option<ErrorKind> {
        let key = (kind, operation);
        let failure = self.failures.get_mut(&key)?;
        let error_kind = failure.kind;
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.failures.remove(&key);
            }
        }
        Some(error_kind)
    }

    fn materialize(&mut self, kind: ResourceKind, name: &str) -> Resource {
        self.next_id += 1;
        let base = match kind {
            ResourceKind::ContainerRegistry => Resource::new(
                kind,
                name,
                format!("arn:aws:ecr:{}:{}:repository/{}", REGION, ACCOUNT, name),
            )
            .with_attribute(
                ATTR_REPOSITORY_URI,
                format!("{}.dkr.ecr.{}.amazonaws.com/{}", ACCOUNT, REGION, name),
            ),
            ResourceKind::IdentityRole => Resource::new(
                kind,
                name,
                format!("arn:aws:iam::{}:role/{}", ACCOUNT, name),
            ),
            ResourceKind::LogGroup => Resource::new(
                kind,
                name,
                format!("arn:aws:logs:{}:{}:log-group:{}", REGION, ACCOUNT, name),
            ),
            ResourceKind::ComputeFunction => Resource::new(
                kind,
                name,
                format!("arn:aws:lambda:{}:{}:function:{}", REGION, ACCOUNT, name),
            ),
            ResourceKind::OAuthProvider => Resource::new(
                kind,
                name,
                format!(
                    "arn:aws:bedrock-agentcore:{}:{}:token-vault/default/oauth2credentialprovider/{}",
                    REGION, ACCOUNT, name
                ),
            ),
            ResourceKind::AgentRecord => {
                let agent_id = format!("{}-{:010}", name, self.next_id);
                Resource::new(
                    kind,
                    name,
                    format!(
                        "arn:aws:bedrock-agentcore:{}:{}:runtime/{}",
                        REGION, ACCOUNT, agent_id
                    ),
                )
                .with_attribute(ATTR_AGENT_ID, agent_id)
            }
        };
        base.with_created_at(Some(Utc::now()))
    }
}

/// Shared in-memory account. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCloud {
    state: Arc<Mutex<CloudState>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registry with an adapter for every kind
    pub fn adapters(&self) -> Adapters {
        ResourceKind::ALL.into_iter().fold(
            Adapters::new(Arc::new(self.clone())),
            |adapters, kind| {
                adapters.with_adapter(Arc::new(MemoryAdapter {
                    kind,
                    cloud: self.clone(),
                }))
            },
        )
    }

    /// Record the call, then apply injected delay and failure
    async fn begin(&self, kind: ResourceKind, operation: Operation, name: &str) -> Result<()> {
        let (delay, failure) = {
            let mut state = self.state();
            state.calls.push(Call {
                kind,
                operation,
                name: name.to_string(),
            });
            let delay = state.delays.get(&(kind, operation)).copied();
            (delay, state.take_failure(kind, operation))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error_kind) => Err(CloudError::from_kind(
                error_kind,
                format!("injected {} on {:?} {} {}", error_kind, operation, kind, name),
            )),
            None => Ok(()),
        }
    }

    /// Insert a resource as if it had been created earlier
    pub fn seed(&self, resource: Resource) {
        self.state()
            .resources
            .insert((resource.kind, resource.name.clone()), resource);
    }

    /// Provision every deployment-scoped resource for `deployment`
    ///
    /// The role gets one managed and one inline policy.
    pub fn seed_deployment(&self, deployment: &DeploymentName) -> Vec<Resource> {
        let mut state = self.state();
        let mut seeded = Vec::new();
        for kind in ResourceKind::DEPLOYMENT_SCOPED {
            let name = deployment.resource_name(kind);
            let resource = state.materialize(kind, &name);
            if kind == ResourceKind::IdentityRole {
                state.attached.insert(
                    name.clone(),
                    vec!["arn:aws:iam::aws:policy/CloudWatchLogsFullAccess".to_string()],
                );
                state
                    .inline
                    .insert(name.clone(), vec!["AgentCoreRuntimeInline".to_string()]);
            }
            state.resources.insert((kind, name), resource.clone());
            seeded.push(resource);
        }
        seeded
    }

    pub fn attach_policy(&self, role_name: &str, policy_arn: &str) {
        self.state()
            .attached
            .entry(role_name.to_string())
            .or_default()
            .push(policy_arn.to_string());
    }

    pub fn put_inline_policy(&self, role_name: &str, policy_name: &str) {
        self.state()
            .inline
            .entry(role_name.to_string())
            .or_default()
            .push(policy_name.to_string());
    }

    /// Make agent creation under `name` fail with a naming conflict even
    /// though describe reports nothing
    pub fn reserve_agent_name(&self, name: impl Into<String>) {
        self.state().reserved_agent_names.insert(name.into());
    }

    pub fn fail_always(&self, kind: ResourceKind, operation: Operation, error: ErrorKind) {
        self.state().failures.insert(
            (kind, operation),
            Failure {
                kind: error,
                remaining: None,
            },
        );
    }

    pub fn fail_times(&self, kind: ResourceKind, operation: Operation, error: ErrorKind, times: usize) {
        if times == 0 {
            return;
        }
        self.state().failures.insert(
            (kind, operation),
            Failure {
                kind: error,
                remaining: Some(times),
            },
        );
    }

    pub fn delay(&self, kind: ResourceKind, operation: Operation, delay: Duration) {
        self.state().delays.insert((kind, operation), delay);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.delays.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, kind: ResourceKind, operation: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.kind == kind && c.operation == operation)
            .count()
    }

    pub fn mutating_call_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation.is_mutating())
            .count()
    }

    pub fn resource_count(&self) -> usize {
        self.state().resources.len()
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.state().resources.contains_key(&(kind, name.to_string()))
    }

    pub fn resources(&self, kind: ResourceKind) -> Vec<Resource> {
        self.state()
            .resources
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn attached_policies(&self, role_name: &str) -> Vec<String> {
        self.state()
            .attached
            .get(role_name)
            .cloned()
            .unwrap_or_default()
    }

    fn role_exists(&self, role_name: &str) -> Result<()> {
        if self.contains(ResourceKind::IdentityRole, role_name) {
            Ok(())
        } else {
            Err(CloudError::NotFound(format!("role {}", role_name)))
        }
    }
}

fn delete_target(spec: &DeleteSpec) -> &str {
    match spec {
        DeleteSpec::ContainerRegistry {
            repository_name, ..
        } => repository_name,
        DeleteSpec::ComputeFunction { function_name } => function_name,
        DeleteSpec::IdentityRole { role_name } => role_name,
        DeleteSpec::LogGroup { log_group_name } => log_group_name,
        DeleteSpec::OAuthProvider { provider_name } => provider_name,
        DeleteSpec::AgentRecord { agent_id } => agent_id,
    }
}

struct MemoryAdapter {
    kind: ResourceKind,
    cloud: InMemoryCloud,
}

#[async_trait]
impl ResourceAdapter for MemoryAdapter {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn describe(&self, name: &str) -> Result<Resource> {
        self.cloud.begin(self.kind, Operation::Describe, name).await?;
        self.cloud
            .state()
            .resources
            .get(&(self.kind, name.to_string()))
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("{} {}", self.kind, name)))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let name = spec.name();
        self.cloud.begin(self.kind, Operation::Create, name).await?;

        let mut state = self.cloud.state();
        let key = (self.kind, name.to_string());
        if state.resources.contains_key(&key) {
            return Err(match self.kind {
                ResourceKind::AgentRecord => {
                    CloudError::NamingConflict(format!("agent runtime {} already exists", name))
                }
                _ => CloudError::AlreadyExists(format!("{} {}", self.kind, name)),
            });
        }
        if self.kind == ResourceKind::AgentRecord && state.reserved_agent_names.contains(name) {
            return Err(CloudError::NamingConflict(format!(
                "agent runtime name {} is in use",
                name
            )));
        }

        let mut resource = state.materialize(self.kind, name);
        match spec {
            CreateSpec::IdentityRole {
                managed_policy_arns,
                ..
            } => {
                state
                    .attached
                    .insert(name.to_string(), managed_policy_arns.clone());
            }
            CreateSpec::OAuthProvider { client_id, .. } => {
                resource = resource.with_attribute(ATTR_CLIENT_ID, client_id.clone());
            }
            _ => {}
        }
        state.resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let target = delete_target(spec);
        self.cloud.begin(self.kind, Operation::Delete, target).await?;

        let mut state = self.cloud.state();
        let key = state
            .resources
            .iter()
            .find(|((kind, name), r)| {
                *kind == self.kind && (name == target || r.attribute(ATTR_AGENT_ID) == Some(target))
            })
            .map(|(key, _)| key.clone())
            .ok_or_else(|| CloudError::NotFound(format!("{} {}", self.kind, target)))?;

        if self.kind == ResourceKind::IdentityRole {
            let attached = state.attached.get(target).is_some_and(|p| !p.is_empty());
            let inline = state.inline.get(target).is_some_and(|p| !p.is_empty());
            if attached || inline {
                return Err(CloudError::Fatal(format!(
                    "DeleteConflict: role {} still has policies",
                    target
                )));
            }
        }

        state.resources.remove(&key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        self.cloud.begin(self.kind, Operation::List, "").await?;
        Ok(self.cloud.resources(self.kind))
    }
}

#[async_trait]
impl RolePolicies for InMemoryCloud {
    async fn list_attached_policies(&self, role_name: &str) -> Result<Vec<String>> {
        self.begin(ResourceKind::IdentityRole, Operation::ListPolicies, role_name)
            .await?;
        self.role_exists(role_name)?;
        Ok(self.attached_policies(role_name))
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.begin(ResourceKind::IdentityRole, Operation::AttachPolicy, role_name)
            .await?;
        self.role_exists(role_name)?;
        let mut state = self.state();
        let policies = state.attached.entry(role_name.to_string()).or_default();
        if !policies.iter().any(|p| p == policy_arn) {
            policies.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.begin(ResourceKind::IdentityRole, Operation::DetachPolicy, role_name)
            .await?;
        let mut state = self.state();
        let policies = state
            .attached
            .get_mut(role_name)
            .ok_or_else(|| CloudError::NotFound(format!("role {}", role_name)))?;
        policies.retain(|p| p != policy_arn);
        Ok(())
    }

    async fn list_inline_policies(&self, role_name: &str) -> Result<Vec<String>> {
        self.begin(ResourceKind::IdentityRole, Operation::ListPolicies, role_name)
            .await?;
        self.role_exists(role_name)?;
        Ok(self
            .state()
            .inline
            .get(role_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<()> {
        self.begin(
            ResourceKind::IdentityRole,
            Operation::DeleteInlinePolicy,
            role_name,
        )
        .await?;
        let mut state = self.state();
        let policies = state
            .inline
            .get_mut(role_name)
            .ok_or_else(|| CloudError::NotFound(format!("role {}", role_name)))?;
        policies.retain(|p| p != policy_name);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    pools_created: usize,
    reauthentications: usize,
    clients: HashSet<String>,
    fail_with: Option<ErrorKind>,
}

/// In-memory identity collaborator
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A record for a pool that already exists
    pub fn cached_record(&self, client_id: &str) -> IdentityPoolRecord {
        self.state().clients.insert(client_id.to_string());
        IdentityPoolRecord {
            pool_id: format!("{}_cached", REGION),
            client_id: client_id.to_string(),
            discovery_url: discovery_url(&format!("{}_cached", REGION)),
            bearer_token: String::new(),
        }
    }

    pub fn fail_with(&self, error: Option<ErrorKind>) {
        self.state().fail_with = error;
    }

    pub fn pools_created(&self) -> usize {
        self.state().pools_created
    }

    pub fn reauthentications(&self) -> usize {
        self.state().reauthentications
    }
}

fn discovery_url(pool_id: &str) -> String {
    format!(
        "https://cognito-idp.{}.amazonaws.com/{}/.well-known/openid-configuration",
        REGION, pool_id
    )
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    async fn create_identity_pool(&self, deployment: &DeploymentName) -> Result<IdentityPoolRecord> {
        let mut state = self.state();
        if let Some(kind) = state.fail_with {
            return Err(CloudError::from_kind(kind, "injected identity failure"));
        }
        state.pools_created += 1;
        let pool_id = format!("{}_{}{}", REGION, deployment.normalized(), state.pools_created);
        let client_id = format!("client{}", state.pools_created);
        state.clients.insert(client_id.clone());
        Ok(IdentityPoolRecord {
            discovery_url: discovery_url(&pool_id),
            pool_id,
            bearer_token: format!("token-{}", client_id),
            client_id,
        })
    }

    async fn reauthenticate(&self, client_id: &str) -> Result<String> {
        let mut state = self.state();
        if let Some(kind) = state.fail_with {
            return Err(CloudError::from_kind(kind, "injected identity failure"));
        }
        if !state.clients.contains(client_id) {
            return Err(CloudError::NotFound(format!("app client {}", client_id)));
        }
        state.reauthentications += 1;
        Ok(format!("token-{}-{}", client_id, state.reauthentications))
    }
}
