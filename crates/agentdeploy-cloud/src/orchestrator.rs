//! Multi-stage deployment pipeline
//!
//! ```text
//! Init -> OAuthReady -> IdentityReady -> RuntimeConfigured -> Launched
//!    \________\______________\________________\_______-> Failed(stage)
//! ```
//!
//! Stages run strictly in order. Cancellation is honoured at every stage
//! boundary. Nothing is rolled back on failure: resource names are
//! deterministic, so a re-run picks up whatever already exists.

use crate::cleanup::{CleanupExecutor, CleanupReport};
use crate::discovery::{DiscoveryWarning, ResourceDiscovery};
use crate::endpoint::{agent_id_of, invocation_url};
use crate::error::{CloudError, ErrorKind, Result};
use crate::identity::{IdentityPoolRecord, IdentityProvider, OAuthProviderRecord, OAuthSetup};
use crate::metadata::DeploymentMetadata;
use crate::naming::DeploymentName;
use crate::provider::{Adapters, bounded};
use crate::resolver::{
    Conflict, ConflictAction, ConflictDecision, ConflictResolver, PolicyMode, Resolution,
    UserChoice,
};
use crate::resource::{ATTR_REPOSITORY_URI, CreateSpec, JwtAuthorizer, Resource, ResourceKind};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause before re-resolving after a late naming conflict, so a regenerated
/// name carries a different timestamp
pub const CONFLICT_RETRY_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_TRUST_PRINCIPAL: &str = "bedrock-agentcore.amazonaws.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    OAuth,
    Identity,
    RuntimeConfig,
    Launch,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::OAuth => write!(f, "OAuth provider setup"),
            Stage::Identity => write!(f, "identity pool setup"),
            Stage::RuntimeConfig => write!(f, "runtime configuration"),
            Stage::Launch => write!(f, "launch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Init,
    OAuthReady,
    IdentityReady,
    RuntimeConfigured,
    Launched,
    Failed(Stage),
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentState::Init => write!(f, "init"),
            DeploymentState::OAuthReady => write!(f, "oauth-ready"),
            DeploymentState::IdentityReady => write!(f, "identity-ready"),
            DeploymentState::RuntimeConfigured => write!(f, "runtime-configured"),
            DeploymentState::Launched => write!(f, "launched"),
            DeploymentState::Failed(stage) => write!(f, "failed ({})", stage),
        }
    }
}

/// Supplies the human's answer when Standard mode finds existing resources
#[async_trait]
pub trait ConflictPrompt: Send + Sync {
    async fn choose(&self, conflict: &Conflict) -> Result<UserChoice>;
}

/// What the runtime configuration stage provisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    pub image_tag: String,
    pub provision_log_group: bool,
    pub provision_function: bool,
    pub trust_principal: String,
    pub managed_policy_arns: Vec<String>,
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self {
            image_tag: "latest".to_string(),
            provision_log_group: true,
            provision_function: false,
            trust_principal: DEFAULT_TRUST_PRINCIPAL.to_string(),
            managed_policy_arns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub name: DeploymentName,
    pub mode: PolicyMode,
    pub layout: RuntimeLayout,
    pub oauth: OAuthSetup,
    /// Pool from an earlier run; its token is refreshed instead of creating a pool
    pub cached_identity: Option<IdentityPoolRecord>,
}

impl DeploymentRequest {
    pub fn new(name: DeploymentName, mode: PolicyMode) -> Self {
        Self {
            name,
            mode,
            layout: RuntimeLayout::default(),
            oauth: OAuthSetup::default(),
            cached_identity: None,
        }
    }

    pub fn with_layout(mut self, layout: RuntimeLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_oauth(mut self, oauth: OAuthSetup) -> Self {
        self.oauth = oauth;
        self
    }

    pub fn with_cached_identity(mut self, identity: Option<IdentityPoolRecord>) -> Self {
        self.cached_identity = identity;
        self
    }
}

/// Resources the runtime configuration stage ensured
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeResources {
    pub role: Resource,
    pub registry: Resource,
    pub log_group: Option<Resource>,
    pub function: Option<Resource>,
    pub image_uri: String,
}

impl RuntimeResources {
    pub fn all(&self) -> Vec<&Resource> {
        let mut all = vec![&self.role, &self.registry];
        all.extend(self.log_group.iter());
        all.extend(self.function.iter());
        all
    }
}

#[derive(Debug, Clone)]
struct RuntimeSetup {
    decision: ConflictDecision,
    resources: RuntimeResources,
    cleanup: Option<CleanupReport>,
    warnings: Vec<DiscoveryWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    pub requested_name: DeploymentName,
    pub deployment_name: DeploymentName,
    pub decision: ConflictDecision,
    pub history: Vec<DeploymentState>,
    pub agent: Resource,
    pub runtime: RuntimeResources,
    pub oauth: OAuthProviderRecord,
    pub identity: IdentityPoolRecord,
    pub cleanup: Option<CleanupReport>,
    pub warnings: Vec<DiscoveryWarning>,
    pub conflict_retried: bool,
}

impl DeploymentOutcome {
    pub fn renamed(&self) -> bool {
        self.requested_name != self.deployment_name
    }

    pub fn agent_id(&self) -> &str {
        agent_id_of(&self.agent)
    }

    pub fn endpoint(&self, region: &str) -> String {
        invocation_url(self.agent_id(), region)
    }

    /// Connection facts to persist after a successful run
    pub fn metadata(&self, region: &str) -> DeploymentMetadata {
        DeploymentMetadata {
            agent_endpoint: Some(self.endpoint(region)),
            agent_id: Some(self.agent_id().to_string()),
            agent_name: Some(self.requested_name.to_string()),
            aws_region: Some(region.to_string()),
            cognito_client_id: Some(self.identity.client_id.clone()),
            cognito_pool_id: Some(self.identity.pool_id.clone()),
            cognito_discovery_url: Some(self.identity.discovery_url.clone()),
            deployed_agent_name: Some(self.deployment_name.to_string()),
        }
    }
}

/// Terminal failure: which stage, which deployment, what went wrong
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for deployment '{deployment}': {error}")]
pub struct DeploymentFailure {
    pub stage: Stage,
    pub deployment: DeploymentName,
    #[source]
    pub error: CloudError,
    pub history: Vec<DeploymentState>,
}

impl DeploymentFailure {
    pub fn is_cancelled(&self) -> bool {
        self.error.kind() == ErrorKind::Cancelled
    }

    /// Next action to suggest
    pub fn suggestion(&self) -> Option<String> {
        match (self.stage, self.error.kind()) {
            (Stage::OAuth, ErrorKind::Validation) => {
                Some("Export the OAuth client credentials and rerun the deployment.".to_string())
            }
            (_, ErrorKind::NamingConflict) => Some(format!(
                "Try `agentdeploy deploy --agent-name {} --auto-update`, \
                 `--force-recreate`, a different --agent-name, \
                 or `agentdeploy cleanup --agent-name {} --execute`.",
                self.deployment, self.deployment
            )),
            _ => self.error.suggestion().map(str::to_string),
        }
    }
}

/// Per-run transition log
struct Progress {
    deployment: DeploymentName,
    history: Vec<DeploymentState>,
}

impl Progress {
    fn new(deployment: DeploymentName) -> Self {
        Self {
            deployment,
            history: vec![DeploymentState::Init],
        }
    }

    fn advance(&mut self, state: DeploymentState) {
        tracing::info!(deployment = %self.deployment, state = %state, "stage complete");
        self.history.push(state);
    }

    fn fail(&mut self, stage: Stage, error: CloudError) -> DeploymentFailure {
        tracing::error!(deployment = %self.deployment, stage = %stage, error = %error, "deployment failed");
        self.history.push(DeploymentState::Failed(stage));
        DeploymentFailure {
            stage,
            deployment: self.deployment.clone(),
            error,
            history: self.history.clone(),
        }
    }
}

pub struct DeploymentOrchestrator {
    adapters: Arc<Adapters>,
    identity: Arc<dyn IdentityProvider>,
    prompt: Option<Arc<dyn ConflictPrompt>>,
    resolver: ConflictResolver,
    cancel: CancellationToken,
    conflict_retry_delay: Duration,
}

impl DeploymentOrchestrator {
    pub fn new(adapters: Arc<Adapters>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            adapters,
            identity,
            prompt: None,
            resolver: ConflictResolver::new(),
            cancel: CancellationToken::new(),
            conflict_retry_delay: CONFLICT_RETRY_DELAY,
        }
    }

    /// Without a prompt, Standard-mode conflicts fail the run
    pub fn with_prompt(mut self, prompt: Arc<dyn ConflictPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_conflict_retry_delay(mut self, delay: Duration) -> Self {
        self.conflict_retry_delay = delay;
        self
    }

    pub async fn run(
        &self,
        request: &DeploymentRequest,
    ) -> std::result::Result<DeploymentOutcome, DeploymentFailure> {
        let mut progress = Progress::new(request.name.clone());
        tracing::info!(deployment = %request.name, mode = %request.mode, "starting deployment");

        self.checkpoint(Stage::OAuth)
            .map_err(|e| progress.fail(Stage::OAuth, e))?;
        let oauth = self
            .ensure_oauth(&request.oauth)
            .await
            .map_err(|e| progress.fail(Stage::OAuth, e))?;
        progress.advance(DeploymentState::OAuthReady);

        self.checkpoint(Stage::Identity)
            .map_err(|e| progress.fail(Stage::Identity, e))?;
        let identity = self
            .ensure_identity(request)
            .await
            .map_err(|e| progress.fail(Stage::Identity, e))?;
        progress.advance(DeploymentState::IdentityReady);

        self.checkpoint(Stage::RuntimeConfig)
            .map_err(|e| progress.fail(Stage::RuntimeConfig, e))?;
        let mut setup = self
            .configure_runtime(&request.name, request)
            .await
            .map_err(|e| progress.fail(Stage::RuntimeConfig, e))?;
        progress.deployment = setup.decision.resulting_name.clone();
        progress.advance(DeploymentState::RuntimeConfigured);

        let mut conflict_retried = false;
        let agent = loop {
            self.checkpoint(Stage::Launch)
                .map_err(|e| progress.fail(Stage::Launch, e))?;
            match self.launch(&setup, &identity).await {
                Ok(agent) => break agent,
                Err(e) if e.is_naming_conflict() && !conflict_retried => {
                    conflict_retried = true;
                    tracing::warn!(
                        deployment = %setup.decision.resulting_name,
                        error = %e,
                        "naming conflict at launch; resolving again"
                    );
                    self.pause(self.conflict_retry_delay)
                        .await
                        .map_err(|e| progress.fail(Stage::Launch, e))?;

                    let current = setup.decision.resulting_name.clone();
                    let retry = self
                        .configure_runtime(&current, request)
                        .await
                        .map_err(|e| progress.fail(Stage::RuntimeConfig, e))?;
                    setup = merge_setup(setup, retry);
                    progress.deployment = setup.decision.resulting_name.clone();
                    progress.advance(DeploymentState::RuntimeConfigured);
                }
                Err(e) => return Err(progress.fail(Stage::Launch, e)),
            }
        };
        progress.advance(DeploymentState::Launched);

        Ok(DeploymentOutcome {
            requested_name: request.name.clone(),
            deployment_name: setup.decision.resulting_name.clone(),
            decision: setup.decision,
            history: progress.history,
            agent,
            runtime: setup.resources,
            oauth,
            identity,
            cleanup: setup.cleanup,
            warnings: setup.warnings,
            conflict_retried,
        })
    }

    fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled(format!("cancelled before {}", stage)));
        }
        Ok(())
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(CloudError::Cancelled("cancelled while waiting to retry".to_string()))
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn ensure_oauth(&self, setup: &OAuthSetup) -> Result<OAuthProviderRecord> {
        let kind = ResourceKind::OAuthProvider;
        match self.adapters.describe(kind, &setup.provider_name).await {
            Ok(existing) => {
                tracing::info!(provider = %setup.provider_name, "reusing shared OAuth provider");
                return Ok(OAuthProviderRecord::from_resource(
                    &existing,
                    setup.credentials.as_ref(),
                ));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let Some(credentials) = &setup.credentials else {
            return Err(CloudError::Validation(setup.missing_credentials_hint()));
        };
        let spec = CreateSpec::OAuthProvider {
            name: setup.provider_name.clone(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
        };

        // Another run may have created the singleton since our describe
        let provider = match self
            .adapters
            .create(&spec)
            .await
            .map_err(CloudError::into_already_exists)
        {
            Ok(created) => created,
            Err(e) if e.is_already_exists() => {
                tracing::info!(provider = %setup.provider_name, "OAuth provider created concurrently");
                self.adapters.describe(kind, &setup.provider_name).await?
            }
            Err(e) => return Err(e),
        };
        Ok(OAuthProviderRecord::from_resource(&provider, Some(credentials)))
    }

    async fn ensure_identity(&self, request: &DeploymentRequest) -> Result<IdentityPoolRecord> {
        let after = self.adapters.call_timeout();
        if let Some(cached) = &request.cached_identity {
            match bounded(
                "reauthenticate identity pool client",
                after,
                self.identity.reauthenticate(&cached.client_id),
            )
            .await
            {
                Ok(bearer_token) => {
                    tracing::info!(pool = %cached.pool_id, "reusing cached identity pool");
                    return Ok(IdentityPoolRecord {
                        bearer_token,
                        ..cached.clone()
                    });
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(pool = %cached.pool_id, "cached identity pool is gone; creating a new one");
                }
                Err(e) => return Err(e),
            }
        }

        bounded(
            "create identity pool",
            after,
            self.identity.create_identity_pool(&request.name),
        )
        .await
    }

    async fn configure_runtime(
        &self,
        requested: &DeploymentName,
        request: &DeploymentRequest,
    ) -> Result<RuntimeSetup> {
        let discovery = ResourceDiscovery::new(&self.adapters)
            .discover(requested)
            .await;

        let decision = match self
            .resolver
            .resolve(&discovery.resources, request.mode, requested)
        {
            Resolution::Decided(decision) => decision,
            Resolution::NeedsChoice(conflict) => {
                let Some(prompt) = &self.prompt else {
                    let kinds: Vec<_> = conflict.existing.iter().map(|r| r.kind.as_str()).collect();
                    return Err(CloudError::NamingConflict(format!(
                        "'{}' already has {} ({}) and no one is available to choose what to do",
                        requested,
                        conflict.existing.len(),
                        kinds.join(", ")
                    )));
                };
                let choice = prompt.choose(&conflict).await?;
                self.resolver.decide(&conflict, choice)?
            }
        };
        tracing::info!(
            action = %decision.action,
            resulting_name = %decision.resulting_name,
            "conflict resolution"
        );

        let cleanup = if decision.action == ConflictAction::DeleteAndRecreate {
            let executor = CleanupExecutor::new(&self.adapters);
            let report = executor
                .execute(&executor.plan(discovery.resources.clone()), false)
                .await;
            if !report.is_success() {
                tracing::warn!(
                    failed = report.failed.len(),
                    "cleanup of the previous deployment was incomplete; continuing"
                );
            }
            Some(report)
        } else {
            None
        };

        self.checkpoint(Stage::RuntimeConfig)?;
        let resources = self
            .provision(&decision.resulting_name, &request.layout)
            .await?;

        Ok(RuntimeSetup {
            decision,
            resources,
            cleanup,
            warnings: discovery.warnings,
        })
    }

    /// Role, registry, log group, function: each described first and
    /// created only when absent
    async fn provision(
        &self,
        name: &DeploymentName,
        layout: &RuntimeLayout,
    ) -> Result<RuntimeResources> {
        let role = self
            .ensure(CreateSpec::IdentityRole {
                name: name.resource_name(ResourceKind::IdentityRole),
                trust_principal: layout.trust_principal.clone(),
                managed_policy_arns: layout.managed_policy_arns.clone(),
            })
            .await?;
        self.attach_missing_policies(&role, &layout.managed_policy_arns)
            .await?;

        let registry = self
            .ensure(CreateSpec::ContainerRegistry {
                name: name.resource_name(ResourceKind::ContainerRegistry),
            })
            .await?;

        let log_group = if layout.provision_log_group {
            Some(
                self.ensure(CreateSpec::LogGroup {
                    name: name.resource_name(ResourceKind::LogGroup),
                })
                .await?,
            )
        } else {
            None
        };

        let repository_uri = registry
            .attribute(ATTR_REPOSITORY_URI)
            .unwrap_or(&registry.identifier);
        let image_uri = format!("{}:{}", repository_uri, layout.image_tag);

        let function = if layout.provision_function {
            Some(
                self.ensure(CreateSpec::ComputeFunction {
                    name: name.resource_name(ResourceKind::ComputeFunction),
                    role_arn: role.identifier.clone(),
                    image_uri: image_uri.clone(),
                })
                .await?,
            )
        } else {
            None
        };

        Ok(RuntimeResources {
            role,
            registry,
            log_group,
            function,
            image_uri,
        })
    }

    async fn ensure(&self, spec: CreateSpec) -> Result<Resource> {
        let kind = spec.kind();
        let name = spec.name();
        match self.adapters.describe(kind, name).await {
            Ok(existing) => {
                tracing::debug!(kind = %kind, name = %name, "reusing existing resource");
                Ok(existing)
            }
            Err(e) if e.is_not_found() => match self.adapters.create(&spec).await {
                Ok(created) => {
                    tracing::info!(kind = %kind, name = %name, "created");
                    Ok(created)
                }
                Err(e) if e.is_already_exists() => self.adapters.describe(kind, name).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Attach managed policies a reused or partially created role lacks
    async fn attach_missing_policies(&self, role: &Resource, policy_arns: &[String]) -> Result<()> {
        if policy_arns.is_empty() {
            return Ok(());
        }
        let attached = self.adapters.list_attached_policies(&role.name).await?;
        for arn in policy_arns.iter().filter(|arn| !attached.contains(arn)) {
            tracing::info!(role = %role.name, policy_arn = %arn, "attaching missing managed policy");
            self.adapters.attach_policy(&role.name, arn).await?;
        }
        Ok(())
    }

    async fn launch(&self, setup: &RuntimeSetup, identity: &IdentityPoolRecord) -> Result<Resource> {
        let kind = ResourceKind::AgentRecord;
        let reuse = setup.decision.reuses_existing();
        let name = setup.decision.resulting_name.resource_name(kind);

        match self.adapters.describe(kind, &name).await {
            Ok(existing) if reuse => {
                tracing::info!(agent = %name, "reusing existing agent runtime");
                return Ok(existing);
            }
            Ok(_) => {
                return Err(CloudError::NamingConflict(format!(
                    "agent runtime '{}' already exists",
                    name
                )));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let spec = CreateSpec::AgentRecord {
            name: name.clone(),
            image_uri: setup.resources.image_uri.clone(),
            role_arn: setup.resources.role.identifier.clone(),
            authorizer: Some(JwtAuthorizer {
                discovery_url: identity.discovery_url.clone(),
                allowed_clients: vec![identity.client_id.clone()],
            }),
        };
        match self.adapters.create(&spec).await {
            Ok(agent) => {
                tracing::info!(agent = %name, id = %agent_id_of(&agent), "agent runtime launched");
                Ok(agent)
            }
            Err(e) if e.is_already_exists() && reuse => self.adapters.describe(kind, &name).await,
            Err(e) if e.is_already_exists() => Err(CloudError::NamingConflict(e.to_string())),
            Err(e) => Err(e),
        }
    }
}

/// Keep what the first attempt already did when resolution runs again
fn merge_setup(first: RuntimeSetup, retry: RuntimeSetup) -> RuntimeSetup {
    let mut warnings = first.warnings;
    warnings.extend(retry.warnings);
    RuntimeSetup {
        decision: retry.decision,
        resources: retry.resources,
        cleanup: retry.cleanup.or(first.cleanup),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OAuthCredentials;
    use crate::memory::{InMemoryCloud, InMemoryIdentity, Operation};
    use crate::resolver::FixedClock;
    use chrono::{Local, TimeZone};
    use std::sync::Mutex;

    fn name(s: &str) -> DeploymentName {
        DeploymentName::parse(s).unwrap()
    }

    fn oauth() -> OAuthSetup {
        OAuthSetup::default().with_credentials(OAuthCredentials::new("gh-id", "gh-secret"))
    }

    fn request(mode: PolicyMode) -> DeploymentRequest {
        DeploymentRequest::new(name("sbom_security_agent"), mode).with_oauth(oauth())
    }

    fn orchestrator(cloud: &InMemoryCloud, identity: &InMemoryIdentity) -> DeploymentOrchestrator {
        let now = Local.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        DeploymentOrchestrator::new(Arc::new(cloud.adapters()), Arc::new(identity.clone()))
            .with_resolver(ConflictResolver::with_clock(Arc::new(FixedClock(now))))
            .with_conflict_retry_delay(Duration::from_millis(1))
    }

    struct ScriptedPrompt {
        choice: UserChoice,
        asked: Mutex<usize>,
    }

    #[async_trait]
    impl ConflictPrompt for ScriptedPrompt {
        async fn choose(&self, _conflict: &Conflict) -> Result<UserChoice> {
            *self.asked.lock().unwrap() += 1;
            Ok(self.choice.clone())
        }
    }

    #[tokio::test]
    async fn test_fresh_account_reaches_launched() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        let outcome = orchestrator(&cloud, &identity)
            .run(&request(PolicyMode::Standard))
            .await
            .unwrap();

        assert_eq!(
            outcome.history,
            vec![
                DeploymentState::Init,
                DeploymentState::OAuthReady,
                DeploymentState::IdentityReady,
                DeploymentState::RuntimeConfigured,
                DeploymentState::Launched,
            ]
        );
        assert!(!outcome.renamed());
        assert!(cloud.contains(ResourceKind::OAuthProvider, "github-provider"));
        assert!(cloud.contains(ResourceKind::AgentRecord, "sbom_security_agent"));
        assert_eq!(identity.pools_created(), 1);
    }

    #[tokio::test]
    async fn test_second_run_reuses_shared_oauth_provider() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        let orch = orchestrator(&cloud, &identity);
        orch.run(&request(PolicyMode::Standard)).await.unwrap();

        let second = DeploymentRequest::new(name("other_agent"), PolicyMode::Standard);
        let outcome = orch.run(&second).await.unwrap();
        assert_eq!(outcome.oauth.provider_name, "github-provider");
        assert_eq!(cloud.count(ResourceKind::OAuthProvider, Operation::Create), 1);
    }

    #[tokio::test]
    async fn test_oauth_create_race_counts_as_success() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.fail_times(
            ResourceKind::OAuthProvider,
            Operation::Describe,
            ErrorKind::NotFound,
            1,
        );
        cloud.seed(Resource::new(
            ResourceKind::OAuthProvider,
            "github-provider",
            "arn:aws:oauth/github-provider",
        ));

        let outcome = orchestrator(&cloud, &identity)
            .run(&request(PolicyMode::Standard))
            .await
            .unwrap();
        assert_eq!(outcome.oauth.provider_arn, "arn:aws:oauth/github-provider");
    }

    #[tokio::test]
    async fn test_missing_oauth_credentials_fail_oauth_stage() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        let req = DeploymentRequest::new(name("sbom_security_agent"), PolicyMode::Standard);

        let failure = orchestrator(&cloud, &identity).run(&req).await.unwrap_err();
        assert_eq!(failure.stage, Stage::OAuth);
        assert_eq!(failure.history.last(), Some(&DeploymentState::Failed(Stage::OAuth)));
        assert!(failure.to_string().contains("GITHUB_CLIENT_ID"));
        assert!(failure.suggestion().is_some());
        assert_eq!(cloud.mutating_call_count(), 0);
    }

    #[tokio::test]
    async fn test_cached_identity_is_reauthenticated_not_recreated() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        let cached = identity.cached_record("existing-client");
        let req = request(PolicyMode::Standard).with_cached_identity(Some(cached));

        let outcome = orchestrator(&cloud, &identity).run(&req).await.unwrap();
        assert_eq!(identity.pools_created(), 0);
        assert_eq!(identity.reauthentications(), 1);
        assert_eq!(outcome.identity.client_id, "existing-client");
        assert!(!outcome.identity.bearer_token.is_empty());
    }

    #[tokio::test]
    async fn test_standard_conflict_without_prompt_fails_with_suggestion() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.seed_deployment(&name("sbom_security_agent"));

        let failure = orchestrator(&cloud, &identity)
            .run(&request(PolicyMode::Standard))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::RuntimeConfig);
        assert_eq!(failure.deployment, name("sbom_security_agent"));
        assert!(failure.suggestion().unwrap().contains("--force-recreate"));
    }

    #[tokio::test]
    async fn test_prompt_use_existing_reuses_everything() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.seed_deployment(&name("sbom_security_agent"));
        let prompt = Arc::new(ScriptedPrompt {
            choice: UserChoice::UseExisting,
            asked: Mutex::new(0),
        });

        let outcome = orchestrator(&cloud, &identity)
            .with_prompt(prompt.clone())
            .run(&request(PolicyMode::Standard))
            .await
            .unwrap();
        assert_eq!(*prompt.asked.lock().unwrap(), 1);
        assert!(!outcome.renamed());
        assert_eq!(cloud.count(ResourceKind::AgentRecord, Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_reused_role_gets_missing_managed_policies() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        let deployment = name("sbom_security_agent");
        cloud.seed_deployment(&deployment);
        let role_name = deployment.resource_name(ResourceKind::IdentityRole);
        let logs = "arn:aws:iam::aws:policy/CloudWatchLogsFullAccess".to_string();
        let agentcore = "arn:aws:iam::aws:policy/BedrockAgentCoreFullAccess".to_string();
        let layout = RuntimeLayout {
            managed_policy_arns: vec![logs.clone(), agentcore.clone()],
            ..Default::default()
        };
        let prompt = Arc::new(ScriptedPrompt {
            choice: UserChoice::UseExisting,
            asked: Mutex::new(0),
        });

        orchestrator(&cloud, &identity)
            .with_prompt(prompt)
            .run(&request(PolicyMode::Standard).with_layout(layout))
            .await
            .unwrap();
        let attached = cloud.attached_policies(&role_name);
        assert!(attached.contains(&logs));
        assert!(attached.contains(&agentcore));
        assert_eq!(cloud.count(ResourceKind::IdentityRole, Operation::AttachPolicy), 1);
    }

    #[tokio::test]
    async fn test_failed_policy_attach_fails_runtime_stage() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.seed_deployment(&name("sbom_security_agent"));
        cloud.fail_always(ResourceKind::IdentityRole, Operation::AttachPolicy, ErrorKind::Fatal);
        let layout = RuntimeLayout {
            managed_policy_arns: vec!["arn:aws:iam::aws:policy/BedrockAgentCoreFullAccess".into()],
            ..Default::default()
        };
        let prompt = Arc::new(ScriptedPrompt {
            choice: UserChoice::UseExisting,
            asked: Mutex::new(0),
        });

        let failure = orchestrator(&cloud, &identity)
            .with_prompt(prompt)
            .run(&request(PolicyMode::Standard).with_layout(layout))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::RuntimeConfig);
        assert_eq!(cloud.count(ResourceKind::AgentRecord, Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_prompt_abort_is_cancellation() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.seed_deployment(&name("sbom_security_agent"));
        let prompt = Arc::new(ScriptedPrompt {
            choice: UserChoice::Abort,
            asked: Mutex::new(0),
        });

        let failure = orchestrator(&cloud, &identity)
            .with_prompt(prompt)
            .run(&request(PolicyMode::Standard))
            .await
            .unwrap_err();
        assert!(failure.is_cancelled());
    }

    #[tokio::test]
    async fn test_late_conflict_retries_once_with_new_name() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.reserve_agent_name("sbom_security_agent");

        let outcome = orchestrator(&cloud, &identity)
            .run(&request(PolicyMode::AutoUpdate))
            .await
            .unwrap();
        assert!(outcome.conflict_retried);
        assert!(outcome.renamed());
        assert!(outcome.deployment_name.as_str().contains("_update_"));
        assert_eq!(
            outcome
                .history
                .iter()
                .filter(|s| **s == DeploymentState::RuntimeConfigured)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_late_conflict_is_bounded_to_one_retry() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.fail_always(
            ResourceKind::AgentRecord,
            Operation::Create,
            ErrorKind::NamingConflict,
        );

        let failure = orchestrator(&cloud, &identity)
            .run(&request(PolicyMode::AutoUpdate))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Launch);
        assert_eq!(cloud.count(ResourceKind::AgentRecord, Operation::Create), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_stage() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = orchestrator(&cloud, &identity)
            .with_cancellation(cancel)
            .run(&request(PolicyMode::Standard))
            .await
            .unwrap_err();
        assert!(failure.is_cancelled());
        assert_eq!(failure.stage, Stage::OAuth);
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_runtime_error_names_stage_and_deployment() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.fail_always(ResourceKind::IdentityRole, Operation::Create, ErrorKind::Fatal);

        let failure = orchestrator(&cloud, &identity)
            .run(&request(PolicyMode::Standard))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::RuntimeConfig);
        let rendered = failure.to_string();
        assert!(rendered.contains("runtime configuration"));
        assert!(rendered.contains("sbom_security_agent"));
    }

    #[tokio::test]
    async fn test_outcome_metadata_records_both_names() {
        let cloud = InMemoryCloud::new();
        let identity = InMemoryIdentity::new();
        cloud.seed_deployment(&name("sbom_security_agent"));

        let outcome = orchestrator(&cloud, &identity)
            .run(&request(PolicyMode::AutoUpdate))
            .await
            .unwrap();
        let meta = outcome.metadata("us-east-1");
        assert_eq!(meta.agent_name.as_deref(), Some("sbom_security_agent"));
        assert_eq!(
            meta.deployed_agent_name.as_deref(),
            Some(outcome.deployment_name.as_str())
        );
        assert!(meta.agent_endpoint.unwrap().ends_with("/invocations"));
    }
}
