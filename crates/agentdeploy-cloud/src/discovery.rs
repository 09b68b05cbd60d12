//! Concurrent lookup of the resources that belong to a deployment

use crate::error::{CloudError, ErrorKind};
use crate::naming::DeploymentName;
use crate::provider::Adapters;
use crate::resource::{Resource, ResourceKind};
use futures_util::future::join_all;
use serde::Serialize;

/// A lookup that failed for a reason other than absence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryWarning {
    pub kind: ResourceKind,
    pub name: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl DiscoveryWarning {
    fn new(kind: ResourceKind, name: impl Into<String>, error: &CloudError) -> Self {
        Self {
            kind,
            name: name.into(),
            error_kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for DiscoveryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.kind.display_name(), self.name, self.message)
    }
}

/// Result of a discovery pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    pub resources: Vec<Resource>,
    pub warnings: Vec<DiscoveryWarning>,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Resource> {
        self.resources.iter().find(|r| r.kind == kind)
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

pub struct ResourceDiscovery<'a> {
    adapters: &'a Adapters,
}

impl<'a> ResourceDiscovery<'a> {
    pub fn new(adapters: &'a Adapters) -> Self {
        Self { adapters }
    }

    /// Describe every deployment-scoped kind for `deployment` concurrently
    ///
    /// Absent resources are skipped. Any other failure becomes a warning and
    /// never hides the results of the other lookups.
    pub async fn discover(&self, deployment: &DeploymentName) -> Discovery {
        let kinds: Vec<_> = ResourceKind::DEPLOYMENT_SCOPED
            .into_iter()
            .filter(|k| self.adapters.supports(*k))
            .collect();

        let lookups = kinds.iter().map(|&kind| {
            let name = deployment.resource_name(kind);
            async move {
                let result = self.adapters.describe(kind, &name).await;
                (kind, name, result)
            }
        });

        let mut discovery = Discovery::default();
        for (kind, name, result) in join_all(lookups).await {
            match result {
                Ok(resource) => {
                    tracing::debug!(kind = %kind, name = %name, "found existing resource");
                    discovery.resources.push(resource);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(kind = %kind, name = %name, error = %e, "discovery lookup failed");
                    discovery.warnings.push(DiscoveryWarning::new(kind, name, &e));
                }
            }
        }

        tracing::info!(
            deployment = %deployment,
            found = discovery.resources.len(),
            warnings = discovery.warnings.len(),
            "discovery finished"
        );
        discovery
    }

    /// List every tool-created resource whose name contains `pattern`
    pub async fn discover_matching(&self, pattern: &str) -> Discovery {
        let lookups = ResourceKind::DEPLOYMENT_SCOPED
            .into_iter()
            .filter(|k| self.adapters.supports(*k))
            .map(|kind| async move { (kind, self.adapters.list(kind).await) });

        let mut discovery = Discovery::default();
        for (kind, result) in join_all(lookups).await {
            match result {
                Ok(resources) => discovery
                    .resources
                    .extend(resources.into_iter().filter(|r| r.name.contains(pattern))),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(kind = %kind, pattern = %pattern, error = %e, "listing failed");
                    discovery.warnings.push(DiscoveryWarning::new(kind, pattern, &e));
                }
            }
        }
        discovery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCloud, Operation};

    fn name(s: &str) -> DeploymentName {
        DeploymentName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_discover_nothing_on_empty_account() {
        let cloud = InMemoryCloud::new();
        let adapters = cloud.adapters();
        let discovery = ResourceDiscovery::new(&adapters)
            .discover(&name("sbom_security_agent"))
            .await;
        assert!(discovery.is_empty());
        assert!(!discovery.has_warnings());
    }

    #[tokio::test]
    async fn test_one_failing_lookup_does_not_hide_the_others() {
        let cloud = InMemoryCloud::new();
        let deployment = name("sbom_security_agent");
        cloud.seed_deployment(&deployment);
        cloud.fail_always(ResourceKind::IdentityRole, Operation::Describe, ErrorKind::Transient);

        let adapters = cloud.adapters();
        let discovery = ResourceDiscovery::new(&adapters).discover(&deployment).await;

        assert!(discovery.contains(ResourceKind::ContainerRegistry));
        assert!(!discovery.contains(ResourceKind::IdentityRole));
        assert_eq!(discovery.warnings.len(), 1);
        assert_eq!(discovery.warnings[0].kind, ResourceKind::IdentityRole);
        assert_eq!(discovery.warnings[0].error_kind, ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_shared_oauth_provider_is_not_part_of_a_deployment() {
        let cloud = InMemoryCloud::new();
        cloud.seed(Resource::new(
            ResourceKind::OAuthProvider,
            crate::naming::OAUTH_PROVIDER_NAME,
            "arn:memory:oauth",
        ));
        let adapters = cloud.adapters();
        let discovery = ResourceDiscovery::new(&adapters)
            .discover(&name("sbom_security_agent"))
            .await;
        assert!(discovery.is_empty());
    }

    #[tokio::test]
    async fn test_discover_matching_filters_by_substring() {
        let cloud = InMemoryCloud::new();
        cloud.seed_deployment(&name("sbom_security_agent"));
        cloud.seed_deployment(&name("weather_bot"));

        let adapters = cloud.adapters();
        let discovery = ResourceDiscovery::new(&adapters)
            .discover_matching("weather")
            .await;
        assert!(!discovery.is_empty());
        assert!(discovery.resources.iter().all(|r| r.name.contains("weather")));
    }
}
