//! Invocation endpoint lookup and URL normalization

use crate::error::{CloudError, Result};
use crate::metadata::DeploymentMetadata;
use crate::naming::DeploymentName;
use crate::provider::Adapters;
use crate::resource::{ATTR_AGENT_ID, Resource, ResourceKind};
use serde::Serialize;
use url::Url;

pub const INVOCATION_PATH: &str = "invocations";
const DEFAULT_SCHEME: &str = "https://";

/// Canonical invocation URL for an agent runtime id
pub fn invocation_url(agent_id: &str, region: &str) -> String {
    format!(
        "https://{}.bedrock-agentcore.{}.amazonaws.com/{}",
        agent_id, region, INVOCATION_PATH
    )
}

/// Clean up a user-supplied endpoint
///
/// Adds `https://` when no scheme is given, rejects input without a host and
/// appends `/invocations` unless the path already ends with it. Idempotent.
pub fn normalize(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CloudError::Validation("endpoint URL is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, trimmed)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| CloudError::Validation(format!("invalid endpoint URL '{}': {}", raw, e)))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(CloudError::Validation(format!(
            "endpoint URL '{}' has no host",
            raw
        )));
    }

    let path = url.path().trim_end_matches('/');
    let suffix = format!("/{}", INVOCATION_PATH);
    if !path.ends_with(&suffix) {
        let path = format!("{}{}", path, suffix);
        url.set_path(&path);
    } else if url.path() != path {
        let path = path.to_string();
        url.set_path(&path);
    }

    Ok(url.to_string())
}

/// Provider-assigned runtime id of an agent record
pub fn agent_id_of(resource: &Resource) -> &str {
    resource.attribute(ATTR_AGENT_ID).unwrap_or_else(|| {
        resource
            .identifier
            .rsplit('/')
            .next()
            .unwrap_or(&resource.identifier)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointSource {
    Override,
    Metadata,
    Discovery,
}

impl std::fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointSource::Override => write!(f, "explicit URL"),
            EndpointSource::Metadata => write!(f, "saved metadata"),
            EndpointSource::Discovery => write!(f, "provider discovery"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    pub url: String,
    pub source: EndpointSource,
    pub agent_id: Option<String>,
    /// Deployment the endpoint belongs to, when known
    pub deployment: Option<String>,
}

/// Finds the invocation URL of a deployment
///
/// Sources are consulted in order: explicit override, persisted metadata,
/// provider discovery.
pub struct EndpointResolver<'a> {
    region: String,
    override_url: Option<String>,
    metadata: Option<DeploymentMetadata>,
    adapters: Option<&'a Adapters>,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            override_url: None,
            metadata: None,
            adapters: None,
        }
    }

    pub fn with_override(mut self, url: Option<String>) -> Self {
        self.override_url = url;
        self
    }

    pub fn with_metadata(mut self, metadata: DeploymentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_discovery(mut self, adapters: &'a Adapters) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub async fn resolve(&self, name: &DeploymentName) -> Result<ResolvedEndpoint> {
        if let Some(raw) = &self.override_url {
            return Ok(ResolvedEndpoint {
                url: normalize(raw)?,
                source: EndpointSource::Override,
                agent_id: None,
                deployment: None,
            });
        }

        if let Some(found) = self.from_metadata(name)? {
            return Ok(found);
        }

        if let Some(found) = self.from_discovery(name).await? {
            return Ok(found);
        }

        Err(CloudError::NotFound(format!(
            "no endpoint for agent '{}' in region {}",
            name, self.region
        )))
    }

    fn from_metadata(&self, name: &DeploymentName) -> Result<Option<ResolvedEndpoint>> {
        let Some(meta) = &self.metadata else {
            return Ok(None);
        };
        if !meta.describes(name.as_str()) {
            tracing::debug!(agent = %name, "saved metadata belongs to another agent");
            return Ok(None);
        }

        let deployment = meta
            .deployed_agent_name
            .clone()
            .or_else(|| meta.agent_name.clone());

        if let Some(endpoint) = &meta.agent_endpoint {
            return Ok(Some(ResolvedEndpoint {
                url: normalize(endpoint)?,
                source: EndpointSource::Metadata,
                agent_id: meta.agent_id.clone(),
                deployment,
            }));
        }

        if let Some(agent_id) = &meta.agent_id {
            let region = meta.aws_region.as_deref().unwrap_or(&self.region);
            return Ok(Some(ResolvedEndpoint {
                url: invocation_url(agent_id, region),
                source: EndpointSource::Metadata,
                agent_id: Some(agent_id.clone()),
                deployment,
            }));
        }

        Ok(None)
    }

    async fn from_discovery(&self, name: &DeploymentName) -> Result<Option<ResolvedEndpoint>> {
        let Some(adapters) = self.adapters else {
            return Ok(None);
        };

        let mut candidates = Vec::new();
        if let Some(deployed) = self
            .metadata
            .as_ref()
            .and_then(|m| m.deployed_name_for(name.as_str()))
            .and_then(|n| DeploymentName::parse(n).ok())
        {
            candidates.push(deployed);
        }
        candidates.push(name.clone());

        for candidate in candidates {
            match adapters
                .describe(
                    ResourceKind::AgentRecord,
                    &candidate.resource_name(ResourceKind::AgentRecord),
                )
                .await
            {
                Ok(agent) => {
                    let agent_id = agent_id_of(&agent).to_string();
                    return Ok(Some(ResolvedEndpoint {
                        url: invocation_url(&agent_id, &self.region),
                        source: EndpointSource::Discovery,
                        agent_id: Some(agent_id),
                        deployment: Some(candidate.to_string()),
                    }));
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        // Names generated by earlier renames of the requested agent
        let agents = match adapters.list(ResourceKind::AgentRecord).await {
            Ok(agents) => agents,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        let newest = agents
            .iter()
            .filter(|r| name.is_generated_from(&r.name))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(newest.map(|agent| {
            let agent_id = agent_id_of(agent).to_string();
            ResolvedEndpoint {
                url: invocation_url(&agent_id, &self.region),
                source: EndpointSource::Discovery,
                agent_id: Some(agent_id),
                deployment: Some(agent.name.clone()),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{InMemoryCloud, Operation};

    #[test]
    fn test_normalize_adds_scheme_and_suffix() {
        assert_eq!(
            normalize("abcd1234.svc.us-east-1.example.com").unwrap(),
            "https://abcd1234.svc.us-east-1.example.com/invocations"
        );
        assert_eq!(
            normalize("  https://host.example.com/base/ ").unwrap(),
            "https://host.example.com/base/invocations"
        );
        assert_eq!(
            normalize("http://localhost:8080/invocations").unwrap(),
            "http://localhost:8080/invocations"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "abcd1234.svc.us-east-1.example.com",
            "https://h.example.com/x/invocations/",
            "localhost:9000",
        ] {
            let once = normalize(raw).unwrap();
            assert_eq!(normalize(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_normalize_rejects_hostless_input() {
        assert!(matches!(normalize(""), Err(CloudError::Validation(_))));
        assert!(matches!(normalize("   "), Err(CloudError::Validation(_))));
        assert!(matches!(normalize("https://"), Err(CloudError::Validation(_))));
        assert!(matches!(
            normalize("file:///tmp/socket"),
            Err(CloudError::Validation(_))
        ));
    }

    #[test]
    fn test_invocation_url_template() {
        assert_eq!(
            invocation_url("abc123", "us-east-1"),
            "https://abc123.bedrock-agentcore.us-east-1.amazonaws.com/invocations"
        );
    }

    fn name(s: &str) -> DeploymentName {
        DeploymentName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_override_wins_over_metadata() {
        let meta = DeploymentMetadata {
            agent_id: Some("fromfile".to_string()),
            ..Default::default()
        };
        let found = EndpointResolver::new("us-east-1")
            .with_override(Some("override.example.com".to_string()))
            .with_metadata(meta)
            .resolve(&name("sbom"))
            .await
            .unwrap();
        assert_eq!(found.source, EndpointSource::Override);
        assert_eq!(found.url, "https://override.example.com/invocations");
    }

    #[tokio::test]
    async fn test_metadata_for_another_agent_is_ignored() {
        let cloud = InMemoryCloud::new();
        let agent = cloud.seed_deployment(&name("sbom"));
        let agent = agent
            .iter()
            .find(|r| r.kind == ResourceKind::AgentRecord)
            .unwrap();
        let adapters = cloud.adapters();

        let meta = DeploymentMetadata {
            agent_name: Some("weather".to_string()),
            agent_id: Some("wrong".to_string()),
            ..Default::default()
        };
        let found = EndpointResolver::new("us-west-2")
            .with_metadata(meta)
            .with_discovery(&adapters)
            .resolve(&name("sbom"))
            .await
            .unwrap();
        assert_eq!(found.source, EndpointSource::Discovery);
        assert_eq!(found.agent_id.as_deref(), Some(agent_id_of(agent)));
        assert!(found.url.contains(".us-west-2."));
    }

    #[tokio::test]
    async fn test_metadata_agent_id_uses_template() {
        let meta = DeploymentMetadata {
            agent_name: Some("sbom".to_string()),
            agent_id: Some("abc".to_string()),
            aws_region: Some("eu-west-1".to_string()),
            ..Default::default()
        };
        let found = EndpointResolver::new("us-east-1")
            .with_metadata(meta)
            .resolve(&name("sbom"))
            .await
            .unwrap();
        assert_eq!(found.source, EndpointSource::Metadata);
        assert_eq!(found.url, invocation_url("abc", "eu-west-1"));
    }

    #[tokio::test]
    async fn test_discovery_follows_renamed_deployment() {
        let cloud = InMemoryCloud::new();
        cloud.seed_deployment(&name("sbom_update_20261019_101010"));
        let adapters = cloud.adapters();

        let found = EndpointResolver::new("us-east-1")
            .with_discovery(&adapters)
            .resolve(&name("sbom"))
            .await
            .unwrap();
        assert_eq!(found.deployment.as_deref(), Some("sbom_update_20261019_101010"));
    }

    #[tokio::test]
    async fn test_similar_name_of_another_agent_is_not_matched() {
        let cloud = InMemoryCloud::new();
        cloud.seed_deployment(&name("weather_bot"));
        cloud.seed_deployment(&name("weather_bot_update_20261019_101010"));
        let adapters = cloud.adapters();

        let err = EndpointResolver::new("us-east-1")
            .with_discovery(&adapters)
            .resolve(&name("bot"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_listing_is_not_reported_as_absence() {
        let cloud = InMemoryCloud::new();
        cloud.seed_deployment(&name("sbom_update_20261019_101010"));
        cloud.fail_always(ResourceKind::AgentRecord, Operation::List, ErrorKind::Transient);
        let adapters = cloud.adapters();

        let err = EndpointResolver::new("us-east-1")
            .with_discovery(&adapters)
            .resolve(&name("sbom"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_nothing_found_is_not_found() {
        let cloud = InMemoryCloud::new();
        let adapters = cloud.adapters();
        let err = EndpointResolver::new("us-east-1")
            .with_discovery(&adapters)
            .resolve(&name("sbom"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
