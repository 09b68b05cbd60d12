//! Resource model: kinds, discovered resources and per-kind create/delete specs

use crate::naming::DeploymentName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key for a container registry's push/pull URI
pub const ATTR_REPOSITORY_URI: &str = "repository_uri";
/// Attribute key for the provider-assigned agent runtime id
pub const ATTR_AGENT_ID: &str = "agent_id";

/// Kind of provisioned cloud object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ContainerRegistry,
    ComputeFunction,
    IdentityRole,
    LogGroup,
    OAuthProvider,
    AgentRecord,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::ContainerRegistry,
        ResourceKind::ComputeFunction,
        ResourceKind::IdentityRole,
        ResourceKind::LogGroup,
        ResourceKind::OAuthProvider,
        ResourceKind::AgentRecord,
    ];

    /// Kinds owned by a single deployment. The OAuth provider is shared by
    /// every deployment and never belongs to one.
    pub const DEPLOYMENT_SCOPED: [ResourceKind; 5] = [
        ResourceKind::ContainerRegistry,
        ResourceKind::ComputeFunction,
        ResourceKind::IdentityRole,
        ResourceKind::LogGroup,
        ResourceKind::AgentRecord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ContainerRegistry => "container-registry",
            ResourceKind::ComputeFunction => "compute-function",
            ResourceKind::IdentityRole => "identity-role",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::OAuthProvider => "oauth-provider",
            ResourceKind::AgentRecord => "agent-record",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::ContainerRegistry => "ECR repository",
            ResourceKind::ComputeFunction => "Lambda function",
            ResourceKind::IdentityRole => "IAM role",
            ResourceKind::LogGroup => "CloudWatch log group",
            ResourceKind::OAuthProvider => "OAuth2 credential provider",
            ResourceKind::AgentRecord => "AgentCore runtime",
        }
    }

    pub fn is_deployment_scoped(&self) -> bool {
        !matches!(self, ResourceKind::OAuthProvider)
    }

    /// Attached and inline policies must be removed before the role itself
    pub fn requires_pre_delete_cleanup(&self) -> bool {
        matches!(self, ResourceKind::IdentityRole)
    }

    /// Deletion order: dependents first, the execution role last
    pub fn cleanup_priority(&self) -> u8 {
        match self {
            ResourceKind::AgentRecord => 0,
            ResourceKind::ComputeFunction => 1,
            ResourceKind::LogGroup => 2,
            ResourceKind::ContainerRegistry => 3,
            ResourceKind::IdentityRole => 4,
            ResourceKind::OAuthProvider => 5,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = crate::error::CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| crate::error::CloudError::Validation(format!("unknown resource kind: {}", s)))
    }
}

/// One provisioned cloud object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,

    /// Derived from the deployment name; stable across recreations
    pub name: String,

    /// Provider-assigned ARN or id
    pub identifier: String,

    pub created_at: Option<DateTime<Utc>>,

    /// Provider facts later stages need (registry URI, agent id, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            identifier: identifier.into(),
            created_at: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn requires_pre_delete_cleanup(&self) -> bool {
        self.kind.requires_pre_delete_cleanup()
    }

    /// Stable `kind:name` key
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }

    /// Provider parameters for deleting this resource
    pub fn delete_spec(&self) -> DeleteSpec {
        match self.kind {
            ResourceKind::ContainerRegistry => DeleteSpec::ContainerRegistry {
                repository_name: self.name.clone(),
                force: true,
            },
            ResourceKind::ComputeFunction => DeleteSpec::ComputeFunction {
                function_name: self.name.clone(),
            },
            ResourceKind::IdentityRole => DeleteSpec::IdentityRole {
                role_name: self.name.clone(),
            },
            ResourceKind::LogGroup => DeleteSpec::LogGroup {
                log_group_name: self.name.clone(),
            },
            ResourceKind::OAuthProvider => DeleteSpec::OAuthProvider {
                provider_name: self.name.clone(),
            },
            ResourceKind::AgentRecord => DeleteSpec::AgentRecord {
                agent_id: self
                    .attribute(ATTR_AGENT_ID)
                    .unwrap_or(&self.identifier)
                    .to_string(),
            },
        }
    }
}

/// Per-kind deletion parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSpec {
    ContainerRegistry { repository_name: String, force: bool },
    ComputeFunction { function_name: String },
    IdentityRole { role_name: String },
    LogGroup { log_group_name: String },
    OAuthProvider { provider_name: String },
    AgentRecord { agent_id: String },
}

impl DeleteSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DeleteSpec::ContainerRegistry { .. } => ResourceKind::ContainerRegistry,
            DeleteSpec::ComputeFunction { .. } => ResourceKind::ComputeFunction,
            DeleteSpec::IdentityRole { .. } => ResourceKind::IdentityRole,
            DeleteSpec::LogGroup { .. } => ResourceKind::LogGroup,
            DeleteSpec::OAuthProvider { .. } => ResourceKind::OAuthProvider,
            DeleteSpec::AgentRecord { .. } => ResourceKind::AgentRecord,
        }
    }
}

/// JWT authorizer attached to the agent runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtAuthorizer {
    pub discovery_url: String,
    pub allowed_clients: Vec<String>,
}

/// Per-kind creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateSpec {
    ContainerRegistry {
        name: String,
    },
    IdentityRole {
        name: String,
        /// Service principal allowed to assume the role
        trust_principal: String,
        managed_policy_arns: Vec<String>,
    },
    LogGroup {
        name: String,
    },
    ComputeFunction {
        name: String,
        role_arn: String,
        image_uri: String,
    },
    OAuthProvider {
        name: String,
        client_id: String,
        client_secret: String,
    },
    AgentRecord {
        name: String,
        image_uri: String,
        role_arn: String,
        authorizer: Option<JwtAuthorizer>,
    },
}

impl CreateSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            CreateSpec::ContainerRegistry { .. } => ResourceKind::ContainerRegistry,
            CreateSpec::IdentityRole { .. } => ResourceKind::IdentityRole,
            CreateSpec::LogGroup { .. } => ResourceKind::LogGroup,
            CreateSpec::ComputeFunction { .. } => ResourceKind::ComputeFunction,
            CreateSpec::OAuthProvider { .. } => ResourceKind::OAuthProvider,
            CreateSpec::AgentRecord { .. } => ResourceKind::AgentRecord,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CreateSpec::ContainerRegistry { name }
            | CreateSpec::IdentityRole { name, .. }
            | CreateSpec::LogGroup { name }
            | CreateSpec::ComputeFunction { name, .. }
            | CreateSpec::OAuthProvider { name, .. }
            | CreateSpec::AgentRecord { name, .. } => name,
        }
    }
}

/// Expected `(kind, name)` pairs for one deployment
pub fn expected_resources(deployment: &DeploymentName) -> Vec<(ResourceKind, String)> {
    ResourceKind::DEPLOYMENT_SCOPED
        .into_iter()
        .map(|kind| (kind, deployment.resource_name(kind)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_roles_need_pre_delete_cleanup() {
        for kind in ResourceKind::ALL {
            assert_eq!(
                kind.requires_pre_delete_cleanup(),
                kind == ResourceKind::IdentityRole
            );
        }
    }

    #[test]
    fn test_delete_spec_matches_kind() {
        for kind in ResourceKind::ALL {
            let resource = Resource::new(kind, "name", "arn:aws:x");
            assert_eq!(resource.delete_spec().kind(), kind);
        }
    }

    #[test]
    fn test_agent_delete_spec_prefers_agent_id_attribute() {
        let resource = Resource::new(ResourceKind::AgentRecord, "agent", "arn:aws:agent/abc")
            .with_attribute(ATTR_AGENT_ID, "abc");
        assert_eq!(
            resource.delete_spec(),
            DeleteSpec::AgentRecord {
                agent_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("bucket".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_expected_resources_skip_shared_provider() {
        let name = DeploymentName::parse("sbom_security_agent").unwrap();
        let expected = expected_resources(&name);
        assert_eq!(expected.len(), 5);
        assert!(
            expected
                .iter()
                .all(|(kind, _)| *kind != ResourceKind::OAuthProvider)
        );
    }
}
