//! Deployment names and the per-kind naming rules derived from them

use crate::error::{CloudError, Result};
use crate::resource::ResourceKind;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Longest deployment name accepted
///
/// Bounded by the tightest prefixed limit: `AgentCoreRuntimeRole-` plus the
/// name must fit IAM's 64-character role name.
pub const MAX_DEPLOYMENT_NAME_LEN: usize = 43;

/// Labels generated names carry, one per policy mode
const GENERATED_LABELS: [&str; 3] = ["auto", "update", "recreate"];

/// Fixed name of the shared OAuth credential provider
pub const OAUTH_PROVIDER_NAME: &str = "github-provider";

const REGISTRY_PREFIX: &str = "agentcore-runtime-";
const FUNCTION_PREFIX: &str = "agentcore-runtime-";
const ROLE_PREFIX: &str = "AgentCoreRuntimeRole-";
const LOG_GROUP_PREFIX: &str = "/aws/bedrock-agentcore/runtimes/";

/// `YYYYMMDD_HHMMSS`
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// Logical identity of a deployment
///
/// Restricted to the intersection of every dependent provider's naming
/// rules: ASCII letters, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeploymentName(String);

impl DeploymentName {
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CloudError::Validation(
                "deployment name must not be empty".to_string(),
            ));
        }
        if name.len() > MAX_DEPLOYMENT_NAME_LEN {
            return Err(CloudError::Validation(format!(
                "deployment name '{}' is longer than {} characters",
                name, MAX_DEPLOYMENT_NAME_LEN
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(CloudError::Validation(format!(
                "deployment name '{}' contains '{}'; only letters, digits, '_' and '-' are allowed",
                name, bad
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased, `_` replaced by `-`
    pub fn normalized(&self) -> String {
        normalize(&self.0)
    }

    /// Name of the resource of `kind` that belongs to this deployment
    pub fn resource_name(&self, kind: ResourceKind) -> String {
        match kind {
            ResourceKind::ContainerRegistry => format!("{}{}", REGISTRY_PREFIX, self.normalized()),
            ResourceKind::ComputeFunction => format!("{}{}", FUNCTION_PREFIX, self.normalized()),
            ResourceKind::IdentityRole => format!("{}{}", ROLE_PREFIX, self.0),
            ResourceKind::LogGroup => format!("{}{}", LOG_GROUP_PREFIX, self.0),
            ResourceKind::AgentRecord => self.0.clone(),
            ResourceKind::OAuthProvider => OAUTH_PROVIDER_NAME.to_string(),
        }
    }

    /// `base_mode_YYYYMMDD_HHMMSS`
    ///
    /// The base is shortened when the result would exceed
    /// [`MAX_DEPLOYMENT_NAME_LEN`].
    pub fn generate<Tz: TimeZone>(&self, mode_label: &str, now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self(format!(
            "{}{}",
            self.generated_prefix(mode_label),
            now.format(TIMESTAMP_FORMAT)
        ))
    }

    /// Whether `candidate` is a name [`generate`](Self::generate) could have
    /// produced from this one
    pub fn is_generated_from(&self, candidate: &str) -> bool {
        GENERATED_LABELS.iter().any(|label| {
            candidate
                .strip_prefix(&self.generated_prefix(label))
                .is_some_and(is_timestamp)
        })
    }

    /// `base_mode_`, with the base shortened so a timestamp still fits
    fn generated_prefix(&self, mode_label: &str) -> String {
        let suffix_len = 1 + mode_label.len() + 1 + TIMESTAMP_LEN;
        let room = MAX_DEPLOYMENT_NAME_LEN.saturating_sub(suffix_len).max(1);
        let base: String = self.0.chars().take(room).collect();
        format!("{}_{}_", base, mode_label)
    }
}

impl std::fmt::Display for DeploymentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeploymentName {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeploymentName {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<DeploymentName> for String {
    fn from(name: DeploymentName) -> Self {
        name.0
    }
}

/// Naming normalization for kinds that require lower-case, hyphenated names.
/// Idempotent.
pub fn normalize(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// `YYYYMMDD_HHMMSS`
fn is_timestamp(s: &str) -> bool {
    s.len() == TIMESTAMP_LEN
        && s.char_indices().all(|(i, c)| {
            if i == 8 {
                c == '_'
            } else {
                c.is_ascii_digit()
            }
        })
}

/// Longest name the provider accepts for a resource of `kind`
pub fn max_resource_name_len(kind: ResourceKind) -> usize {
    match kind {
        ResourceKind::ContainerRegistry => 256,
        ResourceKind::ComputeFunction => 64,
        ResourceKind::IdentityRole => 64,
        ResourceKind::LogGroup => 512,
        ResourceKind::AgentRecord => 48,
        ResourceKind::OAuthProvider => 128,
    }
}

/// Fixed prefix every resource of `kind` created by this tool carries
pub fn kind_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::ContainerRegistry => REGISTRY_PREFIX,
        ResourceKind::ComputeFunction => FUNCTION_PREFIX,
        ResourceKind::IdentityRole => ROLE_PREFIX,
        ResourceKind::LogGroup => LOG_GROUP_PREFIX,
        ResourceKind::AgentRecord => "",
        ResourceKind::OAuthProvider => OAUTH_PROVIDER_NAME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, Utc};

    fn name(s: &str) -> DeploymentName {
        DeploymentName::parse(s).unwrap()
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(DeploymentName::parse("").is_err());
        assert!(DeploymentName::parse("has space").is_err());
        assert!(DeploymentName::parse("dots.not.allowed").is_err());
        assert!(DeploymentName::parse("x".repeat(MAX_DEPLOYMENT_NAME_LEN + 1)).is_err());
        assert!(DeploymentName::parse("sbom_security-agent2").is_ok());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["sbom_security_agent", "SBOM-Security_Agent", "a_b-c", "plain"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_underscore_and_hyphen_spellings_share_normalized_names() {
        let a = name("sbom_security_agent");
        let b = name("sbom-security-agent");
        for kind in [ResourceKind::ContainerRegistry, ResourceKind::ComputeFunction] {
            assert_eq!(a.resource_name(kind), b.resource_name(kind));
        }
        assert_eq!(
            a.resource_name(ResourceKind::ContainerRegistry),
            "agentcore-runtime-sbom-security-agent"
        );
    }

    #[test]
    fn test_resource_names_are_deterministic() {
        let n = name("sbom_security_agent");
        for kind in ResourceKind::ALL {
            assert_eq!(n.resource_name(kind), n.resource_name(kind));
            assert!(n.resource_name(kind).starts_with(kind_prefix(kind)));
        }
        assert_eq!(
            n.resource_name(ResourceKind::IdentityRole),
            "AgentCoreRuntimeRole-sbom_security_agent"
        );
        assert_eq!(
            n.resource_name(ResourceKind::OAuthProvider),
            name("other").resource_name(ResourceKind::OAuthProvider)
        );
    }

    #[test]
    fn test_generate_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 5, 9).unwrap();
        let generated = name("sbom_agent").generate("recreate", &now);
        assert_eq!(generated.as_str(), "sbom_agent_recreate_20261019_080509");
        assert!(DeploymentName::parse(generated.as_str()).is_ok());
    }

    #[test]
    fn test_generate_truncates_long_base() {
        let long = name(&"a".repeat(MAX_DEPLOYMENT_NAME_LEN));
        let generated = long.generate("update", &Local::now());
        assert!(generated.as_str().len() <= MAX_DEPLOYMENT_NAME_LEN);
        assert!(DeploymentName::parse(generated.as_str()).is_ok());
    }

    #[test]
    fn test_generated_names_fit_every_provider_limit() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let bases = [
            "sbom_security_agent".to_string(),
            "x".repeat(MAX_DEPLOYMENT_NAME_LEN),
        ];
        for base in &bases {
            let base = name(base);
            for label in GENERATED_LABELS {
                let generated = base.generate(label, &now);
                for candidate in [&base, &generated] {
                    for kind in ResourceKind::ALL {
                        let derived = candidate.resource_name(kind);
                        assert!(
                            derived.len() <= max_resource_name_len(kind),
                            "{} is {} chars, limit {}",
                            derived,
                            derived.len(),
                            max_resource_name_len(kind)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_is_generated_from_matches_renames_only() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 10, 10, 10).unwrap();
        let sbom = name("sbom_security_agent");
        for label in GENERATED_LABELS {
            let generated = sbom.generate(label, &now);
            assert!(sbom.is_generated_from(generated.as_str()));
        }
        assert!(name("sbom").is_generated_from("sbom_update_20261019_101010"));
        assert!(!name("bot").is_generated_from("weather_bot"));
        assert!(!name("bot").is_generated_from("weather_bot_update_20261019_101010"));
        assert!(!name("sbom").is_generated_from("sbom"));
        assert!(!name("sbom").is_generated_from("sbom_update_2026"));
        assert!(!name("sbom").is_generated_from("sbom_copy_20261019_101010"));
    }

    #[test]
    fn test_serde_validates() {
        let parsed: DeploymentName = serde_json::from_str("\"ok_name\"").unwrap();
        assert_eq!(parsed.as_str(), "ok_name");
        assert!(serde_json::from_str::<DeploymentName>("\"bad name\"").is_err());
    }
}
