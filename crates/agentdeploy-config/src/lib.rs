//! agentdeploy configuration
//!
//! Settings come from an optional `agentdeploy.yaml`; every field has a
//! built-in default so a missing file or a partial file is fine. CLI flags are
//! applied on top by the binary.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file directly
pub const CONFIG_ENV_VAR: &str = "AGENTDEPLOY_CONFIG";
pub const CONFIG_FILE_NAME: &str = "agentdeploy.yaml";
pub const DEFAULT_AGENT_NAME: &str = "sbom_security_agent";

/// Region variables consulted after the flag and the config file
const REGION_ENV_VARS: [&str; 2] = ["AWS_REGION", "AWS_DEFAULT_REGION"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub agent_name: String,
    pub region: Option<String>,
    /// Dotenv-style file recording the deployed agent
    pub metadata_file: PathBuf,
    /// Bound for every single provider call
    pub call_timeout_secs: u64,
    pub oauth: OAuthConfig,
    pub cognito: CognitoConfig,
    pub runtime: RuntimeConfig,

    /// File these settings were read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            agent_name: DEFAULT_AGENT_NAME.to_string(),
            region: None,
            metadata_file: PathBuf::from(".env"),
            call_timeout_secs: 30,
            oauth: OAuthConfig::default(),
            cognito: CognitoConfig::default(),
            runtime: RuntimeConfig::default(),
            source: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub provider_name: String,
    pub client_id_var: String,
    pub client_secret_var: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            provider_name: "github-provider".to_string(),
            client_id_var: "GITHUB_CLIENT_ID".to_string(),
            client_secret_var: "GITHUB_CLIENT_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitoConfig {
    /// Service user created in every new pool
    pub username: String,
    pub password_var: String,
}

impl Default for CognitoConfig {
    fn default() -> Self {
        Self {
            username: "agentdeploy-service".to_string(),
            password_var: "COGNITO_PASSWORD".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub image_tag: String,
    pub log_group: bool,
    pub function: bool,
    pub trust_principal: String,
    pub managed_policy_arns: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image_tag: "latest".to_string(),
            log_group: true,
            function: false,
            trust_principal: "bedrock-agentcore.amazonaws.com".to_string(),
            managed_policy_arns: Vec::new(),
        }
    }
}

impl DeployConfig {
    /// Parse a YAML document; absent fields take their defaults
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty document is null, which does not deserialize into a struct
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load the discovered config file, or the defaults when there is none
    pub fn load() -> Result<Self> {
        match find_config_file()? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.agent_name.trim().is_empty() {
            return Err(ConfigError::Invalid("agent_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Region from the flag, then this file, then `AWS_REGION` and
    /// `AWS_DEFAULT_REGION`
    ///
    /// Blank values are skipped.
    pub fn resolve_region(&self, flag: Option<&str>) -> Result<String> {
        let from_env = || {
            REGION_ENV_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok().as_deref().and_then(non_blank))
        };
        flag.and_then(non_blank)
            .or_else(|| self.region.as_deref().and_then(non_blank))
            .or_else(from_env)
            .ok_or(ConfigError::RegionNotConfigured)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Locate the config file
///
/// Search order:
/// 1. `AGENTDEPLOY_CONFIG` (direct path)
/// 2. `./agentdeploy.yaml`
/// 3. `./.agentdeploy/agentdeploy.yaml`
/// 4. `~/.config/agentdeploy/agentdeploy.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = [
        current_dir.join(CONFIG_FILE_NAME),
        current_dir.join(".agentdeploy").join(CONFIG_FILE_NAME),
    ];
    if let Some(path) = candidates.into_iter().find(|p| p.is_file()) {
        return Ok(Some(path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("agentdeploy").join(CONFIG_FILE_NAME);
        if global_config.is_file() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    /// Run `f` inside `dir` with an empty global config dir
    fn in_dir_with<R>(dir: &Path, config_env: Option<&Path>, f: impl FnOnce() -> R) -> R {
        let xdg = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = temp_env::with_vars(
            [
                (CONFIG_ENV_VAR, config_env),
                ("XDG_CONFIG_HOME", Some(xdg.path())),
            ],
            f,
        );
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    fn in_dir<R>(dir: &Path, f: impl FnOnce() -> R) -> R {
        in_dir_with(dir, None, f)
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = DeployConfig::from_yaml(
            "agent_name: my_agent\nruntime:\n  function: true\n",
        )
        .unwrap();
        assert_eq!(config.agent_name, "my_agent");
        assert!(config.runtime.function);
        assert!(config.runtime.log_group);
        assert_eq!(config.oauth.client_id_var, "GITHUB_CLIENT_ID");
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(DeployConfig::from_yaml("  \n").unwrap(), DeployConfig::default());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "call_timeout_secs: 0\n").unwrap();

        let err = DeployConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "call_timeout_secs: [not, a, number]\n").unwrap();

        let err = DeployConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "region: eu-west-1\n").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap().unwrap();
        assert!(found.ends_with(CONFIG_FILE_NAME));

        let config = in_dir(temp_dir.path(), DeployConfig::load).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert!(config.source.is_some());
    }

    #[test]
    #[serial]
    fn test_current_dir_wins_over_dot_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dot_dir = temp_dir.path().join(".agentdeploy");
        fs::create_dir(&dot_dir).unwrap();
        fs::write(dot_dir.join(CONFIG_FILE_NAME), "agent_name: hidden\n").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap().unwrap();
        assert!(found.ends_with(".agentdeploy/agentdeploy.yaml"));

        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "agent_name: visible\n").unwrap();
        let config = in_dir(temp_dir.path(), DeployConfig::load).unwrap();
        assert_eq!(config.agent_name, "visible");
    }

    #[test]
    #[serial]
    fn test_env_var_path_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.yaml");
        fs::write(&custom, "agent_name: from_env\n").unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "agent_name: local\n").unwrap();

        let config = in_dir_with(temp_dir.path(), Some(&custom), DeployConfig::load).unwrap();
        assert_eq!(config.agent_name, "from_env");
    }

    #[test]
    #[serial]
    fn test_missing_file_gives_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();

        assert!(in_dir(temp_dir.path(), find_config_file).unwrap().is_none());
        let config = in_dir(temp_dir.path(), DeployConfig::load).unwrap();
        assert_eq!(config, DeployConfig::default());
    }

    #[test]
    #[serial]
    fn test_region_resolution_order() {
        let config = DeployConfig {
            region: Some("eu-central-1".into()),
            ..Default::default()
        };
        let unset = DeployConfig::default();

        temp_env::with_vars(
            [
                ("AWS_REGION", Some("us-west-2")),
                ("AWS_DEFAULT_REGION", Some("ap-northeast-1")),
            ],
            || {
                assert_eq!(config.resolve_region(Some("us-east-2")).unwrap(), "us-east-2");
                assert_eq!(config.resolve_region(None).unwrap(), "eu-central-1");
                assert_eq!(unset.resolve_region(None).unwrap(), "us-west-2");
            },
        );

        temp_env::with_vars(
            [
                ("AWS_REGION", None),
                ("AWS_DEFAULT_REGION", Some("ap-northeast-1")),
            ],
            || assert_eq!(unset.resolve_region(None).unwrap(), "ap-northeast-1"),
        );

        temp_env::with_vars(
            [
                ("AWS_REGION", Some("  ")),
                ("AWS_DEFAULT_REGION", Some("eu-west-3")),
            ],
            || {
                assert_eq!(unset.resolve_region(None).unwrap(), "eu-west-3");
                assert_eq!(unset.resolve_region(Some("")).unwrap(), "eu-west-3");
            },
        );

        temp_env::with_vars_unset(["AWS_REGION", "AWS_DEFAULT_REGION"], || {
            assert!(matches!(
                unset.resolve_region(None),
                Err(ConfigError::RegionNotConfigured)
            ));
        });
    }
}
