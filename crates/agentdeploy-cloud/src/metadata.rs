//! Deployment metadata persisted as a dotenv-style file
//!
//! Writers replace known keys in place and leave comments and unrelated keys
//! untouched. The previous file is kept as `<name>.backup`.

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_METADATA_FILE: &str = ".env";

pub const AGENT_ENDPOINT: &str = "AGENT_ENDPOINT";
pub const AGENT_ID: &str = "AGENT_ID";
pub const AGENT_NAME: &str = "AGENT_NAME";
pub const AWS_REGION: &str = "AWS_REGION";
pub const COGNITO_CLIENT_ID: &str = "COGNITO_CLIENT_ID";
pub const COGNITO_POOL_ID: &str = "COGNITO_POOL_ID";
pub const COGNITO_DISCOVERY_URL: &str = "COGNITO_DISCOVERY_URL";
pub const DEPLOYED_AGENT_NAME: &str = "DEPLOYED_AGENT_NAME";

/// Connection facts about the last deployment. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentMetadata {
    pub agent_endpoint: Option<String>,
    pub agent_id: Option<String>,
    /// Name the user asked for
    pub agent_name: Option<String>,
    pub aws_region: Option<String>,
    pub cognito_client_id: Option<String>,
    pub cognito_pool_id: Option<String>,
    pub cognito_discovery_url: Option<String>,
    /// Name actually deployed, which differs from `agent_name` after a rename
    pub deployed_agent_name: Option<String>,
}

impl DeploymentMetadata {
    fn from_map(mut map: BTreeMap<String, String>) -> Self {
        let mut take = |key: &str| map.remove(key).filter(|v| !v.is_empty());
        Self {
            agent_endpoint: take(AGENT_ENDPOINT),
            agent_id: take(AGENT_ID),
            agent_name: take(AGENT_NAME),
            aws_region: take(AWS_REGION),
            cognito_client_id: take(COGNITO_CLIENT_ID),
            cognito_pool_id: take(COGNITO_POOL_ID),
            cognito_discovery_url: take(COGNITO_DISCOVERY_URL),
            deployed_agent_name: take(DEPLOYED_AGENT_NAME),
        }
    }

    /// Set fields as `(key, value)` pairs, in a fixed order
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            (AGENT_ENDPOINT, &self.agent_endpoint),
            (AGENT_ID, &self.agent_id),
            (AGENT_NAME, &self.agent_name),
            (AWS_REGION, &self.aws_region),
            (COGNITO_CLIENT_ID, &self.cognito_client_id),
            (COGNITO_POOL_ID, &self.cognito_pool_id),
            (COGNITO_DISCOVERY_URL, &self.cognito_discovery_url),
            (DEPLOYED_AGENT_NAME, &self.deployed_agent_name),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }

    /// Whether this metadata describes `name`, either as requested or as deployed.
    /// Metadata that names no agent matches anything.
    pub fn describes(&self, name: &str) -> bool {
        match (&self.agent_name, &self.deployed_agent_name) {
            (None, None) => true,
            (requested, deployed) => {
                requested.as_deref() == Some(name) || deployed.as_deref() == Some(name)
            }
        }
    }

    /// Name to look up in the provider for `requested`
    pub fn deployed_name_for(&self, requested: &str) -> Option<&str> {
        if self.agent_name.as_deref() == Some(requested) {
            self.deployed_agent_name.as_deref()
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }
}

/// Parse `KEY=VALUE` lines, ignoring blanks, comments and `export ` prefixes
pub fn parse_env(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(parse_line)
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn parse_line(line: &str) -> Option<(&str, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some((key, value.to_string()))
}

/// Replace `updates` in `content` in place, appending keys not yet present
///
/// A key that appears on several lines keeps only its first line.
pub fn merge_env(content: &str, updates: &[(&str, &str)]) -> String {
    let mut written = vec![false; updates.len()];
    let mut lines: Vec<String> = content
        .lines()
        .filter_map(|line| {
            let Some((key, _)) = parse_line(line) else {
                return Some(line.to_string());
            };
            match updates.iter().position(|(k, _)| *k == key) {
                Some(i) if written[i] => None,
                Some(i) => {
                    written[i] = true;
                    Some(format!("{}={}", updates[i].0, updates[i].1))
                }
                None => Some(line.to_string()),
            }
        })
        .collect();

    for (i, (key, value)) in updates.iter().enumerate() {
        if !written[i] {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut merged = lines.join("\n");
    merged.push('\n');
    merged
}

/// Reads and writes the metadata file
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".backup");
        self.path.with_file_name(name)
    }

    /// Missing file yields empty metadata
    pub async fn load(&self) -> Result<DeploymentMetadata> {
        if !self.path.exists() {
            tracing::debug!("Metadata file not found: {}", self.path.display());
            return Ok(DeploymentMetadata::default());
        }
        let content = fs::read_to_string(&self.path).await?;
        Ok(DeploymentMetadata::from_map(parse_env(&content)))
    }

    /// Write the set fields of `metadata`, keeping everything else in the file
    pub async fn save(&self, metadata: &DeploymentMetadata) -> Result<()> {
        self.update(&metadata.pairs()).await
    }

    pub async fn update(&self, updates: &[(&str, &str)]) -> Result<()> {
        let existing = if self.path.exists() {
            let content = fs::read_to_string(&self.path).await?;
            fs::copy(&self.path, self.backup_path()).await?;
            tracing::debug!("Created metadata backup");
            content
        } else {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            String::new()
        };

        fs::write(&self.path, merge_env(&existing, updates)).await?;
        tracing::debug!(
            path = %self.path.display(),
            keys = updates.len(),
            "saved deployment metadata"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_env_tolerates_noise() {
        let map = parse_env(
            "# comment\n\nexport AGENT_ID=abc\nAWS_REGION = \"us-west-2\"\nnot a pair\nEMPTY=\n",
        );
        assert_eq!(map.get("AGENT_ID").map(String::as_str), Some("abc"));
        assert_eq!(map.get("AWS_REGION").map(String::as_str), Some("us-west-2"));
        assert_eq!(map.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_merge_replaces_in_place_and_keeps_comments() {
        let merged = merge_env(
            "# agent settings\nAGENT_ID=old\nOTHER=keep\n",
            &[(AGENT_ID, "new"), (AWS_REGION, "us-east-1")],
        );
        assert_eq!(
            merged,
            "# agent settings\nAGENT_ID=new\nOTHER=keep\nAWS_REGION=us-east-1\n"
        );
    }

    #[test]
    fn test_merge_collapses_duplicated_keys() {
        let merged = merge_env(
            "AGENT_NAME=old1\nOTHER=keep\nAGENT_NAME=old2\n",
            &[(AGENT_NAME, "new")],
        );
        assert_eq!(merged, "AGENT_NAME=new\nOTHER=keep\n");
        assert_eq!(
            parse_env(&merged).get(AGENT_NAME).map(String::as_str),
            Some("new")
        );
    }

    #[test]
    fn test_describes_matches_requested_or_deployed_name() {
        let meta = DeploymentMetadata {
            agent_name: Some("sbom".to_string()),
            deployed_agent_name: Some("sbom_update_20261019_101010".to_string()),
            ..Default::default()
        };
        assert!(meta.describes("sbom"));
        assert!(meta.describes("sbom_update_20261019_101010"));
        assert!(!meta.describes("other"));
        assert_eq!(
            meta.deployed_name_for("sbom"),
            Some("sbom_update_20261019_101010")
        );
        assert!(DeploymentMetadata::default().describes("anything"));
    }

    #[tokio::test]
    async fn test_save_load_and_backup() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(".env");
        std::fs::write(&path, "# keep me\nGITHUB_CLIENT_ID=x\n").unwrap();
        let store = MetadataStore::new(&path);

        let meta = DeploymentMetadata {
            agent_id: Some("abc123".to_string()),
            aws_region: Some("us-east-1".to_string()),
            ..Default::default()
        };
        store.save(&meta).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, meta);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# keep me\nGITHUB_CLIENT_ID=x\n"));
        let backup = std::fs::read_to_string(temp_dir.path().join(".env.backup")).unwrap();
        assert_eq!(backup, "# keep me\nGITHUB_CLIENT_ID=x\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path().join("nope.env"));
        assert!(store.load().await.unwrap().is_empty());
    }
}
