//! OAuth provider and identity pool records plus the identity collaborator

use crate::error::Result;
use crate::naming::{DeploymentName, OAUTH_PROVIDER_NAME};
use crate::resource::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CLIENT_ID_VAR: &str = "GITHUB_CLIENT_ID";
pub const DEFAULT_CLIENT_SECRET_VAR: &str = "GITHUB_CLIENT_SECRET";

/// Attribute key under which adapters report the provider's client id
pub const ATTR_CLIENT_ID: &str = "client_id";

/// Client credentials for the shared OAuth provider
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read both values from the environment; `None` unless both are non-empty
    pub fn from_env(client_id_var: &str, client_secret_var: &str) -> Option<Self> {
        let client_id = std::env::var(client_id_var).ok().filter(|v| !v.is_empty())?;
        let client_secret = std::env::var(client_secret_var)
            .ok()
            .filter(|v| !v.is_empty())?;
        Some(Self::new(client_id, client_secret))
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// How the OAuth stage obtains credentials when the provider is absent
#[derive(Debug, Clone)]
pub struct OAuthSetup {
    pub provider_name: String,
    pub credentials: Option<OAuthCredentials>,
    pub client_id_var: String,
    pub client_secret_var: String,
}

impl OAuthSetup {
    pub fn from_env(client_id_var: impl Into<String>, client_secret_var: impl Into<String>) -> Self {
        let client_id_var = client_id_var.into();
        let client_secret_var = client_secret_var.into();
        Self {
            provider_name: OAUTH_PROVIDER_NAME.to_string(),
            credentials: OAuthCredentials::from_env(&client_id_var, &client_secret_var),
            client_id_var,
            client_secret_var,
        }
    }

    pub fn with_credentials(mut self, credentials: OAuthCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_provider_name(mut self, provider_name: impl Into<String>) -> Self {
        self.provider_name = provider_name.into();
        self
    }

    /// Message naming the variables to set
    pub fn missing_credentials_hint(&self) -> String {
        format!(
            "OAuth provider '{}' does not exist and no credentials were supplied; set {} and {}",
            self.provider_name, self.client_id_var, self.client_secret_var
        )
    }
}

impl Default for OAuthSetup {
    fn default() -> Self {
        Self {
            provider_name: OAUTH_PROVIDER_NAME.to_string(),
            credentials: None,
            client_id_var: DEFAULT_CLIENT_ID_VAR.to_string(),
            client_secret_var: DEFAULT_CLIENT_SECRET_VAR.to_string(),
        }
    }
}

/// The shared OAuth credential provider. One per account and region.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProviderRecord {
    pub provider_name: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub provider_arn: String,
}

impl OAuthProviderRecord {
    /// Build from a described provider, filling in whatever credentials are known
    pub fn from_resource(resource: &Resource, credentials: Option<&OAuthCredentials>) -> Self {
        let client_id = credentials
            .map(|c| c.client_id.clone())
            .or_else(|| resource.attribute(ATTR_CLIENT_ID).map(str::to_string))
            .unwrap_or_default();
        Self {
            provider_name: resource.name.clone(),
            client_id,
            client_secret: credentials
                .map(|c| c.client_secret.clone())
                .unwrap_or_default(),
            provider_arn: resource.identifier.clone(),
        }
    }
}

impl std::fmt::Debug for OAuthProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProviderRecord")
            .field("provider_name", &self.provider_name)
            .field("client_id", &self.client_id)
            .field("provider_arn", &self.provider_arn)
            .finish_non_exhaustive()
    }
}

/// Hosted user pool backing the runtime's JWT authorizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPoolRecord {
    pub pool_id: String,
    pub client_id: String,
    pub discovery_url: String,
    #[serde(skip_serializing)]
    pub bearer_token: String,
}

/// Identity collaborator: creates user pools and refreshes their tokens
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a pool, app client and service user for `deployment`
    async fn create_identity_pool(&self, deployment: &DeploymentName) -> Result<IdentityPoolRecord>;

    /// Fresh bearer token for an existing app client
    async fn reauthenticate(&self, client_id: &str) -> Result<String>;
}
