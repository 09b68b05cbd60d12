//! Bedrock AgentCore control plane: agent runtimes and the shared OAuth2
//! credential provider

use crate::context::AwsContext;
use crate::error::{build_error, from_sdk, text, timestamp};
use agentdeploy_cloud::identity::ATTR_CLIENT_ID;
use agentdeploy_cloud::naming::kind_prefix;
use agentdeploy_cloud::resource::ATTR_AGENT_ID;
use agentdeploy_cloud::{
    CloudError, CreateSpec, DeleteSpec, JwtAuthorizer, Resource, ResourceAdapter, ResourceKind,
    Result,
};
use async_trait::async_trait;
use aws_sdk_bedrockagentcorecontrol::Client;
use aws_sdk_bedrockagentcorecontrol::types::{
    AgentRuntime, AgentRuntimeArtifact, AuthorizerConfiguration, ContainerConfiguration,
    CredentialProviderVendorType, CustomJwtAuthorizerConfiguration,
    GithubOauth2ProviderConfigInput, NetworkConfiguration, NetworkMode,
    Oauth2CredentialProviderItem, Oauth2ProviderConfigInput,
};
use tracing::{debug, info};

/// Agent runtime adapter
pub struct RuntimeAdapter {
    client: Client,
}

impl RuntimeAdapter {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.agentcore_client(),
        }
    }

    async fn all(&self) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_agent_runtimes()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| from_sdk("bedrock-agentcore:ListAgentRuntimes", e))?;

            resources.extend(output.agent_runtimes().iter().map(runtime_resource));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(resources)
    }
}

fn runtime_resource(runtime: &AgentRuntime) -> Resource {
    Resource::new(
        ResourceKind::AgentRecord,
        text(runtime.agent_runtime_name()),
        text(runtime.agent_runtime_arn()),
    )
    .with_created_at(timestamp(runtime.last_updated_at()))
    .with_attribute(ATTR_AGENT_ID, text(runtime.agent_runtime_id()))
}

fn authorizer_configuration(authorizer: &JwtAuthorizer) -> Result<AuthorizerConfiguration> {
    let jwt = CustomJwtAuthorizerConfiguration::builder()
        .discovery_url(&authorizer.discovery_url)
        .set_allowed_clients(Some(authorizer.allowed_clients.clone()))
        .build()
        .map_err(|e| build_error("JWT authorizer", e))?;
    Ok(AuthorizerConfiguration::CustomJwtAuthorizer(jwt))
}

#[async_trait]
impl ResourceAdapter for RuntimeAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::AgentRecord
    }

    async fn describe(&self, name: &str) -> Result<Resource> {
        // Runtimes are addressed by id; look the name up in the listing
        self.all()
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| CloudError::NotFound(format!("agent runtime {}", name)))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let CreateSpec::AgentRecord {
            name,
            image_uri,
            role_arn,
            authorizer,
        } = spec
        else {
            return Err(CloudError::Validation(format!(
                "agent runtime adapter cannot create {}",
                spec.kind()
            )));
        };

        let container = ContainerConfiguration::builder()
            .container_uri(image_uri)
            .build()
            .map_err(|e| build_error("container configuration", e))?;
        let network = NetworkConfiguration::builder()
            .network_mode(NetworkMode::Public)
            .build()
            .map_err(|e| build_error("network configuration", e))?;

        let mut request = self
            .client
            .create_agent_runtime()
            .agent_runtime_name(name)
            .agent_runtime_artifact(AgentRuntimeArtifact::ContainerConfiguration(container))
            .role_arn(role_arn)
            .network_configuration(network);
        if let Some(authorizer) = authorizer {
            request = request.authorizer_configuration(authorizer_configuration(authorizer)?);
        }

        // A name collision stays a naming conflict: the orchestrator renames
        let output = request
            .send()
            .await
            .map_err(|e| from_sdk("bedrock-agentcore:CreateAgentRuntime", e))?;

        let agent_id = text(output.agent_runtime_id());
        info!(agent = %name, agent_id = %agent_id, "agent runtime created");
        Ok(Resource::new(
            ResourceKind::AgentRecord,
            name.clone(),
            text(output.agent_runtime_arn()),
        )
        .with_created_at(timestamp(output.created_at()))
        .with_attribute(ATTR_AGENT_ID, agent_id))
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let DeleteSpec::AgentRecord { agent_id } = spec else {
            return Err(CloudError::Validation(format!(
                "agent runtime adapter cannot delete {}",
                spec.kind()
            )));
        };

        self.client
            .delete_agent_runtime()
            .agent_runtime_id(agent_id)
            .send()
            .await
            .map_err(|e| from_sdk("bedrock-agentcore:DeleteAgentRuntime", e))?;

        debug!(agent_id = %agent_id, "agent runtime deleted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        let prefix = kind_prefix(ResourceKind::AgentRecord);
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.name.starts_with(prefix))
            .collect())
    }
}

/// OAuth2 credential provider adapter
pub struct OAuthProviderAdapter {
    client: Client,
}

impl OAuthProviderAdapter {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.agentcore_client(),
        }
    }
}

fn provider_resource(item: &Oauth2CredentialProviderItem) -> Resource {
    Resource::new(
        ResourceKind::OAuthProvider,
        text(item.name()),
        text(item.credential_provider_arn()),
    )
    .with_created_at(timestamp(item.created_time()))
}

#[async_trait]
impl ResourceAdapter for OAuthProviderAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::OAuthProvider
    }

    async fn describe(&self, name: &str) -> Result<Resource> {
        let output = self
            .client
            .get_oauth2_credential_provider()
            .name(name)
            .send()
            .await
            .map_err(|e| from_sdk("bedrock-agentcore:GetOauth2CredentialProvider", e))?;

        let mut resource = Resource::new(
            ResourceKind::OAuthProvider,
            text(output.name()),
            text(output.credential_provider_arn()),
        )
        .with_created_at(timestamp(output.created_time()));

        let client_id = output
            .oauth2_provider_config_output()
            .and_then(|config| config.as_github_oauth2_provider_config().ok())
            .map(|github| text(github.client_id()))
            .filter(|id| !id.is_empty());
        if let Some(client_id) = client_id {
            resource = resource.with_attribute(ATTR_CLIENT_ID, client_id);
        }
        Ok(resource)
    }

    async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let CreateSpec::OAuthProvider {
            name,
            client_id,
            client_secret,
        } = spec
        else {
            return Err(CloudError::Validation(format!(
                "OAuth provider adapter cannot create {}",
                spec.kind()
            )));
        };

        let github = GithubOauth2ProviderConfigInput::builder()
            .client_id(client_id)
            .client_secret(client_secret)
            .build()
            .map_err(|e| build_error("GitHub OAuth2 provider", e))?;

        let output = self
            .client
            .create_oauth2_credential_provider()
            .name(name)
            .credential_provider_vendor(CredentialProviderVendorType::GithubOauth2)
            .oauth2_provider_config_input(Oauth2ProviderConfigInput::GithubOauth2ProviderConfig(
                github,
            ))
            .send()
            .await
            // Another deployment created the shared provider first
            .map_err(|e| {
                from_sdk("bedrock-agentcore:CreateOauth2CredentialProvider", e)
                    .into_already_exists()
            })?;

        info!(provider = %name, "OAuth2 credential provider created");
        Ok(Resource::new(
            ResourceKind::OAuthProvider,
            name.clone(),
            text(output.credential_provider_arn()),
        )
        .with_attribute(ATTR_CLIENT_ID, client_id.clone()))
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let DeleteSpec::OAuthProvider { provider_name } = spec else {
            return Err(CloudError::Validation(format!(
                "OAuth provider adapter cannot delete {}",
                spec.kind()
            )));
        };

        self.client
            .delete_oauth2_credential_provider()
            .name(provider_name)
            .send()
            .await
            .map_err(|e| from_sdk("bedrock-agentcore:DeleteOauth2CredentialProvider", e))?;

        debug!(provider = %provider_name, "OAuth2 credential provider deleted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        let prefix = kind_prefix(ResourceKind::OAuthProvider);
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_oauth2_credential_providers()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| from_sdk("bedrock-agentcore:ListOauth2CredentialProviders", e))?;

            resources.extend(
                output
                    .credential_providers()
                    .iter()
                    .filter(|p| text(p.name()).starts_with(prefix))
                    .map(provider_resource),
            );

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorizer_configuration_carries_clients() {
        let config = authorizer_configuration(&JwtAuthorizer {
            discovery_url: "https://cognito-idp.us-east-1.amazonaws.com/pool/.well-known/openid-configuration".into(),
            allowed_clients: vec!["client-a".into()],
        })
        .unwrap();
        let jwt = config.as_custom_jwt_authorizer().unwrap();
        assert_eq!(jwt.allowed_clients(), ["client-a".to_string()]);
        assert!(text(jwt.discovery_url()).ends_with("openid-configuration"));
    }
}
