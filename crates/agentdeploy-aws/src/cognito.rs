//! Cognito user pool backing the runtime's JWT authorizer

use crate::context::AwsContext;
use crate::error::{build_error, from_sdk, text};
use agentdeploy_cloud::{
    CloudError, DeploymentName, IdentityPoolRecord, IdentityProvider, Result,
};
use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::Client;
use aws_sdk_cognitoidentityprovider::types::{
    AuthFlowType, ExplicitAuthFlowsType, MessageActionType,
};
use tracing::{debug, info};

pub const DEFAULT_USERNAME: &str = "agentdeploy-service";
pub const DEFAULT_PASSWORD_VAR: &str = "COGNITO_PASSWORD";

/// OpenID discovery document for a pool
pub fn discovery_url(region: &str, pool_id: &str) -> String {
    format!(
        "https://cognito-idp.{}.amazonaws.com/{}/.well-known/openid-configuration",
        region, pool_id
    )
}

pub struct CognitoIdentity {
    client: Client,
    region: String,
    username: String,
    password_var: String,
}

impl CognitoIdentity {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cognito_client(),
            region: ctx.region().to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password_var: DEFAULT_PASSWORD_VAR.to_string(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Environment variable holding the service user's password
    pub fn with_password_var(mut self, password_var: impl Into<String>) -> Self {
        self.password_var = password_var.into();
        self
    }

    fn password(&self) -> Result<String> {
        std::env::var(&self.password_var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CloudError::Validation(format!(
                    "{} is not set; export a password for the Cognito service user",
                    self.password_var
                ))
            })
    }

    async fn authenticate(&self, client_id: &str, password: &str) -> Result<String> {
        let output = self
            .client
            .initiate_auth()
            .client_id(client_id)
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .auth_parameters("USERNAME", &self.username)
            .auth_parameters("PASSWORD", password)
            .send()
            .await
            .map_err(|e| from_sdk("cognito-idp:InitiateAuth", e))?;

        output
            .authentication_result()
            .and_then(|r| r.access_token())
            .map(str::to_string)
            .ok_or_else(|| {
                CloudError::Fatal(format!(
                    "Cognito returned no access token for {}",
                    self.username
                ))
            })
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn create_identity_pool(&self, deployment: &DeploymentName) -> Result<IdentityPoolRecord> {
        // Fail before creating anything when the password is missing
        let password = self.password()?;
        let base = deployment.normalized();

        let pool = self
            .client
            .create_user_pool()
            .pool_name(format!("agentdeploy-{}-pool", base))
            .send()
            .await
            .map_err(|e| from_sdk("cognito-idp:CreateUserPool", e))?;
        let pool_id = pool
            .user_pool()
            .map(|p| text(p.id()))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CloudError::Fatal("Cognito returned no user pool id".into()))?;
        info!(pool_id = %pool_id, "user pool created");

        let app = self
            .client
            .create_user_pool_client()
            .user_pool_id(&pool_id)
            .client_name(format!("agentdeploy-{}-client", base))
            .generate_secret(false)
            .explicit_auth_flows(ExplicitAuthFlowsType::AllowUserPasswordAuth)
            .explicit_auth_flows(ExplicitAuthFlowsType::AllowRefreshTokenAuth)
            .send()
            .await
            .map_err(|e| from_sdk("cognito-idp:CreateUserPoolClient", e))?;
        let client_id = app
            .user_pool_client()
            .map(|c| text(c.client_id()))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CloudError::Fatal("Cognito returned no app client id".into()))?;
        debug!(pool_id = %pool_id, client_id = %client_id, "app client created");

        self.client
            .admin_create_user()
            .user_pool_id(&pool_id)
            .username(&self.username)
            .temporary_password(&password)
            .message_action(MessageActionType::Suppress)
            .send()
            .await
            .map_err(|e| from_sdk("cognito-idp:AdminCreateUser", e))?;

        self.client
            .admin_set_user_password()
            .user_pool_id(&pool_id)
            .username(&self.username)
            .password(&password)
            .permanent(true)
            .send()
            .await
            .map_err(|e| from_sdk("cognito-idp:AdminSetUserPassword", e))?;

        let bearer_token = self.authenticate(&client_id, &password).await?;

        Ok(IdentityPoolRecord {
            discovery_url: discovery_url(&self.region, &pool_id),
            pool_id,
            client_id,
            bearer_token,
        })
    }

    async fn reauthenticate(&self, client_id: &str) -> Result<String> {
        if client_id.is_empty() {
            return Err(build_error("InitiateAuth", "empty client id"));
        }
        let password = self.password()?;
        self.authenticate(client_id, &password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_url_format() {
        assert_eq!(
            discovery_url("us-west-2", "us-west-2_AbCd"),
            "https://cognito-idp.us-west-2.amazonaws.com/us-west-2_AbCd/.well-known/openid-configuration"
        );
    }
}
