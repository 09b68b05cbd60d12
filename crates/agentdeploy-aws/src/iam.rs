//! IAM execution role adapter and the policy sub-calls needed to delete a role

use crate::context::AwsContext;
use crate::error::{from_sdk, text, timestamp};
use agentdeploy_cloud::naming::kind_prefix;
use agentdeploy_cloud::{
    CloudError, CreateSpec, DeleteSpec, Resource, ResourceAdapter, ResourceKind, Result,
    RolePolicies,
};
use async_trait::async_trait;
use aws_sdk_iam::Client;
use aws_sdk_iam::types::Role;
use tracing::{debug, info};

pub struct IamAdapter {
    client: Client,
}

impl IamAdapter {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }
}

/// Trust policy letting `principal` assume the role
pub fn trust_policy(principal: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": principal },
                "Action": "sts:AssumeRole"
            }
        ]
    })
    .to_string()
}

fn to_resource(role: &Role) -> Resource {
    Resource::new(
        ResourceKind::IdentityRole,
        text(role.role_name()),
        text(role.arn()),
    )
    .with_created_at(timestamp(role.create_date()))
}

#[async_trait]
impl ResourceAdapter for IamAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::IdentityRole
    }

    async fn describe(&self, name: &str) -> Result<Resource> {
        let output = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .map_err(|e| from_sdk("iam:GetRole", e))?;

        output
            .role()
            .map(to_resource)
            .ok_or_else(|| CloudError::NotFound(format!("IAM role {}", name)))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let CreateSpec::IdentityRole {
            name,
            trust_principal,
            managed_policy_arns,
        } = spec
        else {
            return Err(CloudError::Validation(format!(
                "IAM adapter cannot create {}",
                spec.kind()
            )));
        };

        let output = self
            .client
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy(trust_principal))
            .description(format!("agentdeploy execution role for {}", name))
            .send()
            .await
            .map_err(|e| from_sdk("iam:CreateRole", e))?;

        info!(role_name = %name, "IAM role created");

        // A failed attach leaves the role in place; the next deployment
        // attaches whatever is still missing
        for policy_arn in managed_policy_arns {
            self.attach_policy(name, policy_arn).await?;
        }

        match output.role() {
            Some(role) => Ok(to_resource(role)),
            None => self.describe(name).await,
        }
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let DeleteSpec::IdentityRole { role_name } = spec else {
            return Err(CloudError::Validation(format!(
                "IAM adapter cannot delete {}",
                spec.kind()
            )));
        };

        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| from_sdk("iam:DeleteRole", e))?;

        debug!(role_name = %role_name, "IAM role deleted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        let prefix = kind_prefix(ResourceKind::IdentityRole);
        let mut resources = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_roles()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| from_sdk("iam:ListRoles", e))?;

            resources.extend(
                output
                    .roles()
                    .iter()
                    .filter(|r| text(r.role_name()).starts_with(prefix))
                    .map(to_resource),
            );

            match (output.is_truncated(), output.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(resources)
    }
}

#[async_trait]
impl RolePolicies for IamAdapter {
    async fn list_attached_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_attached_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| from_sdk("iam:ListAttachedRolePolicies", e))?;

            arns.extend(
                output
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(str::to_string)),
            );

            match (output.is_truncated(), output.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(arns)
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| from_sdk("iam:AttachRolePolicy", e))?;
        debug!(role_name = %role_name, policy_arn = %policy_arn, "managed policy attached");
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.client
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| from_sdk("iam:DetachRolePolicy", e))?;
        debug!(role_name = %role_name, policy_arn = %policy_arn, "managed policy detached");
        Ok(())
    }

    async fn list_inline_policies(&self, role_name: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| from_sdk("iam:ListRolePolicies", e))?;

            names.extend(output.policy_names().iter().cloned());

            match (output.is_truncated(), output.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn delete_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<()> {
        self.client
            .delete_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| from_sdk("iam:DeleteRolePolicy", e))?;
        debug!(role_name = %role_name, policy_name = %policy_name, "inline policy deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_policy_names_the_principal() {
        let doc: serde_json::Value =
            serde_json::from_str(&trust_policy("bedrock-agentcore.amazonaws.com")).unwrap();
        assert_eq!(
            doc["Statement"][0]["Principal"]["Service"],
            "bedrock-agentcore.amazonaws.com"
        );
        assert_eq!(doc["Statement"][0]["Action"], "sts:AssumeRole");
    }
}
