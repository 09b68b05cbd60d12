//! ECR repository adapter

use crate::context::AwsContext;
use crate::error::{from_sdk, text, timestamp};
use agentdeploy_cloud::naming::kind_prefix;
use agentdeploy_cloud::resource::ATTR_REPOSITORY_URI;
use agentdeploy_cloud::{CloudError, CreateSpec, DeleteSpec, Resource, ResourceAdapter, ResourceKind, Result};
use async_trait::async_trait;
use aws_sdk_ecr::Client;
use aws_sdk_ecr::types::Repository;
use tracing::{debug, info};

pub struct EcrAdapter {
    client: Client,
}

impl EcrAdapter {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ecr_client(),
        }
    }
}

fn to_resource(repo: &Repository) -> Resource {
    Resource::new(
        ResourceKind::ContainerRegistry,
        text(repo.repository_name()),
        text(repo.repository_arn()),
    )
    .with_created_at(timestamp(repo.created_at()))
    .with_attribute(ATTR_REPOSITORY_URI, text(repo.repository_uri()))
}

#[async_trait]
impl ResourceAdapter for EcrAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ContainerRegistry
    }

    async fn describe(&self, name: &str) -> Result<Resource> {
        let output = self
            .client
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
            .map_err(|e| from_sdk("ecr:DescribeRepositories", e))?;

        output
            .repositories()
            .iter()
            .find(|r| r.repository_name() == Some(name))
            .map(to_resource)
            .ok_or_else(|| CloudError::NotFound(format!("ECR repository {}", name)))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let CreateSpec::ContainerRegistry { name } = spec else {
            return Err(CloudError::Validation(format!(
                "ECR adapter cannot create {}",
                spec.kind()
            )));
        };

        let output = self
            .client
            .create_repository()
            .repository_name(name)
            .send()
            .await
            .map_err(|e| from_sdk("ecr:CreateRepository", e))?;

        info!(repository = %name, "ECR repository created");
        match output.repository() {
            Some(repo) => Ok(to_resource(repo)),
            None => self.describe(name).await,
        }
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let DeleteSpec::ContainerRegistry {
            repository_name,
            force,
        } = spec
        else {
            return Err(CloudError::Validation(format!(
                "ECR adapter cannot delete {}",
                spec.kind()
            )));
        };

        self.client
            .delete_repository()
            .repository_name(repository_name)
            .force(*force)
            .send()
            .await
            .map_err(|e| from_sdk("ecr:DeleteRepository", e))?;

        debug!(repository = %repository_name, force = force, "ECR repository deleted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        let prefix = kind_prefix(ResourceKind::ContainerRegistry);
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_repositories()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| from_sdk("ecr:DescribeRepositories", e))?;

            resources.extend(
                output
                    .repositories()
                    .iter()
                    .filter(|r| r.repository_name().is_some_and(|n| n.starts_with(prefix)))
                    .map(to_resource),
            );

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(resources)
    }
}
