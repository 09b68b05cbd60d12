//! CloudWatch log group adapter

use crate::context::AwsContext;
use crate::error::{from_sdk, text};
use agentdeploy_cloud::naming::kind_prefix;
use agentdeploy_cloud::{CloudError, CreateSpec, DeleteSpec, Resource, ResourceAdapter, ResourceKind, Result};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client;
use aws_sdk_cloudwatchlogs::types::LogGroup;
use chrono::DateTime;
use tracing::{debug, info};

pub struct LogsAdapter {
    client: Client,
}

impl LogsAdapter {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.logs_client(),
        }
    }

    /// Every log group whose name starts with `prefix`
    async fn with_prefix(&self, prefix: &str) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_log_groups()
                .log_group_name_prefix(prefix)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| from_sdk("logs:DescribeLogGroups", e))?;

            resources.extend(output.log_groups().iter().map(to_resource));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(resources)
    }
}

fn to_resource(group: &LogGroup) -> Resource {
    // creation_time is epoch milliseconds
    let created_at = group
        .creation_time()
        .and_then(DateTime::from_timestamp_millis);
    Resource::new(
        ResourceKind::LogGroup,
        text(group.log_group_name()),
        text(group.arn()),
    )
    .with_created_at(created_at)
}

#[async_trait]
impl ResourceAdapter for LogsAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LogGroup
    }

    async fn describe(&self, name: &str) -> Result<Resource> {
        // Prefix search also returns longer names; only an exact match counts
        self.with_prefix(name)
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| CloudError::NotFound(format!("log group {}", name)))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let CreateSpec::LogGroup { name } = spec else {
            return Err(CloudError::Validation(format!(
                "log group adapter cannot create {}",
                spec.kind()
            )));
        };

        self.client
            .create_log_group()
            .log_group_name(name)
            .send()
            .await
            .map_err(|e| from_sdk("logs:CreateLogGroup", e))?;

        info!(log_group = %name, "log group created");
        self.describe(name).await
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let DeleteSpec::LogGroup { log_group_name } = spec else {
            return Err(CloudError::Validation(format!(
                "log group adapter cannot delete {}",
                spec.kind()
            )));
        };

        self.client
            .delete_log_group()
            .log_group_name(log_group_name)
            .send()
            .await
            .map_err(|e| from_sdk("logs:DeleteLogGroup", e))?;

        debug!(log_group = %log_group_name, "log group deleted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        self.with_prefix(kind_prefix(ResourceKind::LogGroup)).await
    }
}
