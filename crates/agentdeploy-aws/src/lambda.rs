//! Lambda function adapter for container-image functions

use crate::context::AwsContext;
use crate::error::{from_sdk, text};
use agentdeploy_cloud::naming::kind_prefix;
use agentdeploy_cloud::{CloudError, CreateSpec, DeleteSpec, Resource, ResourceAdapter, ResourceKind, Result};
use async_trait::async_trait;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::types::{FunctionCode, FunctionConfiguration, PackageType};
use tracing::{debug, info};

pub struct LambdaAdapter {
    client: Client,
}

impl LambdaAdapter {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.lambda_client(),
        }
    }
}

fn to_resource(function: &FunctionConfiguration) -> Resource {
    Resource::new(
        ResourceKind::ComputeFunction,
        text(function.function_name()),
        text(function.function_arn()),
    )
}

#[async_trait]
impl ResourceAdapter for LambdaAdapter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ComputeFunction
    }

    async fn describe(&self, name: &str) -> Result<Resource> {
        let output = self
            .client
            .get_function()
            .function_name(name)
            .send()
            .await
            .map_err(|e| from_sdk("lambda:GetFunction", e))?;

        output
            .configuration()
            .map(to_resource)
            .ok_or_else(|| CloudError::NotFound(format!("Lambda function {}", name)))
    }

    async fn create(&self, spec: &CreateSpec) -> Result<Resource> {
        let CreateSpec::ComputeFunction {
            name,
            role_arn,
            image_uri,
        } = spec
        else {
            return Err(CloudError::Validation(format!(
                "Lambda adapter cannot create {}",
                spec.kind()
            )));
        };

        let output = self
            .client
            .create_function()
            .function_name(name)
            .role(role_arn)
            .package_type(PackageType::Image)
            .code(FunctionCode::builder().image_uri(image_uri).build())
            .send()
            .await
            // Lambda reports a duplicate function name as a conflict
            .map_err(|e| from_sdk("lambda:CreateFunction", e).into_already_exists())?;

        info!(function = %name, image_uri = %image_uri, "Lambda function created");
        Ok(Resource::new(
            ResourceKind::ComputeFunction,
            name.clone(),
            text(output.function_arn()),
        ))
    }

    async fn delete(&self, spec: &DeleteSpec) -> Result<()> {
        let DeleteSpec::ComputeFunction { function_name } = spec else {
            return Err(CloudError::Validation(format!(
                "Lambda adapter cannot delete {}",
                spec.kind()
            )));
        };

        self.client
            .delete_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| from_sdk("lambda:DeleteFunction", e))?;

        debug!(function = %function_name, "Lambda function deleted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Resource>> {
        let prefix = kind_prefix(ResourceKind::ComputeFunction);
        let mut resources = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_functions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| from_sdk("lambda:ListFunctions", e))?;

            resources.extend(
                output
                    .functions()
                    .iter()
                    .filter(|f| f.function_name().is_some_and(|n| n.starts_with(prefix)))
                    .map(to_resource),
            );

            match output.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        Ok(resources)
    }
}
