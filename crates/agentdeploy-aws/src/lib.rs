//! AWS adapters for agentdeploy
//!
//! One [`ResourceAdapter`](agentdeploy_cloud::ResourceAdapter) per resource
//! kind, backed by the official SDK clients, plus the Cognito identity
//! collaborator. Every SDK failure is classified by service error code in
//! [`error`].

pub mod agentcore;
pub mod cognito;
pub mod context;
pub mod ecr;
pub mod error;
pub mod iam;
pub mod lambda;
pub mod logs;

pub use cognito::CognitoIdentity;
pub use context::AwsContext;

use agentdeploy_cloud::Adapters;
use std::sync::Arc;
use std::time::Duration;

/// Registry wired to every AWS adapter, each call bounded by `call_timeout`
pub fn adapters(ctx: &AwsContext, call_timeout: Duration) -> Adapters {
    let iam = Arc::new(iam::IamAdapter::from_context(ctx));
    Adapters::new(iam.clone())
        .with_adapter(iam)
        .with_adapter(Arc::new(ecr::EcrAdapter::from_context(ctx)))
        .with_adapter(Arc::new(logs::LogsAdapter::from_context(ctx)))
        .with_adapter(Arc::new(lambda::LambdaAdapter::from_context(ctx)))
        .with_adapter(Arc::new(agentcore::RuntimeAdapter::from_context(ctx)))
        .with_adapter(Arc::new(agentcore::OAuthProviderAdapter::from_context(ctx)))
        .with_call_timeout(call_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdeploy_cloud::ResourceKind;

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_every_kind_is_registered() {
        let ctx = AwsContext::new("us-east-1").await;
        let registry = adapters(&ctx, Duration::from_secs(5));
        for kind in ResourceKind::ALL {
            assert!(registry.supports(kind), "{kind} has no adapter");
        }
    }
}
