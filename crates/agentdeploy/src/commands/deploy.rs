use crate::prompt::StdinPrompt;
use crate::utils;
use agentdeploy_aws::CognitoIdentity;
use agentdeploy_cloud::{
    DeploymentMetadata, DeploymentName, DeploymentOrchestrator, DeploymentOutcome,
    DeploymentRequest, IdentityPoolRecord, OAuthSetup, PolicyMode, RuntimeLayout,
};
use agentdeploy_config::DeployConfig;
use colored::Colorize;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct DeployArgs {
    pub agent_name: Option<String>,
    pub auto_update: bool,
    pub force_recreate: bool,
    pub region: Option<String>,
    pub non_interactive: bool,
}

fn layout(config: &DeployConfig) -> RuntimeLayout {
    RuntimeLayout {
        image_tag: config.runtime.image_tag.clone(),
        provision_log_group: config.runtime.log_group,
        provision_function: config.runtime.function,
        trust_principal: config.runtime.trust_principal.clone(),
        managed_policy_arns: config.runtime.managed_policy_arns.clone(),
    }
}

/// Pool recorded by an earlier run of the same agent; only its token is refreshed
fn cached_identity(meta: &DeploymentMetadata, name: &DeploymentName) -> Option<IdentityPoolRecord> {
    if meta.agent_name.as_deref() != Some(name.as_str()) {
        return None;
    }
    Some(IdentityPoolRecord {
        pool_id: meta.cognito_pool_id.clone()?,
        client_id: meta.cognito_client_id.clone()?,
        discovery_url: meta.cognito_discovery_url.clone()?,
        bearer_token: String::new(),
    })
}

pub async fn handle(config: &DeployConfig, args: DeployArgs) -> anyhow::Result<()> {
    let name = utils::deployment_name(config, args.agent_name)?;
    let mode = PolicyMode::from_flags(args.auto_update, args.force_recreate)?;

    println!("{}", "Starting deployment...".blue().bold());
    println!("Agent: {}", name.as_str().cyan());
    println!("Mode:  {}", mode);

    let ctx = utils::aws_context(config, args.region.as_deref()).await?;
    let region = ctx.region().to_string();
    println!("Region: {}", region.cyan());

    let store = utils::metadata_store(config);
    let saved = store.load().await?;

    let identity = CognitoIdentity::from_context(&ctx)
        .with_username(&config.cognito.username)
        .with_password_var(&config.cognito.password_var);
    let oauth = OAuthSetup::from_env(&config.oauth.client_id_var, &config.oauth.client_secret_var)
        .with_provider_name(&config.oauth.provider_name);

    let request = DeploymentRequest::new(name.clone(), mode)
        .with_layout(layout(config))
        .with_oauth(oauth)
        .with_cached_identity(cached_identity(&saved, &name));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted; stopping after the current step...".yellow());
            on_signal.cancel();
        }
    });

    let mut orchestrator =
        DeploymentOrchestrator::new(Arc::new(utils::adapters(config, &ctx)), Arc::new(identity))
            .with_cancellation(cancel);
    if !args.non_interactive && std::io::stdin().is_terminal() {
        orchestrator = orchestrator.with_prompt(Arc::new(StdinPrompt));
    }

    match orchestrator.run(&request).await {
        Ok(outcome) => {
            print_outcome(&outcome, &region);
            store.save(&outcome.metadata(&region)).await?;
            println!(
                "Connection details saved to {}",
                store.path().display().to_string().cyan()
            );
            Ok(())
        }
        Err(failure) => {
            println!();
            println!("{}", "✗ Deployment failed".red().bold());
            println!("  Stage:      {}", failure.stage);
            println!("  Deployment: {}", failure.deployment.as_str().cyan());
            if let Some(suggestion) = failure.suggestion() {
                println!("  {}", suggestion.yellow());
            }
            Err(failure.into())
        }
    }
}

fn print_outcome(outcome: &DeploymentOutcome, region: &str) {
    println!();
    println!("{}", "✓ Deployment complete".green().bold());
    if outcome.renamed() {
        println!(
            "  Deployed as {} (requested {})",
            outcome.deployment_name.as_str().cyan(),
            outcome.requested_name.as_str()
        );
    }
    println!("  Decision: {}", outcome.decision.action);
    println!("  Agent id: {}", outcome.agent_id().cyan());
    println!("  Endpoint: {}", outcome.endpoint(region).cyan());
    if let Some(cleanup) = &outcome.cleanup {
        println!("  Removed previous resources:");
        utils::print_cleanup_report(cleanup);
    }
    for warning in &outcome.warnings {
        println!(
            "  {} could not check {} {}: {}",
            "⚠".yellow(),
            warning.kind.display_name(),
            warning.name,
            warning.message
        );
    }
    if outcome.conflict_retried {
        println!(
            "  {}",
            "The agent name was taken at launch; retried once under a new name".yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_identity_requires_same_agent_and_all_ids() {
        let name = DeploymentName::parse("sbom_security_agent").unwrap();
        let mut meta = DeploymentMetadata {
            agent_name: Some("sbom_security_agent".into()),
            cognito_pool_id: Some("us-east-1_pool".into()),
            cognito_client_id: Some("client".into()),
            cognito_discovery_url: Some("https://example.com/.well-known/openid-configuration".into()),
            ..Default::default()
        };
        let cached = cached_identity(&meta, &name).unwrap();
        assert_eq!(cached.client_id, "client");
        assert!(cached.bearer_token.is_empty());

        meta.cognito_client_id = None;
        assert!(cached_identity(&meta, &name).is_none());

        let other = DeploymentName::parse("other_agent").unwrap();
        assert!(cached_identity(&DeploymentMetadata::default(), &other).is_none());
    }

    #[test]
    fn test_layout_follows_config() {
        let mut config = DeployConfig::default();
        config.runtime.function = true;
        config.runtime.managed_policy_arns = vec!["arn:aws:iam::aws:policy/X".into()];
        let layout = layout(&config);
        assert!(layout.provision_function);
        assert!(layout.provision_log_group);
        assert_eq!(layout.managed_policy_arns.len(), 1);
    }
}
