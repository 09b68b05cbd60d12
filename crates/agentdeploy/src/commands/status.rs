use crate::utils;
use agentdeploy_cloud::metadata::{AGENT_ENDPOINT, AGENT_ID, AGENT_NAME, AWS_REGION, DEPLOYED_AGENT_NAME};
use agentdeploy_cloud::{DeploymentName, EndpointResolver, ResolvedEndpoint};
use agentdeploy_config::DeployConfig;
use colored::Colorize;

/// Metadata keys to record for a located agent
fn save_pairs<'a>(
    name: &'a DeploymentName,
    resolved: &'a ResolvedEndpoint,
    region: &'a str,
) -> Vec<(&'static str, &'a str)> {
    let mut pairs = vec![
        (AGENT_ENDPOINT, resolved.url.as_str()),
        (AGENT_NAME, name.as_str()),
        (AWS_REGION, region),
    ];
    if let Some(agent_id) = &resolved.agent_id {
        pairs.push((AGENT_ID, agent_id.as_str()));
    }
    if let Some(deployment) = &resolved.deployment {
        pairs.push((DEPLOYED_AGENT_NAME, deployment.as_str()));
    }
    pairs
}

pub async fn handle(
    config: &DeployConfig,
    agent_name: Option<String>,
    region: Option<String>,
    save_env: bool,
) -> anyhow::Result<()> {
    let name = utils::deployment_name(config, agent_name)?;
    let ctx = utils::aws_context(config, region.as_deref()).await?;
    let adapters = utils::adapters(config, &ctx);
    let store = utils::metadata_store(config);
    let saved = store.load().await?;

    let resolved = EndpointResolver::new(ctx.region())
        .with_metadata(saved)
        .with_discovery(&adapters)
        .resolve(&name)
        .await?;

    println!("{}", "Agent status".bold());
    println!("  Agent:      {}", name.as_str().cyan());
    if let Some(deployment) = &resolved.deployment {
        println!("  Deployed:   {}", deployment.cyan());
    }
    println!(
        "  Agent id:   {}",
        resolved.agent_id.as_deref().unwrap_or("(unknown)")
    );
    println!("  Endpoint:   {}", resolved.url.cyan());
    println!("  Region:     {}", ctx.region());
    println!("  Found via:  {}", resolved.source);

    if save_env {
        store
            .update(&save_pairs(&name, &resolved, ctx.region()))
            .await?;
        println!(
            "{} saved to {}",
            "✓".green(),
            store.path().display().to_string().cyan()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdeploy_cloud::EndpointSource;

    #[test]
    fn test_save_pairs_include_known_facts_only() {
        let name = DeploymentName::parse("sbom_security_agent").unwrap();
        let resolved = ResolvedEndpoint {
            url: "https://abc.bedrock-agentcore.us-east-1.amazonaws.com/invocations".into(),
            source: EndpointSource::Discovery,
            agent_id: Some("abc".into()),
            deployment: None,
        };
        let pairs = save_pairs(&name, &resolved, "us-east-1");
        assert!(pairs.contains(&(AGENT_ID, "abc")));
        assert!(pairs.contains(&(AWS_REGION, "us-east-1")));
        assert!(!pairs.iter().any(|(k, _)| *k == DEPLOYED_AGENT_NAME));
    }
}
