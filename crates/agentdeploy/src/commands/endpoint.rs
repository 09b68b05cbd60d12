use crate::utils;
use agentdeploy_cloud::endpoint;
use agentdeploy_cloud::EndpointResolver;
use agentdeploy_config::DeployConfig;
use colored::Colorize;

pub async fn handle(
    config: &DeployConfig,
    agent_name: Option<String>,
    url: Option<String>,
    region: Option<String>,
) -> anyhow::Result<()> {
    // An explicit URL only needs normalizing; no credentials or network
    if let Some(raw) = url {
        println!("{}", endpoint::normalize(&raw)?);
        return Ok(());
    }

    let name = utils::deployment_name(config, agent_name)?;
    let ctx = utils::aws_context(config, region.as_deref()).await?;
    let adapters = utils::adapters(config, &ctx);
    let saved = utils::metadata_store(config).load().await?;

    let resolved = EndpointResolver::new(ctx.region())
        .with_metadata(saved)
        .with_discovery(&adapters)
        .resolve(&name)
        .await?;

    tracing::info!(source = %resolved.source, "endpoint resolved");
    eprintln!("{} (from {})", name.as_str().cyan(), resolved.source);
    println!("{}", resolved.url);
    Ok(())
}
