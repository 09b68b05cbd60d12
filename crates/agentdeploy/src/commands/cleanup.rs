use crate::utils;
use agentdeploy_cloud::{CleanupExecutor, ResourceDiscovery};
use agentdeploy_config::DeployConfig;
use colored::Colorize;
use std::io::IsTerminal;

pub struct CleanupArgs {
    pub pattern: Option<String>,
    pub agent_name: Option<String>,
    pub execute: bool,
    pub yes: bool,
    pub region: Option<String>,
}

pub async fn handle(config: &DeployConfig, args: CleanupArgs) -> anyhow::Result<()> {
    let ctx = utils::aws_context(config, args.region.as_deref()).await?;
    let adapters = utils::adapters(config, &ctx);
    let discovery = ResourceDiscovery::new(&adapters);

    let found = match &args.pattern {
        Some(pattern) => {
            if pattern.trim().is_empty() {
                anyhow::bail!("--pattern must not be empty");
            }
            println!("Searching for resources matching '{}'...", pattern.cyan());
            discovery.discover_matching(pattern).await
        }
        None => {
            let name = utils::deployment_name(config, args.agent_name)?;
            println!("Searching for resources of '{}'...", name.as_str().cyan());
            discovery.discover(&name).await
        }
    };

    for warning in &found.warnings {
        println!(
            "  {} could not check {} {}: {}",
            "⚠".yellow(),
            warning.kind.display_name(),
            warning.name,
            warning.message
        );
    }

    let executor = CleanupExecutor::new(&adapters);
    let plan = executor.plan(found.resources);
    if plan.is_empty() {
        println!("{}", "Nothing to clean up".green());
        return Ok(());
    }

    println!();
    println!("{}", format!("Cleanup plan: {}", plan.summary()).bold());
    for entry in &plan.entries {
        println!(
            "  • {} {}",
            entry.resource.kind.display_name(),
            entry.resource.name.cyan()
        );
    }
    println!();

    if !args.execute {
        let report = executor.execute(&plan, true).await;
        utils::print_cleanup_report(&report);
        println!();
        println!("{}", "Dry run only. Rerun with --execute to delete.".yellow());
        return Ok(());
    }

    if !args.yes {
        if !std::io::stdin().is_terminal() {
            anyhow::bail!("refusing to delete without confirmation; pass --yes");
        }
        if !utils::confirm(&format!("Delete {} resources?", plan.len()))? {
            println!("{}", "Cleanup cancelled".yellow());
            return Ok(());
        }
    }

    let report = executor.execute(&plan, false).await;
    utils::print_cleanup_report(&report);
    if !report.is_success() {
        anyhow::bail!("{} resources could not be deleted", report.failed.len());
    }
    println!("{}", "✓ Cleanup complete".green().bold());
    Ok(())
}
