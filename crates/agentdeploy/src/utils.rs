use agentdeploy_aws::AwsContext;
use agentdeploy_cloud::{Adapters, CleanupReport, DeploymentName, MetadataStore};
use agentdeploy_config::DeployConfig;
use anyhow::Context;
use colored::Colorize;
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout is reserved for user-facing output
pub fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Deployment name from the flag, else the config file
pub fn deployment_name(config: &DeployConfig, flag: Option<String>) -> anyhow::Result<DeploymentName> {
    let raw = flag.unwrap_or_else(|| config.agent_name.clone());
    DeploymentName::parse(raw).context("invalid agent name")
}

/// AWS context for the resolved region
pub async fn aws_context(config: &DeployConfig, region: Option<&str>) -> anyhow::Result<AwsContext> {
    let region = config.resolve_region(region)?;
    tracing::info!(region = %region, "using AWS region");
    Ok(AwsContext::new(&region).await)
}

pub fn adapters(config: &DeployConfig, ctx: &AwsContext) -> Adapters {
    agentdeploy_aws::adapters(ctx, config.call_timeout())
}

pub fn metadata_store(config: &DeployConfig) -> MetadataStore {
    MetadataStore::new(&config.metadata_file)
}

/// Ask for confirmation on stdin; only the word `yes` confirms
pub fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} Type 'yes' to continue: ", question);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(is_yes(&input))
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

pub fn print_cleanup_report(report: &CleanupReport) {
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };
    for result in &report.succeeded {
        println!("  {} {} {}", "✓".green(), result.kind, result.name.cyan());
    }
    for result in &report.skipped {
        println!("  {} {} {} ({})", "-".dimmed(), result.kind, result.name, result.message);
    }
    for result in &report.failed {
        println!(
            "  {} {} {}: {}",
            "✗".red(),
            result.kind,
            result.name,
            result.error.as_deref().unwrap_or(&result.message)
        );
    }
    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }
    println!(
        "{}: {}, skipped {}, failed {} ({} ms)",
        verb,
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len(),
        report.duration_ms
    );
}
