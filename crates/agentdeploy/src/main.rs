mod commands;
mod prompt;
mod utils;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "agentdeploy")]
#[command(
    about = "Deploy agent runtimes to AWS Bedrock AgentCore, rerunnable without duplicate or orphaned resources",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the OAuth provider, identity pool and runtime, then launch the agent
    Deploy {
        /// Deployment name (defaults to agent_name from agentdeploy.yaml)
        #[arg(short = 'n', long, env = "AGENT_NAME")]
        agent_name: Option<String>,
        /// On conflict, deploy under a freshly generated name
        #[arg(long, conflicts_with = "force_recreate")]
        auto_update: bool,
        /// On conflict, delete the existing resources and deploy under a fresh name
        #[arg(long)]
        force_recreate: bool,
        /// AWS region (falls back to the config file, AWS_REGION, AWS_DEFAULT_REGION)
        #[arg(long)]
        region: Option<String>,
        /// Never prompt; a conflict in standard mode fails with suggestions
        #[arg(long)]
        non_interactive: bool,
    },
    /// List and delete resources left behind by earlier deployments (dry run by default)
    Cleanup {
        /// Match every resource whose name contains this text
        #[arg(short, long, conflicts_with = "agent_name")]
        pattern: Option<String>,
        /// Match the resources of exactly this deployment
        #[arg(short = 'n', long, env = "AGENT_NAME")]
        agent_name: Option<String>,
        /// Actually delete (otherwise only report what would be deleted)
        #[arg(long)]
        execute: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        #[arg(long)]
        region: Option<String>,
    },
    /// Print the invocation URL of a deployed agent
    Endpoint {
        #[arg(short = 'n', long, env = "AGENT_NAME")]
        agent_name: Option<String>,
        /// Normalize and print this URL instead of looking one up
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        region: Option<String>,
    },
    /// Show the deployed agent's id, endpoint and region
    Status {
        #[arg(short = 'n', long, env = "AGENT_NAME")]
        agent_name: Option<String>,
        #[arg(long)]
        region: Option<String>,
        /// Record the findings in the metadata file
        #[arg(long)]
        save_env: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Version needs neither config nor credentials
    if matches!(cli.command, Commands::Version) {
        println!("agentdeploy {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = agentdeploy_config::DeployConfig::load()?;
    if let Some(source) = &config.source {
        tracing::debug!(path = %source.display(), "loaded configuration");
    }

    match cli.command {
        Commands::Deploy {
            agent_name,
            auto_update,
            force_recreate,
            region,
            non_interactive,
        } => {
            commands::deploy::handle(
                &config,
                commands::deploy::DeployArgs {
                    agent_name,
                    auto_update,
                    force_recreate,
                    region,
                    non_interactive,
                },
            )
            .await
        }
        Commands::Cleanup {
            pattern,
            agent_name,
            execute,
            yes,
            region,
        } => {
            commands::cleanup::handle(
                &config,
                commands::cleanup::CleanupArgs {
                    pattern,
                    agent_name,
                    execute,
                    yes,
                    region,
                },
            )
            .await
        }
        Commands::Endpoint {
            agent_name,
            url,
            region,
        } => commands::endpoint::handle(&config, agent_name, url, region).await,
        Commands::Status {
            agent_name,
            region,
            save_env,
        } => commands::status::handle(&config, agent_name, region, save_env).await,
        Commands::Version => unreachable!("Version is handled before config loading"),
    }
}
