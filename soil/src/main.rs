//! Soil - Entry Point
//!
//! Deploy one or more clusters, run tests, observe the results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use tracing::debug;

use soil::deploy::kind::{Kind, DEFAULT_KIND};
use soil::deploy::lifecycle::Lifecycle;
use soil::deploy::registry::DeploymentRegistry;
use soil::deploy::scalability::CreateParams;
use soil::deploy::status::StatusStore;
use soil::logs::{init_logging, LogLevel, LogOptions};
use soil::process::CommandRunner;
use soil::storage::layout::StorageLayout;
use soil::storage::settings::Settings;
use soil::utils::version_info;

const DEFAULT_NAME: &str = "default";

#[derive(Parser)]
#[command(name = "so")]
#[command(about = "Soil is a tool for deploying systems in different environments")]
#[command(version)]
struct Cli {
    /// Deployments root (defaults to $SOIL_HOME, then ~/.soil)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Also write logs to <root>/soil.log
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create deployment under given name
    #[command(visible_alias = "dp")]
    Deploy {
        #[arg(default_value = DEFAULT_NAME)]
        name: String,

        /// Deployment type
        #[arg(short = 't', long = "type", default_value = DEFAULT_KIND)]
        kind: String,

        /// Terraform git repo ref, as url[@branch]
        #[arg(short = 'r', long = "terraform-repo-ref")]
        repo_ref: Option<String>,

        /// Terraform work dir
        #[arg(short = 'w', long = "terraform-work-dir")]
        work_dir: Option<String>,

        /// Terraform var file
        #[arg(short = 'v', long = "terraform-var-file")]
        var_file: Option<String>,

        /// Extra attribute stored with the deployment, as key=value
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },

    /// Print deployment status
    #[command(visible_aliases = ["st", "stat", "state"])]
    Status { name: Option<String> },

    /// Run tests against a deployment
    #[command(visible_alias = "ts")]
    Test {
        #[arg(default_value = DEFAULT_NAME)]
        name: String,
    },

    /// Remove deployment with given name
    #[command(visible_alias = "rm")]
    Remove {
        #[arg(default_value = DEFAULT_NAME)]
        name: String,

        /// Delete the working directory after teardown
        #[arg(short, long)]
        force: bool,
    },

    /// Print version and build information as JSON
    Version,
}

/// `key=value`; the value is parsed as JSON and kept as a string otherwise
fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Version = cli.command {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(());
    }

    let layout = StorageLayout::resolve(cli.root);
    let mut settings = Settings::load(&layout.settings_file())
        .await
        .context("Unable to read settings file")?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    settings.log_json |= cli.log_json;

    let _guard = init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        log_file: cli
            .log_file
            .then(|| layout.log_file().path().to_path_buf()),
        json_format: settings.log_json,
        ..Default::default()
    })?;
    debug!("soil {} using root {}", version_info(), layout.base_dir.display());

    let store = StatusStore::new(layout, Arc::new(DeploymentRegistry::builtin()));
    let executor = Arc::new(CommandRunner::new(settings.shell.clone()));
    let lifecycle = Lifecycle::new(store, settings, executor);

    match cli.command {
        Commands::Deploy {
            name,
            kind,
            repo_ref,
            work_dir,
            var_file,
            params,
        } => {
            Kind::lookup(&kind)?;
            println!("Deploying {} as {}...", kind, name);
            let params = CreateParams {
                repo_ref,
                terraform_work_dir: work_dir,
                terraform_var_file: var_file,
                params: params.into_iter().collect::<Map<String, Value>>(),
            };
            let workdir = lifecycle.create(&name, &kind, params).await?;
            println!("{} {}", "Created".green(), workdir.display());
        }
        Commands::Status { name: Some(name) } => {
            let text = lifecycle
                .describe(&name)
                .await
                .with_context(|| format!("Unable to read deployment '{}'", name))?;
            println!("Deployment {}", text);
        }
        Commands::Status { name: None } => {
            let deployments = lifecycle.list_all().await?;
            if deployments.is_empty() {
                println!("No deployments present.");
            }
            for deployment in deployments {
                println!("- {}", deployment.brief());
            }
        }
        Commands::Test { name } => {
            lifecycle.test(&name).await?;
        }
        Commands::Remove { name, force } => {
            println!("Removing {}...", name);
            lifecycle.remove(&name, force).await?;
            println!("{} {}", "Removed".green(), name);
        }
        Commands::Version => {}
    }

    Ok(())
}
