use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use refabric::{run_migration, write_outputs, MigrationOptions};
use refabric_parser::TemplateIndex;
use refabric_resolver::{HttpWorkspaceClient, PipelineResolver};

#[derive(Parser)]
#[command(name = "refabric")]
#[command(about = "Migrate ADF ARM template exports to Fabric pipeline definitions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate a template and write Fabric pipeline documents
    Migrate {
        /// ARM template file (ADF export)
        #[arg(short, long)]
        template: PathBuf,

        /// Output directory for migrated documents
        #[arg(short, long)]
        out: PathBuf,

        /// Target workspace id; without one, cross-pipeline references are
        /// checked against the template itself
        #[arg(short, long)]
        workspace: Option<String>,

        /// Bearer token for the workspace item API
        #[arg(long, env = "FABRIC_TOKEN", default_value = "")]
        token: String,

        /// Workspace item API base URL
        #[arg(long, default_value = "https://api.fabric.microsoft.com")]
        base_url: String,

        /// Name for the generated variable library
        #[arg(long, default_value = "MigratedGlobalParameters")]
        library_name: String,

        /// Write the variable library even when placeholder secrets block
        /// deployment
        #[arg(long)]
        allow_placeholders: bool,

        /// Run the whole migration but write nothing; print the summary
        #[arg(long)]
        dry_run: bool,
    },

    /// List the components of a template
    Inspect {
        /// ARM template file (ADF export)
        #[arg(short, long)]
        template: PathBuf,
    },

    /// Transform in memory and print the validation reports
    Validate {
        /// ARM template file (ADF export)
        #[arg(short, long)]
        template: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.debug {
        tracing::Level::TRACE
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(cli.debug)
        .init();

    match cli.command {
        Commands::Migrate {
            template,
            out,
            workspace,
            token,
            base_url,
            library_name,
            allow_placeholders,
            dry_run,
        } => {
            let template = read_template(&template)?;
            let options = MigrationOptions {
                workspace_id: workspace.clone(),
                token,
                library_name,
                ..MigrationOptions::default()
            };
            let resolver = workspace.map(|_| {
                PipelineResolver::new(Arc::new(HttpWorkspaceClient::new(base_url)))
            });
            let summary = run_migration(&template, resolver.as_ref(), &options).await?;

            for outcome in &summary.pipelines {
                match &outcome.error {
                    None => info!(pipeline = %outcome.name, "migrated"),
                    Some(error) => eprintln!("pipeline `{}` failed: {error}", outcome.name),
                }
                if let Some(report) = &outcome.report {
                    if !report.is_clean() {
                        eprintln!("{report}");
                    }
                }
            }

            if dry_run {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            write_outputs(&summary, &out, allow_placeholders)?;
            info!(out = %out.display(), "migration outputs written");

            let failed = summary.failed_pipelines().count();
            if failed > 0 {
                bail!("{failed} pipeline(s) failed to migrate; see the summary for details");
            }
            Ok(())
        }

        Commands::Inspect { template } => {
            let template = read_template(&template)?;
            let index = TemplateIndex::from_json(&template)?;
            let counts = index.counts();
            println!(
                "pipelines: {}, datasets: {}, linked services: {}, triggers: {}, global parameters: {}",
                counts.pipelines,
                counts.datasets,
                counts.linked_services,
                counts.triggers,
                counts.global_parameters
            );
            for pipeline in index.pipelines() {
                println!("pipeline {}", pipeline.name);
            }
            for trigger in index.triggers() {
                println!("trigger {}", trigger.name);
            }
            Ok(())
        }

        Commands::Validate { template } => {
            let template = read_template(&template)?;
            let summary = run_migration(&template, None, &MigrationOptions::default()).await?;
            for outcome in &summary.pipelines {
                match (&outcome.error, &outcome.report) {
                    (Some(error), _) => eprintln!("pipeline `{}` failed: {error}", outcome.name),
                    (None, Some(report)) => println!("{report}"),
                    (None, None) => {}
                }
            }
            if summary.failed_pipelines().count() > 0 || summary.has_validation_errors() {
                bail!("validation found errors");
            }
            Ok(())
        }
    }
}

fn read_template(path: &PathBuf) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}
