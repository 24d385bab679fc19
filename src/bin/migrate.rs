use clap::{Parser, Subcommand};
use instance_migration::runtime::records::RecordType;
use instance_migration::scenario::Scenario;
use std::path::PathBuf;
use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Runs process instance migration scenarios", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the scenario instance and migrate it, printing the written records
    Run {
        /// Path to the scenario YAML file
        #[arg(long, short)]
        scenario: PathBuf,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the migration of the scenario instance without applying it
    Validate {
        /// Path to the scenario YAML file
        #[arg(long, short)]
        scenario: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { scenario, json } => {
            info!("Loading scenario from: {:?}", scenario);
            let report = Scenario::load(&scenario)?.run()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            for record in &report.records {
                let kind = match record.record_type {
                    RecordType::Event => "EVENT",
                    RecordType::Command => "COMMAND",
                    RecordType::CommandRejection => "REJECTION",
                };
                println!("{:>4} {:<9} {:>20} {}", record.position, kind, record.key, serde_json::to_string(&record.intent)?);
            }
            match (report.rejection_type, &report.reason) {
                (Some(rejection_type), Some(reason)) => println!("Rejected ({}): {}", rejection_type, reason),
                _ => println!(
                    "Migrated process instance {} ({})",
                    report.process_instance_key,
                    if report.active { "active" } else { "completed" }
                ),
            }
        }
        Commands::Validate { scenario } => {
            info!("Loading scenario from: {:?}", scenario);
            match Scenario::load(&scenario)?.validate()? {
                Ok(plan) => {
                    println!(
                        "Migration of process instance {} to '{}' (version {}) is valid:",
                        plan.process_instance_key, plan.target.bpmn_process_id, plan.target.version
                    );
                    for element in &plan.elements {
                        println!(
                            "  {} {} -> {} ({} catch event actions)",
                            element.element_instance_key,
                            element.source_element_id,
                            element.target_element_id,
                            element.catch_events.len()
                        );
                    }
                }
                Err(rejection) => {
                    warn!(rejection_type = %rejection.rejection_type, "Migration would be rejected");
                    println!("{}", rejection);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
