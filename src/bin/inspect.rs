//! Deployment Document Inspector
//!
//! Summarizes the runs, entries and pending ownership of a persisted
//! deployment document.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use deploy_ledger::{DeployConfig, DeploymentDocument, JsonFileBackend};
use serde_json::{Map, Value as Json};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deploy-inspect")]
#[command(about = "Inspect a persisted deployment document")]
struct Cli {
    /// Document to inspect (defaults to the configured network and system salt)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-screen overview
    Summary,

    /// Run history
    Runs,

    /// Recorded entries
    Entries {
        /// Only entries of this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Units still waiting for ownership handoff
    Pending,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let path = match cli.file {
        Some(path) => path,
        None => {
            let config = DeployConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
            config.document_path(&config.session.network, &config.session.system_salt)
        }
    };

    let Some(document) = JsonFileBackend::read(&path)? else {
        bail!("no deployment document at {}", path.display());
    };

    match cli.command {
        Commands::Summary => {
            let entries = collect_entries(&document);
            println!("📦 {} / {}", document.network, document.system_salt_string);
            println!("   updated:  {}", document.updated_at);
            println!("   runs:     {}", document.runs.len());
            println!("   entries:  {}", entries.len());
            println!("   pending:  {}", document.pending_ownership.len());
            match document.latest_run() {
                Some(run) if run.is_finished() => println!("✅ latest run #{} finished", run.sequence),
                Some(run) => println!("⏳ latest run #{} still open", run.sequence),
                None => println!("   no runs recorded"),
            }
        }

        Commands::Runs => {
            for run in &document.runs {
                let finish = match (run.finish_block, run.finish_timestamp) {
                    (Some(block), Some(ts)) => format!("block {} @ {}", block, ts),
                    _ => "open".to_string(),
                };
                println!(
                    "#{:<3} {}  start block {} @ {}  finish {}  ({} registered)",
                    run.sequence,
                    run.deployer,
                    run.start_block,
                    run.start_timestamp,
                    finish,
                    run.registered.len()
                );
                for key in &run.registered {
                    println!("     └─ {}", key);
                }
            }
        }

        Commands::Entries { category } => {
            for (key, fields) in collect_entries(&document) {
                let entry_category = text(&fields, "category");
                if category.as_deref().is_some_and(|c| c != entry_category) {
                    continue;
                }
                println!(
                    "{:<32} {:<9} {:<42} {}",
                    key,
                    entry_category,
                    text(&fields, "address"),
                    text(&fields, "contractType")
                );
            }
        }

        Commands::Pending => {
            if document.pending_ownership.is_empty() {
                println!("✅ No pending ownership transfers");
            }
            for item in &document.pending_ownership {
                println!("⏳ {} {}", item.address, item.label);
            }
        }
    }
    Ok(())
}

/// Entries under `contracts`, nested proxy implementations included
fn collect_entries(document: &DeploymentDocument) -> Vec<(String, Map<String, Json>)> {
    let mut out = Vec::new();
    if let Some(Json::Object(root)) = document.data.get("contracts") {
        walk(None, root, &mut out);
    }
    out
}

fn walk(prefix: Option<&str>, node: &Map<String, Json>, out: &mut Vec<(String, Map<String, Json>)>) {
    for (name, child) in node {
        let Json::Object(fields) = child else {
            continue;
        };
        let key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.clone(),
        };
        if fields.contains_key("address") {
            out.push((key.clone(), fields.clone()));
        }
        walk(Some(&key), fields, out);
    }
}

fn text<'a>(fields: &'a Map<String, Json>, name: &str) -> &'a str {
    fields.get(name).and_then(Json::as_str).unwrap_or("-")
}
