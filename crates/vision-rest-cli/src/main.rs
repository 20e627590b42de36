//! # Vision REST CLI
//!
//! Runs configured workflows against a Vision server and offers small XML
//! utilities for inspecting saved responses.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use vision_rest_client::resources::free_tag_serials;
use vision_rest_client::{extract_attribute, VisionClient};

mod config;
mod templates;

use config::{load_workflow, RunnerConfig};
use templates::DirTemplates;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("run") => run(args.get(2).map(String::as_str)).await?,
        Some("extract") => {
            if args.len() < 5 {
                eprintln!("Usage: vision-rest extract <file> <element> <attribute>");
                std::process::exit(1);
            }
            let xml = read(&args[2])?;
            let value = extract_attribute(&xml, &args[3], &args[4])
                .with_context(|| format!("Failed to extract from {}", args[2]))?;
            println!("{value}");
        }
        Some("free-tags") => {
            if args.len() < 3 {
                eprintln!("Usage: vision-rest free-tags <file>");
                std::process::exit(1);
            }
            let xml = read(&args[2])?;
            for serial in free_tag_serials(&xml).context("Failed to parse tag listing")? {
                println!("{serial}");
            }
        }
        None | Some("help" | "--help" | "-h") => print_help(),
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run(workflow_path: Option<&str>) -> Result<()> {
    let config = RunnerConfig::from_env()?;

    let workflow = match (workflow_path, &config.workflow) {
        (Some(path), _) => load_workflow(Path::new(path))?,
        (None, Some(workflow)) => workflow.clone(),
        (None, None) => bail!("No workflow given; pass a file or set VISION_WORKFLOW"),
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server_url,
        steps = workflow.steps.len(),
        "Starting workflow"
    );

    let mut client = VisionClient::new(config.client_config())?;
    let templates = DirTemplates::new(&config.template_dir);

    let ctx = workflow.run(&mut client, &templates).await?;

    if let Some(asset_id) = &ctx.asset_id {
        println!("asset: {asset_id}");
    }
    if let Some(tag_id) = &ctx.tag_id {
        println!("tag: {tag_id}");
    }
    for serial in ctx.free_tags.iter().flatten() {
        println!("free: {serial}");
    }
    if let Some(body) = &ctx.last_response {
        println!("{body}");
    }

    Ok(())
}

fn read(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))
}

fn print_help() {
    println!(
        r#"Vision REST CLI

USAGE:
    vision-rest <COMMAND> [OPTIONS]

COMMANDS:
    run [workflow.json]                  Run a workflow (default: VISION_WORKFLOW)
    extract <file> <element> <attribute> Print an attribute of the first matching element
    free-tags <file>                     List serial numbers of unbound tags in a listing
    help                                 Show this help message

ENVIRONMENT:
    VISION_SERVER_URL     Server base URL (default http://localhost:7070)
    VISION_TIMEOUT_SECS   Request timeout in seconds (default 30)
    VISION_REFERER        Referer header, or "console"
    VISION_TEMPLATE_DIR   Request template directory (default ./templates)
    VISION_WORKFLOW       Workflow as inline JSON
    VISION_WORKFLOW_PATH  Workflow JSON file

EXAMPLES:
    vision-rest run bind-tag.json
    vision-rest extract response.xml asset id
"#
    );
}
