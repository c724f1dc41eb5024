//! reqflow - requirement analysis from the command line
//!
//! ## Commands
//!
//! - `analyze`: run the full pipeline and print the integrated report
//! - `plan`: show the interpretation and execution plan without running anything
//! - `components`: list registered components with their last-known health

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, Level};

use reqflow_core::{
    render_report_md, write_report_json, ComponentDescriptor, ComponentHealth, IntegratedReport,
    Pipeline, ReqflowConfig, Requirement,
};

#[derive(Parser)]
#[command(name = "reqflow")]
#[command(version = reqflow_core::VERSION)]
#[command(about = "Multi-stage requirement analysis orchestrator", long_about = None)]
struct Cli {
    /// Registry and pipeline config (TOML, or JSON with a .json extension)
    #[arg(short, long, global = true, env = "REQFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a requirement and print the integrated report
    Analyze {
        #[command(flatten)]
        input: RequirementArgs,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,

        /// Also write the report as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show how a requirement would be interpreted and which components would run
    Plan {
        #[command(flatten)]
        input: RequirementArgs,
    },

    /// List registered components and their last-known health
    Components,
}

#[derive(clap::Args)]
struct RequirementArgs {
    /// Requirement text (read from --file or stdin when omitted)
    text: Option<String>,

    /// Read the requirement text from a file
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Context entry as key=value (repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE")]
    context: Vec<String>,

    /// Component id to consult first (repeatable)
    #[arg(long = "prefer", value_name = "ID")]
    prefer: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reqflow_core::init_tracing(cli.json, level);

    let pipeline = load_pipeline(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            input,
            format,
            output,
        } => {
            let requirement = input.into_requirement()?;
            let report = pipeline.analyze_requirement(requirement).await;
            if let Some(path) = output.as_deref() {
                write_report_json(path, &report)
                    .with_context(|| format!("write report to {}", path.display()))?;
            }
            println!("{}", render(&report, format)?);
            Ok(())
        }
        Commands::Plan { input } => {
            let requirement = input.into_requirement()?;
            let preview = pipeline.plan(&requirement);
            println!("{}", serde_json::to_string_pretty(&preview)?);
            Ok(())
        }
        Commands::Components => {
            println!("{}", serde_json::to_string_pretty(&component_listing(&pipeline)?)?);
            Ok(())
        }
    }
}

fn load_pipeline(path: Option<&Path>) -> Result<Pipeline> {
    let config = match path {
        Some(path) => ReqflowConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => {
            debug!("no config given; using the built-in generic fallback only");
            ReqflowConfig::default()
        }
    };
    Pipeline::from_config(&config).context("build pipeline")
}

impl RequirementArgs {
    fn into_requirement(self) -> Result<Requirement> {
        let text = match (self.text, self.file) {
            (Some(text), _) => text,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?,
            (None, None) => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("read requirement from stdin")?;
                buf
            }
        };
        Ok(Requirement::new(text)
            .with_context(parse_context(&self.context)?)
            .with_preferred(self.prefer))
    }
}

fn parse_context(entries: &[String]) -> Result<BTreeMap<String, String>> {
    let mut context = BTreeMap::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("context entry must be key=value: {entry}");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("context key must not be empty: {entry}");
        }
        context.insert(key.to_string(), value.trim().to_string());
    }
    Ok(context)
}

fn render(report: &IntegratedReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Markdown => render_report_md(report),
    })
}

#[derive(Serialize)]
struct ComponentEntry<'a> {
    descriptor: &'a ComponentDescriptor,
    health: Option<&'a ComponentHealth>,
    fallback: bool,
}

#[derive(Serialize)]
struct ComponentListing<'a> {
    registry_size: usize,
    components: Vec<ComponentEntry<'a>>,
}

fn component_listing(pipeline: &Pipeline) -> Result<serde_json::Value> {
    let liveness = pipeline.liveness();
    let registry = pipeline.registry();
    let listing = ComponentListing {
        registry_size: liveness.registry_size,
        components: registry
            .descriptors()
            .map(|d| ComponentEntry {
                descriptor: d,
                health: liveness.components.iter().find(|h| h.component_id == d.id),
                fallback: d.id == registry.fallback_id(),
            })
            .collect(),
    };
    Ok(serde_json::to_value(&listing)?)
}
