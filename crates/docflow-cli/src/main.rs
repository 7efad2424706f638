//! docflow CLI: run, validate and explain pipelines over JSON-lines files.

use clap::{Parser, Subcommand};
use docflow_core::config::EngineConfig;
use docflow_core::value::Document;
use docflow_exec::Engine;
use docflow_operators::OpPlan;
use docflow_planner::{parse_json_pipeline, parse_yaml_pipeline, ParsedPipeline};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Document aggregation pipelines over JSON-lines collections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline and print result documents as JSON lines
    Run {
        /// Path to the pipeline file (.json, .yaml or .yml)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Collection to load, as name=path.jsonl (repeatable)
        #[arg(short, long = "collection", value_name = "NAME=PATH")]
        collections: Vec<String>,

        /// Text index to build, as collection:field[,field] (repeatable)
        #[arg(long = "text-index", value_name = "COLLECTION:FIELDS")]
        text_indexes: Vec<String>,

        /// Require every quoted phrase to match (overrides config)
        #[arg(long)]
        phrases_required: bool,

        /// Cap on documents buffered by one blocking stage (overrides config)
        #[arg(long)]
        max_stage_docs: Option<usize>,

        /// Print the run manifest to stderr
        #[arg(long)]
        manifest: bool,
    },

    /// Parse and compile a pipeline without running it
    Validate {
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Show the lowered pipeline: source, stages, blocking barriers
    Explain {
        #[arg(short, long)]
        pipeline: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("DOCFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            collections,
            text_indexes,
            phrases_required,
            max_stage_docs,
            manifest,
        } => {
            let overrides = CliOverrides {
                phrases_required,
                max_stage_docs,
            };
            if let Err(e) = run_pipeline(&pipeline, &collections, &text_indexes, &overrides, manifest)
            {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { pipeline } => {
            if let Err(e) = validate_pipeline(&pipeline) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Pipeline is valid");
        }
        Commands::Explain { pipeline } => {
            if let Err(e) = explain_pipeline(&pipeline) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

#[derive(Debug, Default)]
struct CliOverrides {
    phrases_required: bool,
    max_stage_docs: Option<usize>,
}

impl CliOverrides {
    fn apply(&self, cfg: &mut EngineConfig) {
        if self.phrases_required {
            cfg.text_phrases_required = true;
        }
        if let Some(n) = self.max_stage_docs {
            cfg.max_stage_docs = Some(n);
        }
    }
}

/// Parse the pipeline file and resolve the effective config:
/// CLI > pipeline file > env > defaults.
fn load_pipeline(
    path: &Path,
    overrides: &CliOverrides,
) -> Result<(ParsedPipeline, EngineConfig), Box<dyn std::error::Error>> {
    let src = fs::read_to_string(path)?;
    let mut config = EngineConfig::from_env();
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => parse_yaml_pipeline(&src, &config)?,
        _ => parse_json_pipeline(&src, &config)?,
    };
    parsed.config.apply(&mut config);
    overrides.apply(&mut config);
    config.validate()?;
    Ok((parsed, config))
}

fn run_pipeline(
    pipeline_path: &Path,
    collections: &[String],
    text_indexes: &[String],
    overrides: &CliOverrides,
    print_manifest: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (parsed, config) = load_pipeline(pipeline_path, overrides)?;
    let engine = Engine::new(config);

    for arg in collections {
        let (name, path) = parse_collection_arg(arg)?;
        let docs = read_documents(&path)?;
        tracing::info!(collection = name, documents = docs.len(), "loaded");
        engine.insert_collection(name, docs);
    }
    for arg in text_indexes {
        let (collection, fields) = parse_text_index_arg(arg)?;
        engine.create_text_index(collection, &fields)?;
    }

    let out = engine.run(&parsed.pipeline)?;
    for doc in &out.documents {
        println!("{}", serde_json::to_string(doc)?);
    }
    if print_manifest {
        eprintln!("{}", serde_json::to_string_pretty(&out.manifest)?);
    }
    Ok(())
}

fn validate_pipeline(pipeline_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (parsed, config) = load_pipeline(pipeline_path, &CliOverrides::default())?;
    Engine::new(config).validate(&parsed.pipeline)?;
    Ok(())
}

fn explain_pipeline(pipeline_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (parsed, config) = load_pipeline(pipeline_path, &CliOverrides::default())?;
    let explain = Engine::new(config).explain(&parsed.pipeline)?;

    println!("Pipeline Execution Plan");
    println!("=======================");
    println!();
    println!("Collection: {}", parsed.pipeline.collection);
    println!("Plan hash:  {}", explain.pipeline_hash);
    println!();
    println!("Source: {}", describe(&explain.source));
    for stage in &explain.stages {
        let marker = if stage.plan.blocking { " [barrier]" } else { "" };
        println!("  {}. {}{}", stage.index, describe(&stage.plan), marker);
    }
    Ok(())
}

fn describe(plan: &OpPlan) -> String {
    let mut out = plan.stage.clone();
    if let Some(detail) = &plan.detail {
        out.push_str(&format!(" {detail}"));
    }
    if !plan.reads.is_empty() {
        out.push_str(&format!(" (reads {})", plan.reads.join(", ")));
    }
    out
}

/// `name=path`
fn parse_collection_arg(arg: &str) -> Result<(&str, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name, PathBuf::from(path)))
        }
        _ => Err(format!("--collection expects NAME=PATH, got '{arg}'")),
    }
}

/// `collection:field[,field]`
fn parse_text_index_arg(arg: &str) -> Result<(&str, Vec<&str>), String> {
    let (collection, fields) = arg
        .split_once(':')
        .ok_or_else(|| format!("--text-index expects COLLECTION:FIELD[,FIELD], got '{arg}'"))?;
    let fields: Vec<&str> = fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    if collection.is_empty() || fields.is_empty() {
        return Err(format!("--text-index expects COLLECTION:FIELD[,FIELD], got '{arg}'"));
    }
    Ok((collection, fields))
}

/// One JSON document per line; blank lines are skipped. A `.json` file
/// holding a single array is accepted too.
fn read_documents(path: &Path) -> Result<Vec<Document>, Box<dyn std::error::Error>> {
    let src = fs::read_to_string(path)?;
    parse_documents(&src).map_err(|e| format!("{}: {e}", path.display()).into())
}

fn parse_documents(src: &str) -> Result<Vec<Document>, String> {
    if src.trim_start().starts_with('[') {
        return serde_json::from_str(src).map_err(|e| e.to_string());
    }
    src.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Document>(line).map_err(|e| format!("line {}: {e}", i + 1))
        })
        .collect()
}
