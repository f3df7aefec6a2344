use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use property_catalog_api::{CatalogConfig, PropertyCatalogApi};
use property_catalog_core::{ArtifactCoordinates, ArtifactId, RunParameters};
use serde_json::Value;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "pcat")]
#[command(about = "Property Catalog CLI")]
struct Cli {
    /// `SQLite` database path; overrides `db_path` from the config file.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Optional YAML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Release {
        #[command(subcommand)]
        command: Box<ReleaseCommand>,
    },
    Metadata {
        #[command(subcommand)]
        command: Box<MetadataCommand>,
    },
    Run {
        #[command(subcommand)]
        command: Box<RunCommand>,
    },
    Properties {
        #[command(subcommand)]
        command: Box<PropertiesCommand>,
    },
    Runs {
        #[command(subcommand)]
        command: Box<RunsCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum ReleaseCommand {
    /// Register a release without processing it.
    Register(ReleaseArgs),
    /// Register a release and dispatch its processing run.
    Notify(ReleaseArgs),
    List(ArtifactArgs),
}

#[derive(Debug, Args)]
struct ReleaseArgs {
    #[arg(long)]
    coordinates: String,
    #[arg(long)]
    entity_id: Option<String>,
}

#[derive(Debug, Args)]
struct ArtifactArgs {
    /// `group:artifact`
    #[arg(long)]
    artifact: String,
}

#[derive(Debug, Subcommand)]
enum MetadataCommand {
    Upload(MetadataUploadArgs),
}

#[derive(Debug, Args)]
struct MetadataUploadArgs {
    #[arg(long)]
    coordinates: String,
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Subcommand)]
enum RunCommand {
    Start(RunStartArgs),
}

#[derive(Debug, Args)]
struct RunStartArgs {
    #[arg(long)]
    name: String,
    /// Run parameter as `key=value`; repeatable.
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum PropertiesCommand {
    List(ArtifactArgs),
}

#[derive(Debug, Subcommand)]
enum RunsCommand {
    List(RunsListArgs),
}

#[derive(Debug, Args)]
struct RunsListArgs {
    #[arg(long)]
    name: Option<String>,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = CatalogConfig::load_optional(cli.config.as_deref())?;
    let api = PropertyCatalogApi::with_config(config.resolve_db_path(cli.db), config.orchestrator);

    match cli.command {
        Command::Db { command } => run_db(*command, &api),
        Command::Release { command } => run_release(*command, &api),
        Command::Metadata { command } => run_metadata(*command, &api),
        Command::Run { command } => run_run(*command, &api),
        Command::Properties { command } => run_properties(*command, &api),
        Command::Runs { command } => run_runs(*command, &api),
    }
}

fn run_db(command: DbCommand, api: &PropertyCatalogApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty(),
                "fingerprint_format": status.fingerprint_format
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize migrate result")?)
        }
    }
}

fn run_release(command: ReleaseCommand, api: &PropertyCatalogApi) -> Result<()> {
    match command {
        ReleaseCommand::Register(args) => {
            let coordinates = parse_coordinates(&args.coordinates)?;
            let record = api.register_release(&coordinates, args.entity_id.as_deref())?;
            emit_json(serde_json::to_value(&record).context("failed to serialize release")?)
        }
        ReleaseCommand::Notify(args) => {
            let coordinates = parse_coordinates(&args.coordinates)?;
            let receipt = api.notify_release(&coordinates, args.entity_id.as_deref())?;
            emit_json(serde_json::to_value(&receipt).context("failed to serialize run receipt")?)
        }
        ReleaseCommand::List(args) => {
            let artifact = parse_artifact(&args.artifact)?;
            let releases = api.list_releases(&artifact)?;
            emit_json(serde_json::json!({
                "artifact": artifact.to_string(),
                "releases": releases
            }))
        }
    }
}

fn run_metadata(command: MetadataCommand, api: &PropertyCatalogApi) -> Result<()> {
    match command {
        MetadataCommand::Upload(args) => {
            let coordinates = parse_coordinates(&args.coordinates)?;
            let body = fs::read_to_string(&args.file).with_context(|| {
                format!("failed to read metadata document {}", args.file.display())
            })?;
            let upload = api.upload_metadata(&coordinates, &body)?;
            emit_json(serde_json::to_value(&upload).context("failed to serialize upload")?)
        }
    }
}

fn run_run(command: RunCommand, api: &PropertyCatalogApi) -> Result<()> {
    match command {
        RunCommand::Start(args) => {
            let params = parse_params(&args.params)?;
            let receipt = api.start_run(&args.name, params)?;
            emit_json(serde_json::to_value(&receipt).context("failed to serialize run receipt")?)
        }
    }
}

fn run_properties(command: PropertiesCommand, api: &PropertyCatalogApi) -> Result<()> {
    match command {
        PropertiesCommand::List(args) => {
            let artifact = parse_artifact(&args.artifact)?;
            let properties = api.list_properties(&artifact)?;
            emit_json(serde_json::json!({
                "artifact": artifact.to_string(),
                "properties": properties
            }))
        }
    }
}

fn run_runs(command: RunsCommand, api: &PropertyCatalogApi) -> Result<()> {
    match command {
        RunsCommand::List(args) => {
            let runs = api.list_runs(args.name.as_deref())?;
            emit_json(serde_json::json!({ "runs": runs }))
        }
    }
}

fn parse_coordinates(value: &str) -> Result<ArtifactCoordinates> {
    ArtifactCoordinates::parse(value).with_context(|| format!("invalid coordinates: {value}"))
}

fn parse_artifact(value: &str) -> Result<ArtifactId> {
    ArtifactId::parse(value).with_context(|| format!("invalid artifact: {value}"))
}

fn parse_params(raw: &[String]) -> Result<RunParameters> {
    let mut params = RunParameters::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("run parameter MUST be `key=value` (received: {entry})"))?;
        if key.trim().is_empty() {
            return Err(anyhow!("run parameter key MUST be non-blank (received: {entry})"));
        }
        if params.insert(key.trim().to_string(), value.to_string()).is_some() {
            return Err(anyhow!("duplicate run parameter: {}", key.trim()));
        }
    }
    Ok(params)
}
