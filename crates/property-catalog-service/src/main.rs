use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use clap::Parser;
use property_catalog_api::{
    CatalogConfig, MetadataUpload, MigrateResult, PropertyCatalogApi, RunReceipt,
    RunRequestError, SchemaStatus, API_CONTRACT_VERSION,
};
use property_catalog_core::{
    ArtifactCoordinates, ArtifactId, CatalogEntry, ReleaseRecord, RunExecution, RunParameters,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const SERVICE_CONTRACT_VERSION: &str = "service.v1";

#[derive(Clone)]
struct ServiceState {
    api: PropertyCatalogApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseRequest {
    coordinates: String,
    #[serde(default)]
    entity_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RunRequest {
    run_name: String,
    #[serde(default)]
    params: RunParameters,
}

#[derive(Debug, Clone, Deserialize)]
struct RunsQuery {
    run_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct PropertiesResponse {
    artifact: String,
    properties: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize)]
struct ReleasesResponse {
    artifact: String,
    releases: Vec<ReleaseRecord>,
}

#[derive(Debug, Parser)]
#[command(name = "property-catalog-service")]
#[command(about = "Local HTTP service for the property catalog")]
struct Args {
    /// `SQLite` database path; overrides `db_path` from the config file.
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl ServiceState {
    fn error(status: StatusCode, message: impl Into<String>) -> ServiceError {
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> ServiceError {
        Self::error(StatusCode::BAD_REQUEST, message)
    }

    fn api_error(err: &anyhow::Error) -> ServiceError {
        let status = match err.downcast_ref::<RunRequestError>() {
            Some(
                RunRequestError::AlreadyRunning { .. } | RunRequestError::AlreadyCompleted { .. },
            ) => StatusCode::CONFLICT,
            Some(RunRequestError::Ledger(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::error(status, format!("{err:#}"))
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/db/schema-version", post(db_schema_version))
        .route("/v1/db/migrate", post(db_migrate))
        .route("/v1/releases", post(release_notify))
        .route("/v1/releases/:artifact", get(release_list))
        .route("/v1/metadata/:coordinates", put(metadata_upload))
        .route("/v1/runs", post(run_start).get(run_list))
        .route("/v1/properties/:coordinates", get(properties_list))
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = CatalogConfig::load_optional(args.config.as_deref())?;
    let api = PropertyCatalogApi::with_config(config.resolve_db_path(args.db), config.orchestrator);
    let state = ServiceState { api };

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, "property catalog service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Run a blocking facade call off the async workers; release runs execute synchronously.
async fn blocking<T, F>(call: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => result.map_err(|err| ServiceState::api_error(&err)),
        Err(err) => Err(ServiceState::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("request task failed: {err}"),
        )),
    }
}

fn parse_coordinates(raw: &str) -> Result<ArtifactCoordinates, ServiceError> {
    ArtifactCoordinates::parse(raw)
        .map_err(|err| ServiceState::bad_request(format!("invalid coordinates: {err}")))
}

/// Accepts `group:artifact` or full coordinates, whose version is ignored.
fn parse_artifact(raw: &str) -> Result<ArtifactId, ServiceError> {
    if let Ok(artifact) = ArtifactId::parse(raw) {
        return Ok(artifact);
    }
    parse_coordinates(raw).map(|coordinates| coordinates.artifact_id())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn db_schema_version(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<SchemaStatus>>, ServiceError> {
    let status = state.api.schema_status().map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(status)))
}

async fn db_migrate(
    State(state): State<ServiceState>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<ServiceEnvelope<MigrateResult>>, ServiceError> {
    let result = state.api.migrate(request.dry_run).map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(result)))
}

async fn release_notify(
    State(state): State<ServiceState>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<ServiceEnvelope<RunReceipt>>, ServiceError> {
    let coordinates = parse_coordinates(&request.coordinates)?;
    let receipt = blocking(move || {
        state.api.notify_release(&coordinates, request.entity_id.as_deref())
    })
    .await?;
    Ok(Json(envelope(receipt)))
}

async fn release_list(
    State(state): State<ServiceState>,
    Path(artifact): Path<String>,
) -> Result<Json<ServiceEnvelope<ReleasesResponse>>, ServiceError> {
    let artifact = parse_artifact(&artifact)?;
    let releases = state.api.list_releases(&artifact).map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(ReleasesResponse { artifact: artifact.to_string(), releases })))
}

async fn metadata_upload(
    State(state): State<ServiceState>,
    Path(coordinates): Path<String>,
    body: String,
) -> Result<Json<ServiceEnvelope<MetadataUpload>>, ServiceError> {
    let coordinates = parse_coordinates(&coordinates)?;
    let upload = state
        .api
        .upload_metadata(&coordinates, &body)
        .map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(upload)))
}

async fn run_start(
    State(state): State<ServiceState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<ServiceEnvelope<RunReceipt>>, ServiceError> {
    let receipt = blocking(move || state.api.start_run(&request.run_name, request.params)).await?;
    Ok(Json(envelope(receipt)))
}

async fn run_list(
    State(state): State<ServiceState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ServiceEnvelope<Vec<RunExecution>>>, ServiceError> {
    let runs = state
        .api
        .list_runs(query.run_name.as_deref())
        .map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(runs)))
}

async fn properties_list(
    State(state): State<ServiceState>,
    Path(coordinates): Path<String>,
) -> Result<Json<ServiceEnvelope<PropertiesResponse>>, ServiceError> {
    let artifact = parse_artifact(&coordinates)?;
    let properties =
        state.api.list_properties(&artifact).map_err(|err| ServiceState::api_error(&err))?;
    Ok(Json(envelope(PropertiesResponse { artifact: artifact.to_string(), properties })))
}
