use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use property_catalog_core::{
    ArtifactCoordinates, ArtifactId, CatalogEntry, MetadataDocument, ReleaseRecord, RunExecution,
    RunParameters,
};
use serde::{Deserialize, Serialize};

mod config;
mod dispatcher;
mod orchestrator;
mod ports;
mod scheduler;
mod sqlite;

pub use property_catalog_store_sqlite::{MetadataUpload, SchemaStatus};

pub use config::{CatalogConfig, OrchestratorConfig, DEFAULT_DB_PATH};
pub use dispatcher::{ArtifactReleased, RunDispatcher};
pub use orchestrator::{
    artifact_from_params, ReleaseOrchestrator, ARTIFACT_PARAM, RELEASE_RUN_NAME,
};
pub use ports::{
    CatalogRepository, JobScheduler, MetadataDocumentLookup, ReleaseLookup, ReleaseReport,
    RunLedger, RunOutcome, RunReceipt, RunRequestError, RunUnit,
};
pub use scheduler::{run_key, InMemoryRunLedger, LocalScheduler};
pub use sqlite::SqliteCatalog;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

/// Entry point shared by the CLI and the HTTP service.
///
/// Wires the SQLite collaborators, the release orchestrator, a SQLite-ledgered local scheduler
/// and the release dispatcher. Clones share one scheduler, so the in-flight guard spans them.
#[derive(Clone)]
pub struct PropertyCatalogApi {
    catalog: SqliteCatalog,
    scheduler: Arc<LocalScheduler>,
    dispatcher: RunDispatcher,
}

impl PropertyCatalogApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self::with_config(db_path, OrchestratorConfig::default())
    }

    #[must_use]
    pub fn with_config(db_path: PathBuf, config: OrchestratorConfig) -> Self {
        let catalog = SqliteCatalog::new(db_path);
        let shared = Arc::new(catalog.clone());
        let orchestrator =
            ReleaseOrchestrator::new(shared.clone(), shared.clone(), shared.clone(), config);
        let scheduler = Arc::new(LocalScheduler::new(shared).with_unit(Arc::new(orchestrator)));
        let dispatcher = RunDispatcher::new(scheduler.clone());

        Self { catalog, scheduler, dispatcher }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.catalog.db_path()
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = property_catalog_store_sqlite::SqliteStore::open(self.db_path())?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = property_catalog_store_sqlite::SqliteStore::open(self.db_path())?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Register a release without processing it.
    ///
    /// # Errors
    /// Returns an error when persistence fails.
    pub fn register_release(
        &self,
        coordinates: &ArtifactCoordinates,
        entity_id: Option<&str>,
    ) -> Result<ReleaseRecord> {
        let mut store = self.catalog.open_store()?;
        store.register_release(coordinates, entity_id)
    }

    /// # Errors
    /// Returns an error when the releases cannot be read.
    pub fn list_releases(&self, artifact: &ArtifactId) -> Result<Vec<ReleaseRecord>> {
        self.catalog.open_store()?.list_releases(artifact)
    }

    /// Validate and store the metadata document of a release.
    ///
    /// # Errors
    /// Returns an error when the body is not a valid metadata document or persistence fails.
    pub fn upload_metadata(
        &self,
        coordinates: &ArtifactCoordinates,
        body: &str,
    ) -> Result<MetadataUpload> {
        MetadataDocument::from_json(body)
            .and_then(MetadataDocument::extract)
            .with_context(|| format!("rejected metadata document for {coordinates}"))?;

        let mut store = self.catalog.open_store()?;
        store.put_metadata_document(coordinates, body)
    }

    /// Register a release (if new) and dispatch its processing run.
    ///
    /// # Errors
    /// Returns an error when registration fails, or wraps the scheduler's
    /// [`RunRequestError`] when the run is rejected.
    pub fn notify_release(
        &self,
        coordinates: &ArtifactCoordinates,
        entity_id: Option<&str>,
    ) -> Result<RunReceipt> {
        let release = self.register_release(coordinates, entity_id)?;
        let receipt = self.dispatcher.on_released(&ArtifactReleased {
            entity_id: release.entity_id,
            coordinates: release.coordinates,
        })?;
        Ok(receipt)
    }

    /// Start a named run directly, as an operator would to retry a failed release.
    ///
    /// # Errors
    /// Wraps the scheduler's [`RunRequestError`] when the run is rejected.
    pub fn start_run(&self, run_name: &str, params: RunParameters) -> Result<RunReceipt> {
        Ok(self.scheduler.start(run_name, params)?)
    }

    /// Current catalog of one artifact, ordered by property name.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be read.
    pub fn list_properties(&self, artifact: &ArtifactId) -> Result<Vec<CatalogEntry>> {
        self.catalog.open_store()?.list_catalog(artifact)
    }

    /// # Errors
    /// Returns an error when the run ledger cannot be read.
    pub fn list_runs(&self, run_name: Option<&str>) -> Result<Vec<RunExecution>> {
        self.scheduler.ledger().list(run_name)
    }
}
