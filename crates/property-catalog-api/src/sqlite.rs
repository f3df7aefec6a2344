use std::path::{Path, PathBuf};

use anyhow::Result;
use property_catalog_core::{
    ArtifactCoordinates, ArtifactId, CatalogState, ExecutionId, ReconcileOutcome, ReleaseRecord,
    RunExecution, RunStatus, Version,
};
use property_catalog_store_sqlite::SqliteStore;

use crate::ports::{CatalogRepository, MetadataDocumentLookup, ReleaseLookup, RunLedger};

/// SQLite-backed implementation of every collaborator contract.
///
/// Each call opens its own connection, so one value can be shared across threads.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db_path: PathBuf,
}

impl SqliteCatalog {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open the database and bring its schema up to date.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    pub fn open_store(&self) -> Result<SqliteStore> {
        let mut store = SqliteStore::open(&self.db_path)?;
        store.migrate()?;
        Ok(store)
    }
}

impl ReleaseLookup for SqliteCatalog {
    fn find_versioned_artifact(
        &self,
        coordinates: &ArtifactCoordinates,
    ) -> Result<Option<ReleaseRecord>> {
        self.open_store()?.find_release(coordinates)
    }
}

impl MetadataDocumentLookup for SqliteCatalog {
    fn get_metadata_document(&self, coordinates: &ArtifactCoordinates) -> Result<Option<String>> {
        self.open_store()?.get_metadata_document(coordinates)
    }
}

impl CatalogRepository for SqliteCatalog {
    fn load_catalog(&self, artifact: &ArtifactId) -> Result<CatalogState> {
        self.open_store()?.load_catalog_state(artifact)
    }

    fn commit(
        &self,
        artifact: &ArtifactId,
        expected_last: Option<&Version>,
        current: &Version,
        outcome: &ReconcileOutcome,
    ) -> Result<()> {
        self.open_store()?.commit_reconciliation(artifact, expected_last, current, outcome)
    }
}

impl RunLedger for SqliteCatalog {
    fn begin(&self, execution: &RunExecution) -> Result<Option<RunExecution>> {
        self.open_store()?.begin_run_execution(execution)
    }

    fn finish(
        &self,
        execution_id: ExecutionId,
        status: RunStatus,
        message: Option<&str>,
    ) -> Result<()> {
        self.open_store()?.finish_run_execution(execution_id, status, message)
    }

    fn list(&self, run_name: Option<&str>) -> Result<Vec<RunExecution>> {
        self.open_store()?.list_run_executions(run_name)
    }
}
