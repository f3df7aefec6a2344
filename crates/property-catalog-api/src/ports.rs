//! Collaborator contracts the orchestration layer is written against.

use anyhow::Result;
use property_catalog_core::{
    ArtifactCoordinates, ArtifactId, CatalogChange, CatalogState, ChangeSummary, ExecutionId,
    ReconcileOutcome, ReleaseRecord, RunExecution, RunParameters, RunStatus, Version,
};
use serde::{Deserialize, Serialize};

pub trait ReleaseLookup: Send + Sync {
    /// # Errors
    /// Returns an error when the backing store cannot be queried.
    fn find_versioned_artifact(
        &self,
        coordinates: &ArtifactCoordinates,
    ) -> Result<Option<ReleaseRecord>>;
}

pub trait MetadataDocumentLookup: Send + Sync {
    /// Raw JSON body of the document uploaded for a release.
    ///
    /// # Errors
    /// Returns an error when the backing store cannot be queried.
    fn get_metadata_document(&self, coordinates: &ArtifactCoordinates) -> Result<Option<String>>;
}

pub trait CatalogRepository: Send + Sync {
    /// # Errors
    /// Returns an error when the catalog cannot be read.
    fn load_catalog(&self, artifact: &ArtifactId) -> Result<CatalogState>;

    /// Persist `outcome` as the artifact's catalog at `current`, provided the last processed
    /// version is still `expected_last`.
    ///
    /// # Errors
    /// Returns an error when the write fails or the catalog moved underneath the caller.
    fn commit(
        &self,
        artifact: &ArtifactId,
        expected_last: Option<&Version>,
        current: &Version,
        outcome: &ReconcileOutcome,
    ) -> Result<()>;
}

pub trait RunLedger: Send + Sync {
    /// Record `execution` as started unless the latest execution with the same run key is
    /// still running or has completed; that execution is returned instead.
    ///
    /// # Errors
    /// Returns an error when the ledger cannot be read or written.
    fn begin(&self, execution: &RunExecution) -> Result<Option<RunExecution>>;

    /// # Errors
    /// Returns an error when the execution is unknown or the ledger cannot be written.
    fn finish(
        &self,
        execution_id: ExecutionId,
        status: RunStatus,
        message: Option<&str>,
    ) -> Result<()>;

    /// # Errors
    /// Returns an error when the ledger cannot be read.
    fn list(&self, run_name: Option<&str>) -> Result<Vec<RunExecution>>;
}

/// A named unit of work the scheduler can start.
pub trait RunUnit: Send + Sync {
    fn name(&self) -> &str;

    /// Reject parameters before anything is recorded.
    ///
    /// # Errors
    /// Returns [`RunRequestError::InvalidRunParameters`] for unusable parameters.
    fn validate(&self, params: &RunParameters) -> Result<(), RunRequestError>;

    fn run(&self, params: &RunParameters) -> RunOutcome;
}

pub trait JobScheduler: Send + Sync {
    /// Start `run_name` with `params` and wait for its terminal outcome.
    ///
    /// # Errors
    /// Returns a [`RunRequestError`] when the request is rejected; nothing runs in that case.
    fn start(&self, run_name: &str, params: RunParameters) -> Result<RunReceipt, RunRequestError>;
}

/// Synchronous rejection of a run request.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RunRequestError {
    #[error("unknown run: {0}")]
    UnknownRun(String),
    #[error("run {run_name} is already running ({run_key})")]
    AlreadyRunning { run_name: String, run_key: String },
    #[error("run {run_name} already completed ({run_key}, execution {execution_id})")]
    AlreadyCompleted { run_name: String, run_key: String, execution_id: ExecutionId },
    #[error("invalid run parameters: {0}")]
    InvalidRunParameters(String),
    #[error("run ledger unavailable: {0}")]
    Ledger(String),
}

/// Result of folding one release into its artifact's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseReport {
    pub coordinates: ArtifactCoordinates,
    pub summary: ChangeSummary,
    pub changes: Vec<CatalogChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { report: ReleaseReport },
    Failed { message: String },
}

impl RunOutcome {
    #[must_use]
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed { .. } => RunStatus::Completed,
            Self::Failed { .. } => RunStatus::Failed,
        }
    }

    /// Operator-facing text stored alongside the terminal status.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Completed { report } => {
                let summary = report.summary;
                format!(
                    "added={} unchanged={} changed={} removed={}",
                    summary.added, summary.unchanged, summary.changed, summary.removed
                )
            }
            Self::Failed { message } => message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReceipt {
    pub execution_id: ExecutionId,
    pub run_name: String,
    pub run_key: String,
    pub params: RunParameters,
    pub outcome: RunOutcome,
}
