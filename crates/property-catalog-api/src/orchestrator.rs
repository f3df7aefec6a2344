use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use property_catalog_core::{reconcile, ArtifactCoordinates, MetadataDocument, RunParameters};

use crate::config::OrchestratorConfig;
use crate::ports::{
    CatalogRepository, MetadataDocumentLookup, ReleaseLookup, ReleaseReport, RunOutcome,
    RunRequestError, RunUnit,
};

/// Name under which the release orchestrator is registered with a scheduler.
pub const RELEASE_RUN_NAME: &str = "process-artifact-release";
/// Run parameter carrying `group:artifact:version` coordinates.
pub const ARTIFACT_PARAM: &str = "artifact";

/// Folds one release's metadata document into its artifact's catalog.
#[derive(Clone)]
pub struct ReleaseOrchestrator {
    releases: Arc<dyn ReleaseLookup>,
    documents: Arc<dyn MetadataDocumentLookup>,
    catalog: Arc<dyn CatalogRepository>,
    config: OrchestratorConfig,
}

impl ReleaseOrchestrator {
    #[must_use]
    pub fn new(
        releases: Arc<dyn ReleaseLookup>,
        documents: Arc<dyn MetadataDocumentLookup>,
        catalog: Arc<dyn CatalogRepository>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { releases, documents, catalog, config }
    }

    fn process(&self, coordinates: &ArtifactCoordinates) -> Result<ReleaseReport> {
        self.releases.find_versioned_artifact(coordinates)?.ok_or_else(|| {
            anyhow!("Can not find artifact version with following coordinates: {coordinates}")
        })?;

        let body = self.documents.get_metadata_document(coordinates)?.ok_or_else(|| {
            anyhow!(
                "Could not find uploaded artifact property metadata for coordinates: {coordinates}"
            )
        })?;

        let extracted = MetadataDocument::from_json(&body)
            .and_then(MetadataDocument::extract)
            .with_context(|| {
                format!("Could not read artifact property metadata for coordinates: {coordinates}")
            })?;

        let artifact = coordinates.artifact_id();
        let state = self.catalog.load_catalog(&artifact)?;

        if self.config.enforce_release_order {
            if let Some(last) = &state.last_version {
                if coordinates.version <= *last {
                    return Err(anyhow!(
                        "Release {coordinates} is not newer than last processed version {last}"
                    ));
                }
            }
        }

        let outcome = reconcile(&state.entries, extracted, &coordinates.version);
        self.catalog
            .commit(&artifact, state.last_version.as_ref(), &coordinates.version, &outcome)
            .with_context(|| format!("Could not persist catalog for coordinates: {coordinates}"))?;

        Ok(ReleaseReport {
            coordinates: coordinates.clone(),
            summary: outcome.summary(),
            changes: outcome.changes,
        })
    }
}

/// Pull the release coordinates out of run parameters.
///
/// # Errors
/// Returns [`RunRequestError::InvalidRunParameters`] when the `artifact` key is missing, blank,
/// or not `group:artifact:version`.
pub fn artifact_from_params(
    params: &RunParameters,
) -> Result<ArtifactCoordinates, RunRequestError> {
    let raw = params
        .get(ARTIFACT_PARAM)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            RunRequestError::InvalidRunParameters(format!(
                "missing required run parameter `{ARTIFACT_PARAM}`"
            ))
        })?;

    ArtifactCoordinates::parse(raw).map_err(|err| {
        RunRequestError::InvalidRunParameters(format!("parameter `{ARTIFACT_PARAM}`: {err}"))
    })
}

impl RunUnit for ReleaseOrchestrator {
    fn name(&self) -> &str {
        RELEASE_RUN_NAME
    }

    fn validate(&self, params: &RunParameters) -> Result<(), RunRequestError> {
        artifact_from_params(params).map(|_| ())
    }

    fn run(&self, params: &RunParameters) -> RunOutcome {
        let coordinates = match artifact_from_params(params) {
            Ok(coordinates) => coordinates,
            Err(err) => return RunOutcome::Failed { message: err.to_string() },
        };

        match self.process(&coordinates) {
            Ok(report) => {
                tracing::info!(
                    coordinates = %coordinates,
                    added = report.summary.added,
                    unchanged = report.summary.unchanged,
                    changed = report.summary.changed,
                    removed = report.summary.removed,
                    "release folded into catalog"
                );
                RunOutcome::Completed { report }
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(coordinates = %coordinates, %message, "release processing failed");
                RunOutcome::Failed { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use property_catalog_core::{
        ArtifactId, CatalogState, ReconcileOutcome, ReleaseRecord, RunStatus, Version,
    };
    use time::OffsetDateTime;

    use super::*;

    #[derive(Default)]
    struct MemoryCatalog {
        releases: Mutex<BTreeMap<String, ReleaseRecord>>,
        documents: Mutex<BTreeMap<String, String>>,
        catalogs: Mutex<BTreeMap<ArtifactId, CatalogState>>,
        fail_commits: bool,
    }

    impl MemoryCatalog {
        fn with_release(&self, raw: &str, document: Option<&str>) -> Result<()> {
            let coordinates = ArtifactCoordinates::parse(raw)?;
            self.releases.lock().map_err(|_| anyhow!("poisoned"))?.insert(
                coordinates.format(),
                ReleaseRecord {
                    entity_id: format!("entity-{raw}"),
                    coordinates: coordinates.clone(),
                    registered_at: OffsetDateTime::UNIX_EPOCH,
                },
            );
            if let Some(body) = document {
                self.documents
                    .lock()
                    .map_err(|_| anyhow!("poisoned"))?
                    .insert(coordinates.format(), body.to_string());
            }
            Ok(())
        }

        fn state(&self, raw: &str) -> Result<CatalogState> {
            let artifact = ArtifactCoordinates::parse(raw)?.artifact_id();
            Ok(self
                .catalogs
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .get(&artifact)
                .cloned()
                .unwrap_or_default())
        }
    }

    impl ReleaseLookup for MemoryCatalog {
        fn find_versioned_artifact(
            &self,
            coordinates: &ArtifactCoordinates,
        ) -> Result<Option<ReleaseRecord>> {
            Ok(self
                .releases
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .get(&coordinates.format())
                .cloned())
        }
    }

    impl MetadataDocumentLookup for MemoryCatalog {
        fn get_metadata_document(
            &self,
            coordinates: &ArtifactCoordinates,
        ) -> Result<Option<String>> {
            Ok(self
                .documents
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .get(&coordinates.format())
                .cloned())
        }
    }

    impl CatalogRepository for MemoryCatalog {
        fn load_catalog(&self, artifact: &ArtifactId) -> Result<CatalogState> {
            Ok(self
                .catalogs
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .get(artifact)
                .cloned()
                .unwrap_or_default())
        }

        fn commit(
            &self,
            artifact: &ArtifactId,
            _expected_last: Option<&Version>,
            current: &Version,
            outcome: &ReconcileOutcome,
        ) -> Result<()> {
            if self.fail_commits {
                return Err(anyhow!("disk full"));
            }
            self.catalogs.lock().map_err(|_| anyhow!("poisoned"))?.insert(
                artifact.clone(),
                CatalogState {
                    entries: outcome.catalog.clone(),
                    last_version: Some(current.clone()),
                },
            );
            Ok(())
        }
    }

    fn orchestrator(
        catalog: &Arc<MemoryCatalog>,
        enforce_release_order: bool,
    ) -> ReleaseOrchestrator {
        ReleaseOrchestrator::new(
            catalog.clone(),
            catalog.clone(),
            catalog.clone(),
            OrchestratorConfig { enforce_release_order },
        )
    }

    fn params(raw: &str) -> RunParameters {
        RunParameters::from([(ARTIFACT_PARAM.to_string(), raw.to_string())])
    }

    fn document(properties: &[(&str, &str)]) -> String {
        let values = properties
            .iter()
            .map(|(name, description)| {
                serde_json::json!({
                    "dataType": "STRING",
                    "type": "SCALAR",
                    "typeName": "java.lang.String",
                    "name": name,
                    "description": description,
                })
            })
            .collect::<Vec<_>>();
        serde_json::Value::Array(values).to_string()
    }

    fn failure_message(outcome: RunOutcome) -> String {
        match outcome {
            RunOutcome::Failed { message } => message,
            RunOutcome::Completed { report } => panic!("expected failure, got {report:?}"),
        }
    }

    fn completed_report(outcome: RunOutcome) -> ReleaseReport {
        match outcome {
            RunOutcome::Completed { report } => report,
            RunOutcome::Failed { message } => panic!("expected completion, got {message}"),
        }
    }

    // Test IDs: TORC-001
    #[test]
    fn missing_artifact_parameter_is_rejected_by_name() {
        let catalog = Arc::new(MemoryCatalog::default());
        let unit = orchestrator(&catalog, true);

        for bad in [RunParameters::new(), params("   ")] {
            match unit.validate(&bad) {
                Err(RunRequestError::InvalidRunParameters(message)) => {
                    assert!(message.contains("`artifact`"), "{message}");
                }
                other => panic!("expected invalid parameters, got {other:?}"),
            }
        }

        assert!(matches!(
            unit.validate(&params("org.example:web")),
            Err(RunRequestError::InvalidRunParameters(_))
        ));
    }

    // Test IDs: TORC-002
    #[test]
    fn missing_release_fails_with_coordinates() {
        let catalog = Arc::new(MemoryCatalog::default());
        let outcome = orchestrator(&catalog, true).run(&params("org.example:web:1.0.0"));

        assert_eq!(outcome.status(), RunStatus::Failed);
        assert_eq!(
            failure_message(outcome),
            "Can not find artifact version with following coordinates: org.example:web:1.0.0"
        );
    }

    // Test IDs: TORC-003
    #[test]
    fn missing_document_fails_with_distinct_message() -> Result<()> {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.with_release("org.example:web:1.0.0", None)?;

        let message =
            failure_message(orchestrator(&catalog, true).run(&params("org.example:web:1.0.0")));
        assert_eq!(
            message,
            "Could not find uploaded artifact property metadata for coordinates: org.example:web:1.0.0"
        );
        Ok(())
    }

    // Test IDs: TORC-004
    #[test]
    fn unreadable_document_fails_without_touching_catalog() -> Result<()> {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.with_release("org.example:web:1.0.0", Some("{not json"))?;

        let message =
            failure_message(orchestrator(&catalog, true).run(&params("org.example:web:1.0.0")));
        assert!(message.starts_with(
            "Could not read artifact property metadata for coordinates: org.example:web:1.0.0"
        ));
        assert_eq!(catalog.state("org.example:web:1.0.0")?, CatalogState::default());
        Ok(())
    }

    // Test IDs: TORC-005
    #[test]
    fn three_releases_reconcile_end_to_end() -> Result<()> {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.with_release(
            "org.example:web:1.0.0",
            Some(&document(&[("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")])),
        )?;
        catalog.with_release(
            "org.example:web:1.1.0",
            Some(&document(&[("A", "a"), ("B", "b2"), ("C", "c"), ("E", "e")])),
        )?;
        catalog.with_release(
            "org.example:web:2.0.0",
            Some(&document(&[("A", "a"), ("B", "b2"), ("E", "e2"), ("F", "f")])),
        )?;

        let unit = orchestrator(&catalog, true);
        let first = completed_report(unit.run(&params("org.example:web:1.0.0")));
        assert_eq!(first.summary.added, 4);
        completed_report(unit.run(&params("org.example:web:1.1.0")));
        let third = completed_report(unit.run(&params("org.example:web:2.0.0")));
        assert_eq!(third.summary.removed, 1);

        let state = catalog.state("org.example:web:2.0.0")?;
        let streaks = state
            .entries
            .values()
            .map(|entry| {
                (
                    entry.name.as_str(),
                    entry.occurrences,
                    entry.first_seen.original().to_string(),
                    entry.last_seen.original().to_string(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            streaks,
            vec![
                ("A", 3, "1.0.0".to_string(), "2.0.0".to_string()),
                ("B", 2, "1.1.0".to_string(), "2.0.0".to_string()),
                ("E", 1, "2.0.0".to_string(), "2.0.0".to_string()),
                ("F", 1, "2.0.0".to_string(), "2.0.0".to_string()),
            ]
        );
        Ok(())
    }

    // Test IDs: TORC-006
    #[test]
    fn out_of_order_release_is_failed_when_guard_enabled() -> Result<()> {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.with_release("org.example:web:2.0.0", Some(&document(&[("A", "a")])))?;
        catalog.with_release("org.example:web:1.0.0", Some(&document(&[("B", "b")])))?;

        let unit = orchestrator(&catalog, true);
        completed_report(unit.run(&params("org.example:web:2.0.0")));
        let message = failure_message(unit.run(&params("org.example:web:1.0.0")));
        assert_eq!(
            message,
            "Release org.example:web:1.0.0 is not newer than last processed version 2.0.0"
        );

        let state = catalog.state("org.example:web:2.0.0")?;
        assert_eq!(state.entries.keys().map(String::as_str).collect::<Vec<_>>(), vec!["A"]);
        Ok(())
    }

    // Test IDs: TORC-007
    #[test]
    fn out_of_order_release_is_processed_when_guard_disabled() -> Result<()> {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.with_release("org.example:web:2.0.0", Some(&document(&[("A", "a")])))?;
        catalog.with_release("org.example:web:1.0.0", Some(&document(&[("A", "a")])))?;

        let unit = orchestrator(&catalog, false);
        completed_report(unit.run(&params("org.example:web:2.0.0")));
        completed_report(unit.run(&params("org.example:web:1.0.0")));

        let state = catalog.state("org.example:web:2.0.0")?;
        let entry = state.entries.get("A").ok_or_else(|| anyhow!("entry A missing"))?;
        assert_eq!(entry.occurrences, 2);
        assert_eq!(state.last_version.map(|v| v.to_string()), Some("1.0.0".to_string()));
        Ok(())
    }

    // Test IDs: TORC-008
    #[test]
    fn persistence_failure_is_reported_as_failed_run() -> Result<()> {
        let catalog = Arc::new(MemoryCatalog {
            fail_commits: true,
            ..MemoryCatalog::default()
        });
        catalog.with_release("org.example:web:1.0.0", Some(&document(&[("A", "a")])))?;

        let message =
            failure_message(orchestrator(&catalog, true).run(&params("org.example:web:1.0.0")));
        assert_eq!(
            message,
            "Could not persist catalog for coordinates: org.example:web:1.0.0: disk full"
        );
        Ok(())
    }
}
