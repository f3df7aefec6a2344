use std::sync::Arc;

use property_catalog_core::{ArtifactCoordinates, RunParameters};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{ARTIFACT_PARAM, RELEASE_RUN_NAME};
use crate::ports::{JobScheduler, RunReceipt, RunRequestError};

/// Notification that a new artifact version was released.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReleased {
    pub entity_id: String,
    pub coordinates: ArtifactCoordinates,
}

/// Turns release notifications into release-processing run requests.
#[derive(Clone)]
pub struct RunDispatcher {
    scheduler: Arc<dyn JobScheduler>,
}

impl RunDispatcher {
    #[must_use]
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { scheduler }
    }

    /// Request one processing run for the released coordinates.
    ///
    /// # Errors
    /// Returns the scheduler's rejection unchanged; no retry is attempted.
    pub fn on_released(&self, event: &ArtifactReleased) -> Result<RunReceipt, RunRequestError> {
        tracing::info!(
            entity_id = %event.entity_id,
            coordinates = %event.coordinates,
            "artifact released"
        );

        let params =
            RunParameters::from([(ARTIFACT_PARAM.to_string(), event.coordinates.format())]);
        self.scheduler.start(RELEASE_RUN_NAME, params).inspect_err(|err| {
            tracing::warn!(
                entity_id = %event.entity_id,
                coordinates = %event.coordinates,
                error = %err,
                "release dispatch rejected"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use property_catalog_core::ExecutionId;

    use super::*;
    use crate::ports::RunOutcome;

    /// Records requests and answers with a fixed rejection or a failed outcome.
    struct RecordingScheduler {
        requests: Mutex<Vec<(String, RunParameters)>>,
        reject_with: Option<RunRequestError>,
    }

    impl JobScheduler for RecordingScheduler {
        fn start(
            &self,
            run_name: &str,
            params: RunParameters,
        ) -> Result<RunReceipt, RunRequestError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((run_name.to_string(), params.clone()));
            }
            if let Some(err) = &self.reject_with {
                return Err(err.clone());
            }
            Ok(RunReceipt {
                execution_id: ExecutionId::new(),
                run_name: run_name.to_string(),
                run_key: "run_test".to_string(),
                params,
                outcome: RunOutcome::Failed { message: "not executed".to_string() },
            })
        }
    }

    fn event() -> ArtifactReleased {
        match ArtifactCoordinates::parse("org.example:web:2024.01-rc") {
            Ok(coordinates) => ArtifactReleased { entity_id: "rel-42".to_string(), coordinates },
            Err(err) => panic!("fixture coordinates should parse: {err}"),
        }
    }

    // Test IDs: TDSP-001
    #[test]
    fn dispatcher_requests_release_run_with_formatted_coordinates() {
        let scheduler =
            Arc::new(RecordingScheduler { requests: Mutex::new(Vec::new()), reject_with: None });
        let dispatcher = RunDispatcher::new(scheduler.clone());

        let receipt = match dispatcher.on_released(&event()) {
            Ok(receipt) => receipt,
            Err(err) => panic!("dispatch should be accepted: {err}"),
        };
        assert_eq!(receipt.run_name, RELEASE_RUN_NAME);

        let requests = match scheduler.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(_) => panic!("requests lock poisoned"),
        };
        assert_eq!(
            requests,
            vec![(
                RELEASE_RUN_NAME.to_string(),
                RunParameters::from([(
                    "artifact".to_string(),
                    "org.example:web:2024.01-rc".to_string()
                )]),
            )]
        );
    }

    // Test IDs: TDSP-002
    #[test]
    fn dispatcher_surfaces_scheduler_rejection_unchanged() {
        let rejection = RunRequestError::AlreadyRunning {
            run_name: RELEASE_RUN_NAME.to_string(),
            run_key: "run_abc".to_string(),
        };
        let scheduler = Arc::new(RecordingScheduler {
            requests: Mutex::new(Vec::new()),
            reject_with: Some(rejection.clone()),
        });

        let result = RunDispatcher::new(scheduler).on_released(&event());
        assert_eq!(result, Err(rejection));
    }

    // Test IDs: TDSP-003
    #[test]
    fn notification_uses_camel_case_json() -> Result<(), serde_json::Error> {
        let parsed: ArtifactReleased = serde_json::from_str(
            r#"{"entityId":"rel-1","coordinates":"org.example:web:1.0.0"}"#,
        )?;
        assert_eq!(parsed.entity_id, "rel-1");
        assert_eq!(parsed.coordinates.format(), "org.example:web:1.0.0");
        Ok(())
    }
}
