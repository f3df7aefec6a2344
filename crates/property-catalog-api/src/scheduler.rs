use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use property_catalog_core::{ExecutionId, RunExecution, RunParameters, RunStatus};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::ports::{JobScheduler, RunLedger, RunOutcome, RunReceipt, RunRequestError, RunUnit};

/// Stable identity of a run: the run name plus its canonical (key-sorted) parameters.
#[must_use]
pub fn run_key(run_name: &str, params: &RunParameters) -> String {
    let mut hasher = Sha256::new();
    hasher.update(run_name.as_bytes());
    for (key, value) in params {
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    let digest_hex = format!("{:x}", hasher.finalize());
    format!("run_{}", &digest_hex[..32])
}

/// Run ledger kept in process memory; replay protection ends with the process.
#[derive(Debug, Default)]
pub struct InMemoryRunLedger {
    executions: Mutex<Vec<RunExecution>>,
}

impl InMemoryRunLedger {
    fn executions(&self) -> Result<std::sync::MutexGuard<'_, Vec<RunExecution>>> {
        self.executions.lock().map_err(|_| anyhow!("run ledger lock poisoned"))
    }
}

impl RunLedger for InMemoryRunLedger {
    fn begin(&self, execution: &RunExecution) -> Result<Option<RunExecution>> {
        let mut executions = self.executions()?;
        let latest = executions.iter().rev().find(|run| run.run_key == execution.run_key);
        if let Some(latest) = latest {
            if matches!(latest.status, RunStatus::Running | RunStatus::Completed) {
                return Ok(Some(latest.clone()));
            }
        }
        executions.push(execution.clone());
        Ok(None)
    }

    fn finish(
        &self,
        execution_id: ExecutionId,
        status: RunStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let mut executions = self.executions()?;
        let execution = executions
            .iter_mut()
            .find(|run| run.execution_id == execution_id)
            .ok_or_else(|| anyhow!("run execution {execution_id} not found"))?;
        execution.status = status;
        execution.message = message.map(str::to_string);
        execution.finished_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    fn list(&self, run_name: Option<&str>) -> Result<Vec<RunExecution>> {
        Ok(self
            .executions()?
            .iter()
            .rev()
            .filter(|run| run_name.is_none() || run_name == Some(run.run_name.as_str()))
            .cloned()
            .collect())
    }
}

/// Runs registered units synchronously on the caller's thread.
///
/// At most one execution per run key is in flight; a run key whose latest execution
/// completed is never started again.
pub struct LocalScheduler {
    units: BTreeMap<String, Arc<dyn RunUnit>>,
    ledger: Arc<dyn RunLedger>,
    in_flight: Mutex<BTreeSet<String>>,
}

struct InFlight<'a> {
    keys: &'a Mutex<BTreeSet<String>>,
    run_key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.remove(&self.run_key);
        }
    }
}

impl LocalScheduler {
    #[must_use]
    pub fn new(ledger: Arc<dyn RunLedger>) -> Self {
        Self { units: BTreeMap::new(), ledger, in_flight: Mutex::new(BTreeSet::new()) }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: Arc<dyn RunUnit>) -> Self {
        self.units.insert(unit.name().to_string(), unit);
        self
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn RunLedger> {
        &self.ledger
    }

    fn claim(&self, run_name: &str, run_key: &str) -> Result<InFlight<'_>, RunRequestError> {
        let mut keys = self
            .in_flight
            .lock()
            .map_err(|_| RunRequestError::Ledger("in-flight set lock poisoned".to_string()))?;
        if !keys.insert(run_key.to_string()) {
            return Err(RunRequestError::AlreadyRunning {
                run_name: run_name.to_string(),
                run_key: run_key.to_string(),
            });
        }
        Ok(InFlight { keys: &self.in_flight, run_key: run_key.to_string() })
    }
}

impl JobScheduler for LocalScheduler {
    fn start(&self, run_name: &str, params: RunParameters) -> Result<RunReceipt, RunRequestError> {
        let unit = self
            .units
            .get(run_name)
            .ok_or_else(|| RunRequestError::UnknownRun(run_name.to_string()))?;
        unit.validate(&params)?;

        let run_key = run_key(run_name, &params);
        let _in_flight = self.claim(run_name, &run_key).inspect_err(|err| {
            tracing::warn!(run_name, run_key = %run_key, error = %err, "run request rejected");
        })?;

        let execution = RunExecution {
            execution_id: ExecutionId::new(),
            run_key: run_key.clone(),
            run_name: run_name.to_string(),
            params: params.clone(),
            status: RunStatus::Running,
            message: None,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
        };

        let blocking = self
            .ledger
            .begin(&execution)
            .map_err(|err| RunRequestError::Ledger(format!("{err:#}")))?;
        if let Some(blocking) = blocking {
            let rejection = match blocking.status {
                RunStatus::Completed => RunRequestError::AlreadyCompleted {
                    run_name: run_name.to_string(),
                    run_key: run_key.clone(),
                    execution_id: blocking.execution_id,
                },
                RunStatus::Running => RunRequestError::AlreadyRunning {
                    run_name: run_name.to_string(),
                    run_key: run_key.clone(),
                },
                RunStatus::Failed => RunRequestError::Ledger(format!(
                    "ledger reported failed execution {} as blocking run key {run_key}",
                    blocking.execution_id
                )),
            };
            tracing::warn!(
                run_name,
                run_key = %run_key,
                error = %rejection,
                "run request rejected"
            );
            return Err(rejection);
        }

        tracing::info!(
            run_name,
            run_key = %run_key,
            execution_id = %execution.execution_id,
            "run started"
        );

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| unit.run(&params))) {
            Ok(outcome) => outcome,
            Err(_) => RunOutcome::Failed { message: format!("run {run_name} panicked") },
        };
        let status = outcome.status();
        let message = outcome.message();

        if let Err(err) = self.ledger.finish(execution.execution_id, status, Some(&message)) {
            let error = format!("{err:#}");
            tracing::warn!(
                execution_id = %execution.execution_id,
                %error,
                "failed to record run outcome"
            );
            return Err(RunRequestError::Ledger(format!(
                "run {run_name} finished as {status} but its outcome could not be recorded \
                 (execution {}): {error}",
                execution.execution_id
            )));
        }

        tracing::info!(
            run_name,
            execution_id = %execution.execution_id,
            status = %status,
            %message,
            "run finished"
        );

        Ok(RunReceipt {
            execution_id: execution.execution_id,
            run_name: run_name.to_string(),
            run_key,
            params,
            outcome,
        })
    }
}
