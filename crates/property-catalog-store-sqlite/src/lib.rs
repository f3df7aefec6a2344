use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use property_catalog_core::{
    ArtifactCoordinates, ArtifactId, CatalogEntry, CatalogState, ExecutionId, Fingerprint,
    PropertyDefinition, ReconcileOutcome, ReleaseRecord, RunExecution, RunParameters, RunStatus,
    Version, FINGERPRINT_FORMAT,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 2;
const FINGERPRINT_FORMAT_KEY: &str = "fingerprint_format";

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS catalog_meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS releases (
  group_id TEXT NOT NULL,
  artifact_id TEXT NOT NULL,
  version TEXT NOT NULL,
  version_scheme TEXT NOT NULL CHECK (version_scheme IN ('semantic','calendar','unknown')),
  entity_id TEXT NOT NULL UNIQUE,
  registered_at TEXT NOT NULL,
  PRIMARY KEY (group_id, artifact_id, version)
);

CREATE TABLE IF NOT EXISTS metadata_documents (
  group_id TEXT NOT NULL,
  artifact_id TEXT NOT NULL,
  version TEXT NOT NULL,
  document_json TEXT NOT NULL,
  sha256 TEXT NOT NULL CHECK (length(sha256) = 64),
  uploaded_at TEXT NOT NULL,
  PRIMARY KEY (group_id, artifact_id, version)
);

CREATE TABLE IF NOT EXISTS catalog_entries (
  group_id TEXT NOT NULL,
  artifact_id TEXT NOT NULL,
  name TEXT NOT NULL,
  fingerprint TEXT NOT NULL CHECK (length(fingerprint) = 64),
  occurrences INTEGER NOT NULL CHECK (occurrences >= 1),
  first_seen TEXT NOT NULL,
  last_seen TEXT NOT NULL,
  definition_json TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  PRIMARY KEY (group_id, artifact_id, name)
);

CREATE TABLE IF NOT EXISTS artifact_progress (
  group_id TEXT NOT NULL,
  artifact_id TEXT NOT NULL,
  last_version TEXT NOT NULL,
  processed_at TEXT NOT NULL,
  PRIMARY KEY (group_id, artifact_id)
);
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS run_executions (
  execution_id TEXT PRIMARY KEY,
  run_key TEXT NOT NULL,
  run_name TEXT NOT NULL,
  params_json TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('running','completed','failed')),
  message TEXT,
  started_at TEXT NOT NULL,
  finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_run_executions_key ON run_executions(run_key, started_at);
CREATE INDEX IF NOT EXISTS idx_run_executions_name ON run_executions(run_name);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
    pub fingerprint_format: Option<String>,
}

/// Receipt for one stored metadata document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataUpload {
    pub coordinates: ArtifactCoordinates,
    pub sha256: String,
    pub bytes: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

impl SqliteStore {
    /// Open a SQLite-backed catalog store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
            fingerprint_format: stored_fingerprint_format(&self.conn)?,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when a migration step fails or the database pins a different
    /// fingerprint format.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            tx.execute(
                "INSERT OR IGNORE INTO catalog_meta(key, value) VALUES (?1, ?2)",
                params![FINGERPRINT_FORMAT_KEY, FINGERPRINT_FORMAT],
            )
            .context("failed to pin fingerprint format")?;
            record_schema_version(&tx, 1)?;
            tx.commit().context("failed to commit migration v1")?;
            version = 1;
        }

        if version < 2 {
            let tx = self.conn.transaction().context("failed to start migration v2 transaction")?;
            tx.execute_batch(MIGRATION_002_SQL).context("failed to apply migration v2")?;
            record_schema_version(&tx, 2)?;
            tx.commit().context("failed to commit migration v2")?;
            version = 2;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        ensure_fingerprint_format(&self.conn)
    }

    /// Register a release. Registering the same coordinates twice returns the first record.
    ///
    /// # Errors
    /// Returns an error when the insert or read-back fails.
    pub fn register_release(
        &mut self,
        coordinates: &ArtifactCoordinates,
        entity_id: Option<&str>,
    ) -> Result<ReleaseRecord> {
        let entity_id = entity_id.map_or_else(|| Ulid::new().to_string(), str::to_string);

        self.conn
            .execute(
                "INSERT OR IGNORE INTO releases(
                    group_id, artifact_id, version, version_scheme, entity_id, registered_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    coordinates.group,
                    coordinates.artifact,
                    coordinates.version.original(),
                    coordinates.version.scheme(),
                    entity_id,
                    now_rfc3339()?,
                ],
            )
            .with_context(|| format!("failed to register release {coordinates}"))?;

        self.find_release(coordinates)?
            .ok_or_else(|| anyhow!("release {coordinates} missing after registration"))
    }

    /// # Errors
    /// Returns an error when the lookup fails or a stored row cannot be decoded.
    pub fn find_release(&self, coordinates: &ArtifactCoordinates) -> Result<Option<ReleaseRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT entity_id, registered_at FROM releases
                 WHERE group_id = ?1 AND artifact_id = ?2 AND version = ?3",
                params![coordinates.group, coordinates.artifact, coordinates.version.original()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .with_context(|| format!("failed to look up release {coordinates}"))?;

        match row {
            Some((entity_id, registered_at)) => Ok(Some(ReleaseRecord {
                entity_id,
                coordinates: coordinates.clone(),
                registered_at: parse_rfc3339(&registered_at)?,
            })),
            None => Ok(None),
        }
    }

    /// List the registered releases of one artifact in ascending version order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_releases(&self, artifact: &ArtifactId) -> Result<Vec<ReleaseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT version, entity_id, registered_at FROM releases
             WHERE group_id = ?1 AND artifact_id = ?2",
        )?;
        let mut rows = stmt.query(params![artifact.group, artifact.artifact])?;
        let mut releases = Vec::new();

        while let Some(row) = rows.next()? {
            let version: String = row.get(0)?;
            let registered_at: String = row.get(2)?;
            releases.push(ReleaseRecord {
                entity_id: row.get(1)?,
                coordinates: ArtifactCoordinates {
                    group: artifact.group.clone(),
                    artifact: artifact.artifact.clone(),
                    version: parse_version(&version)?,
                },
                registered_at: parse_rfc3339(&registered_at)?,
            });
        }

        releases.sort_by(|lhs, rhs| lhs.coordinates.version.cmp(&rhs.coordinates.version));
        Ok(releases)
    }

    /// Store the raw metadata document of a release, replacing any earlier upload.
    ///
    /// # Errors
    /// Returns an error when the write fails.
    pub fn put_metadata_document(
        &mut self,
        coordinates: &ArtifactCoordinates,
        body: &str,
    ) -> Result<MetadataUpload> {
        let uploaded_at = OffsetDateTime::now_utc();
        let digest = sha256_hex(body.as_bytes());

        self.conn
            .execute(
                "INSERT INTO metadata_documents(
                    group_id, artifact_id, version, document_json, sha256, uploaded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(group_id, artifact_id, version) DO UPDATE SET
                    document_json = excluded.document_json,
                    sha256 = excluded.sha256,
                    uploaded_at = excluded.uploaded_at",
                params![
                    coordinates.group,
                    coordinates.artifact,
                    coordinates.version.original(),
                    body,
                    digest,
                    rfc3339(uploaded_at)?,
                ],
            )
            .with_context(|| format!("failed to store metadata document for {coordinates}"))?;

        Ok(MetadataUpload {
            coordinates: coordinates.clone(),
            sha256: digest,
            bytes: body.len(),
            uploaded_at,
        })
    }

    /// Fetch the raw metadata document of a release.
    ///
    /// # Errors
    /// Returns an error when the lookup fails or the stored digest no longer matches the body.
    pub fn get_metadata_document(
        &self,
        coordinates: &ArtifactCoordinates,
    ) -> Result<Option<String>> {
        let row = self
            .conn
            .query_row(
                "SELECT document_json, sha256 FROM metadata_documents
                 WHERE group_id = ?1 AND artifact_id = ?2 AND version = ?3",
                params![coordinates.group, coordinates.artifact, coordinates.version.original()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .with_context(|| format!("failed to look up metadata document for {coordinates}"))?;

        match row {
            Some((body, digest)) => {
                if sha256_hex(body.as_bytes()) != digest {
                    return Err(anyhow!("metadata document digest mismatch for {coordinates}"));
                }
                Ok(Some(body))
            }
            None => Ok(None),
        }
    }

    /// Load the current catalog of one artifact.
    ///
    /// # Errors
    /// Returns an error when the fingerprint format differs or rows cannot be decoded.
    pub fn load_catalog_state(&self, artifact: &ArtifactId) -> Result<CatalogState> {
        ensure_fingerprint_format(&self.conn)?;
        load_catalog_state(&self.conn, artifact)
    }

    /// List an artifact's catalog entries ordered by property name.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_catalog(&self, artifact: &ArtifactId) -> Result<Vec<CatalogEntry>> {
        Ok(self.load_catalog_state(artifact)?.entries.into_values().collect())
    }

    /// Persist a reconciliation outcome in one transaction.
    ///
    /// The write only succeeds while the artifact's last processed version still equals
    /// `expected_last`; a concurrent commit for the same artifact makes this call fail
    /// without changing anything.
    ///
    /// # Errors
    /// Returns an error on a concurrent modification, an invalid entry, or a failed write.
    pub fn commit_reconciliation(
        &mut self,
        artifact: &ArtifactId,
        expected_last: Option<&Version>,
        current: &Version,
        outcome: &ReconcileOutcome,
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start reconciliation transaction")?;
        ensure_fingerprint_format(&tx)?;

        let stored_last = last_processed_version(&tx, artifact)?;
        let expected_last = expected_last.map(Version::original);
        if stored_last.as_deref() != expected_last {
            return Err(anyhow!(
                "catalog for {artifact} was modified concurrently: expected last processed version {}, found {}",
                expected_last.unwrap_or("<none>"),
                stored_last.as_deref().unwrap_or("<none>")
            ));
        }

        let now = now_rfc3339()?;

        for name in outcome.removed_names() {
            tx.execute(
                "DELETE FROM catalog_entries WHERE group_id = ?1 AND artifact_id = ?2 AND name = ?3",
                params![artifact.group, artifact.artifact, name],
            )
            .with_context(|| format!("failed to delete catalog entry {name} of {artifact}"))?;
        }

        for entry in outcome.catalog.values() {
            entry
                .validate()
                .with_context(|| format!("refusing to persist catalog entry {}", entry.name))?;
            tx.execute(
                "INSERT INTO catalog_entries(
                    group_id, artifact_id, name, fingerprint, occurrences,
                    first_seen, last_seen, definition_json, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(group_id, artifact_id, name) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    occurrences = excluded.occurrences,
                    first_seen = excluded.first_seen,
                    last_seen = excluded.last_seen,
                    definition_json = excluded.definition_json,
                    updated_at = excluded.updated_at",
                params![
                    artifact.group,
                    artifact.artifact,
                    entry.name,
                    entry.fingerprint.to_hex(),
                    i64::from(entry.occurrences),
                    entry.first_seen.original(),
                    entry.last_seen.original(),
                    serde_json::to_string(&entry.definition)
                        .context("failed to serialize property definition")?,
                    now,
                ],
            )
            .with_context(|| {
                format!("failed to upsert catalog entry {} of {artifact}", entry.name)
            })?;
        }

        tx.execute(
            "INSERT INTO artifact_progress(group_id, artifact_id, last_version, processed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_id, artifact_id) DO UPDATE SET
                last_version = excluded.last_version,
                processed_at = excluded.processed_at",
            params![artifact.group, artifact.artifact, current.original(), now],
        )
        .with_context(|| format!("failed to record processed version for {artifact}"))?;

        tx.commit().context("failed to commit reconciliation transaction")?;
        Ok(())
    }

    /// Record a new execution unless the latest one for the same run key blocks it.
    ///
    /// Returns the blocking execution (still running, or completed) instead of inserting.
    ///
    /// # Errors
    /// Returns an error when the ledger cannot be read or written.
    pub fn begin_run_execution(
        &mut self,
        execution: &RunExecution,
    ) -> Result<Option<RunExecution>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start run ledger transaction")?;

        if let Some(latest) = latest_run_execution(&tx, &execution.run_key)? {
            if matches!(latest.status, RunStatus::Running | RunStatus::Completed) {
                return Ok(Some(latest));
            }
        }

        tx.execute(
            "INSERT INTO run_executions(
                execution_id, run_key, run_name, params_json, status, message, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                execution.execution_id.to_string(),
                execution.run_key,
                execution.run_name,
                serde_json::to_string(&execution.params).context("failed to serialize run params")?,
                execution.status.as_str(),
                execution.message,
                rfc3339(execution.started_at)?,
                execution.finished_at.map(rfc3339).transpose()?,
            ],
        )
        .with_context(|| format!("failed to record run execution {}", execution.execution_id))?;

        tx.commit().context("failed to commit run ledger transaction")?;
        Ok(None)
    }

    /// Mark an execution terminal.
    ///
    /// # Errors
    /// Returns an error when the status is not terminal or the execution does not exist.
    pub fn finish_run_execution(
        &mut self,
        execution_id: ExecutionId,
        status: RunStatus,
        message: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(anyhow!("cannot finish run execution {execution_id} as {status}"));
        }

        let updated = self
            .conn
            .execute(
                "UPDATE run_executions SET status = ?2, message = ?3, finished_at = ?4
                 WHERE execution_id = ?1",
                params![execution_id.to_string(), status.as_str(), message, now_rfc3339()?],
            )
            .with_context(|| format!("failed to finish run execution {execution_id}"))?;

        if updated == 0 {
            return Err(anyhow!("run execution {execution_id} not found"));
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error when the ledger cannot be read or a row cannot be decoded.
    pub fn latest_run_execution(&self, run_key: &str) -> Result<Option<RunExecution>> {
        latest_run_execution(&self.conn, run_key)
    }

    /// List executions, newest first, optionally restricted to one run name.
    ///
    /// # Errors
    /// Returns an error when the ledger cannot be read or a row cannot be decoded.
    pub fn list_run_executions(&self, run_name: Option<&str>) -> Result<Vec<RunExecution>> {
        let mut stmt = self.conn.prepare(
            "SELECT execution_id, run_key, run_name, params_json, status, message, started_at, finished_at
             FROM run_executions
             WHERE ?1 IS NULL OR run_name = ?1
             ORDER BY rowid DESC",
        )?;
        let mut rows = stmt.query(params![run_name])?;
        let mut executions = Vec::new();

        while let Some(row) = rows.next()? {
            executions.push(decode_run_execution(row)?);
        }

        Ok(executions)
    }
}

fn load_catalog_state(conn: &Connection, artifact: &ArtifactId) -> Result<CatalogState> {
    let mut stmt = conn.prepare(
        "SELECT name, fingerprint, occurrences, first_seen, last_seen, definition_json
         FROM catalog_entries
         WHERE group_id = ?1 AND artifact_id = ?2
         ORDER BY name ASC",
    )?;
    let mut rows = stmt.query(params![artifact.group, artifact.artifact])?;
    let mut entries = BTreeMap::new();

    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let fingerprint_raw: String = row.get(1)?;
        let occurrences_raw: i64 = row.get(2)?;
        let first_seen: String = row.get(3)?;
        let last_seen: String = row.get(4)?;
        let definition_json: String = row.get(5)?;

        let definition: PropertyDefinition = serde_json::from_str(&definition_json)
            .with_context(|| format!("failed to decode stored definition of {name}"))?;
        let entry = CatalogEntry {
            name: name.clone(),
            fingerprint: Fingerprint::from_hex(&fingerprint_raw)
                .with_context(|| format!("invalid stored fingerprint for {name}"))?,
            occurrences: u32::try_from(occurrences_raw)
                .with_context(|| format!("invalid stored occurrences for {name}"))?,
            first_seen: parse_version(&first_seen)?,
            last_seen: parse_version(&last_seen)?,
            definition,
        };
        entries.insert(name, entry);
    }

    Ok(CatalogState {
        entries,
        last_version: last_processed_version(conn, artifact)?
            .map(|raw| parse_version(&raw))
            .transpose()?,
    })
}

fn last_processed_version(conn: &Connection, artifact: &ArtifactId) -> Result<Option<String>> {
    conn.query_row(
        "SELECT last_version FROM artifact_progress WHERE group_id = ?1 AND artifact_id = ?2",
        params![artifact.group, artifact.artifact],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .with_context(|| format!("failed to read processed version for {artifact}"))
}

fn latest_run_execution(conn: &Connection, run_key: &str) -> Result<Option<RunExecution>> {
    let mut stmt = conn.prepare(
        "SELECT execution_id, run_key, run_name, params_json, status, message, started_at, finished_at
         FROM run_executions
         WHERE run_key = ?1
         ORDER BY rowid DESC
         LIMIT 1",
    )?;
    let mut rows = stmt.query(params![run_key])?;

    match rows.next()? {
        Some(row) => Ok(Some(decode_run_execution(row)?)),
        None => Ok(None),
    }
}

fn decode_run_execution(row: &Row<'_>) -> Result<RunExecution> {
    let execution_id_raw: String = row.get(0)?;
    let params_json: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let started_at: String = row.get(6)?;
    let finished_at: Option<String> = row.get(7)?;

    let params: RunParameters =
        serde_json::from_str(&params_json).context("failed to decode stored run params")?;

    Ok(RunExecution {
        execution_id: ExecutionId(
            Ulid::from_string(&execution_id_raw)
                .with_context(|| format!("invalid ULID: {execution_id_raw}"))?,
        ),
        run_key: row.get(1)?,
        run_name: row.get(2)?,
        params,
        status: RunStatus::parse(&status_raw)
            .ok_or_else(|| anyhow!("unknown run status: {status_raw}"))?,
        message: row.get(5)?,
        started_at: parse_rfc3339(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_rfc3339).transpose()?,
    })
}

fn stored_fingerprint_format(conn: &Connection) -> Result<Option<String>> {
    if !table_exists(conn, "catalog_meta")? {
        return Ok(None);
    }

    conn.query_row(
        "SELECT value FROM catalog_meta WHERE key = ?1",
        params![FINGERPRINT_FORMAT_KEY],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .context("failed to read fingerprint format")
}

fn ensure_fingerprint_format(conn: &Connection) -> Result<()> {
    match stored_fingerprint_format(conn)? {
        Some(format) if format == FINGERPRINT_FORMAT => Ok(()),
        Some(format) => Err(anyhow!(
            "catalog database uses fingerprint format {format}; this build supports {FINGERPRINT_FORMAT}"
        )),
        None => Err(anyhow!("catalog database is not migrated; run migrate first")),
    }
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn parse_version(raw: &str) -> Result<Version> {
    Version::parse(raw).with_context(|| format!("invalid stored version: {raw}"))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
