use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

mod coordinates;
mod fingerprint;
mod reconcile;
mod version;

pub use coordinates::{ArtifactCoordinates, ArtifactId};
pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_FORMAT};
pub use reconcile::{reconcile, CatalogChange, CatalogState, ChangeSummary, ReconcileOutcome};
pub use version::{CalendarVersion, SemanticVersion, Version};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CatalogError {
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExecutionId(pub Ulid);

impl ExecutionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ExecutionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primitive kind a property value is parsed as.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    Duration,
    DataSize,
    Enum,
    Object,
}

impl DataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Duration => "DURATION",
            Self::DataSize => "DATA_SIZE",
            Self::Enum => "ENUM",
            Self::Object => "OBJECT",
        }
    }
}

/// Logical shape of a property.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Scalar,
    Collection,
    Map,
    Nested,
}

impl PropertyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "SCALAR",
            Self::Collection => "COLLECTION",
            Self::Map => "MAP",
            Self::Nested => "NESTED",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Deprecation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

/// One configuration property as described by a release's metadata document.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub data_type: DataType,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub type_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<Deprecation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

/// Current streak of one property within an artifact's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub fingerprint: Fingerprint,
    pub occurrences: u32,
    pub first_seen: Version,
    pub last_seen: Version,
    pub definition: PropertyDefinition,
}

impl CatalogEntry {
    #[must_use]
    pub fn first_sighting(
        definition: PropertyDefinition,
        fingerprint: Fingerprint,
        version: &Version,
    ) -> Self {
        Self {
            name: definition.name.clone(),
            fingerprint,
            occurrences: 1,
            first_seen: version.clone(),
            last_seen: version.clone(),
            definition,
        }
    }

    /// Check the per-entry invariants a persisted catalog must uphold.
    ///
    /// # Errors
    /// Returns [`CatalogError::Validation`] when the entry name is blank or does not match its
    /// definition, the occurrence count is zero, or the streak bounds are inverted.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Validation("entry name MUST be non-blank".to_string()));
        }

        if self.name != self.definition.name {
            return Err(CatalogError::Validation(format!(
                "entry name `{}` MUST match definition name `{}`",
                self.name, self.definition.name
            )));
        }

        if self.occurrences == 0 {
            return Err(CatalogError::Validation(format!(
                "occurrences MUST be >= 1 for property {}",
                self.name
            )));
        }

        if self.first_seen > self.last_seen {
            return Err(CatalogError::Validation(format!(
                "first_seen {} MUST NOT be after last_seen {} for property {}",
                self.first_seen, self.last_seen, self.name
            )));
        }

        Ok(())
    }
}

/// A raw metadata document: the JSON array of property definitions uploaded for one release.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct MetadataDocument {
    pub properties: Vec<PropertyDefinition>,
}

impl MetadataDocument {
    /// Parse a metadata document from its JSON text.
    ///
    /// # Errors
    /// Returns [`CatalogError::Validation`] when the body is not a JSON array of property
    /// definitions.
    pub fn from_json(body: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(body)
            .map_err(|err| CatalogError::Validation(format!("malformed metadata document: {err}")))
    }

    /// Extract the property set, rejecting documents that define the same name twice.
    ///
    /// # Errors
    /// Returns [`CatalogError::Validation`] for blank or duplicated property names.
    pub fn extract(self) -> Result<Vec<PropertyDefinition>, CatalogError> {
        let mut seen = BTreeSet::new();
        for property in &self.properties {
            if property.name.trim().is_empty() {
                return Err(CatalogError::Validation(
                    "property name MUST be non-blank".to_string(),
                ));
            }
            if !seen.insert(property.name.as_str()) {
                return Err(CatalogError::Validation(format!(
                    "duplicate property name in metadata document: {}",
                    property.name
                )));
            }
        }
        Ok(self.properties)
    }
}

/// Outcome vocabulary shared by the orchestrator, scheduler and persistence layers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A release known to the catalog, registered before its metadata is processed.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReleaseRecord {
    pub entity_id: String,
    pub coordinates: ArtifactCoordinates,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

/// String parameters a run is started with. Ordered so a run's identity is canonical.
pub type RunParameters = BTreeMap<String, String>;

/// One attempt at executing a named run with fixed parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RunExecution {
    pub execution_id: ExecutionId,
    pub run_key: String,
    pub run_name: String,
    pub params: RunParameters,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str) -> PropertyDefinition {
        PropertyDefinition {
            data_type: DataType::Integer,
            property_type: PropertyType::Scalar,
            type_name: "java.lang.Integer".to_string(),
            name: name.to_string(),
            description: Some("Server HTTP port.".to_string()),
            default_value: Some("8080".to_string()),
            deprecation: None,
            hints: vec![],
        }
    }

    fn version(raw: &str) -> Version {
        match Version::parse(raw) {
            Ok(version) => version,
            Err(err) => panic!("fixture version {raw} should parse: {err}"),
        }
    }

    // Test IDs: TDOC-001
    #[test]
    fn metadata_document_parses_camel_case_json() -> Result<(), CatalogError> {
        let body = r#"[
            {
                "dataType": "INTEGER",
                "type": "SCALAR",
                "typeName": "java.lang.Integer",
                "name": "server.port",
                "description": "Server HTTP port.",
                "defaultValue": "8080",
                "hints": ["8080", "8443"]
            },
            {
                "dataType": "STRING",
                "type": "SCALAR",
                "typeName": "java.lang.String",
                "name": "server.address",
                "deprecation": { "reason": "moved", "replacement": "server.bind-address" }
            }
        ]"#;

        let properties = MetadataDocument::from_json(body)?.extract()?;
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].data_type, DataType::Integer);
        assert_eq!(properties[0].hints, vec!["8080".to_string(), "8443".to_string()]);
        assert_eq!(properties[1].description, None);
        assert_eq!(
            properties[1].deprecation.as_ref().and_then(|d| d.replacement.as_deref()),
            Some("server.bind-address")
        );
        Ok(())
    }

    // Test IDs: TDOC-002
    #[test]
    fn metadata_document_rejects_duplicate_names() {
        let document = MetadataDocument {
            properties: vec![definition("server.port"), definition("server.port")],
        };

        match document.extract() {
            Ok(_) => panic!("duplicate names should be rejected"),
            Err(err) => assert!(err.to_string().contains("duplicate property name")),
        }

        let blank = MetadataDocument { properties: vec![definition("a"), definition("  ")] };
        match blank.extract() {
            Ok(_) => panic!("blank names should be rejected"),
            Err(err) => assert!(err.to_string().contains("MUST be non-blank")),
        }
    }

    // Test IDs: TDOC-003
    #[test]
    fn metadata_document_rejects_non_array_body() {
        let result = MetadataDocument::from_json(r#"{"name": "server.port"}"#);
        assert!(matches!(result, Err(CatalogError::Validation(_))));
    }

    // Test IDs: TENT-001
    #[test]
    fn catalog_entry_validate_rejects_inverted_bounds() {
        let mut entry = CatalogEntry::first_sighting(
            definition("server.port"),
            fingerprint(&definition("server.port")),
            &version("2.0.0"),
        );
        assert_eq!(entry.validate(), Ok(()));

        entry.first_seen = version("3.0.0");
        match entry.validate() {
            Ok(()) => panic!("inverted streak bounds should be rejected"),
            Err(err) => assert!(err.to_string().contains("MUST NOT be after last_seen")),
        }
    }

    // Test IDs: TENT-002
    #[test]
    fn catalog_entry_validate_rejects_zero_occurrences() {
        let mut entry = CatalogEntry::first_sighting(
            definition("server.port"),
            fingerprint(&definition("server.port")),
            &version("1.0.0"),
        );
        entry.occurrences = 0;
        assert!(matches!(entry.validate(), Err(CatalogError::Validation(_))));
    }

    // Test IDs: TRUN-001
    #[test]
    fn run_status_round_trips_through_text() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
