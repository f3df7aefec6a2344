use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{CatalogError, Version};

/// `(group, artifact)` pair that identifies one catalog.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ArtifactId {
    pub group: String,
    pub artifact: String,
}

impl ArtifactId {
    /// Parse `group:artifact`.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidCoordinates`] unless the text splits on `:` into exactly
    /// two non-blank parts.
    pub fn parse(value: &str) -> Result<Self, CatalogError> {
        match value.split(':').collect::<Vec<_>>().as_slice() {
            [group, artifact] if !group.trim().is_empty() && !artifact.trim().is_empty() => {
                Ok(Self { group: group.trim().to_string(), artifact: artifact.trim().to_string() })
            }
            _ => Err(CatalogError::InvalidCoordinates(format!(
                "expected `group:artifact`, got `{value}`"
            ))),
        }
    }
}

impl Display for ArtifactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

impl FromStr for ArtifactId {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Coordinates of one released artifact version, written `group:artifact:version`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ArtifactCoordinates {
    pub group: String,
    pub artifact: String,
    pub version: Version,
}

impl ArtifactCoordinates {
    /// # Errors
    /// Returns [`CatalogError::InvalidCoordinates`] when `group` or `artifact` is blank or
    /// contains a colon.
    pub fn new(group: &str, artifact: &str, version: Version) -> Result<Self, CatalogError> {
        for (label, value) in [("group", group), ("artifact", artifact)] {
            if value.trim().is_empty() || value.contains(':') {
                return Err(CatalogError::InvalidCoordinates(format!(
                    "{label} MUST be non-blank and colon-free, got `{value}`"
                )));
            }
        }

        Ok(Self {
            group: group.trim().to_string(),
            artifact: artifact.trim().to_string(),
            version,
        })
    }

    /// Parse `group:artifact:version`.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidCoordinates`] unless the text splits on `:` into exactly
    /// three non-blank parts.
    pub fn parse(value: &str) -> Result<Self, CatalogError> {
        let parts = value.split(':').collect::<Vec<_>>();
        let [group, artifact, version] = parts.as_slice() else {
            return Err(CatalogError::InvalidCoordinates(format!(
                "expected `group:artifact:version`, got `{value}`"
            )));
        };

        if [group, artifact, version].iter().any(|part| part.trim().is_empty()) {
            return Err(CatalogError::InvalidCoordinates(format!(
                "coordinate parts MUST be non-blank, got `{value}`"
            )));
        }

        let version = Version::parse(version)
            .map_err(|err| CatalogError::InvalidCoordinates(format!("{value}: {err}")))?;
        Self::new(group, artifact, version)
    }

    #[must_use]
    pub fn format(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn artifact_id(&self) -> ArtifactId {
        ArtifactId {
            group: self.group.clone(),
            artifact: self.artifact.clone(),
        }
    }
}

impl Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

impl FromStr for ArtifactCoordinates {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for ArtifactCoordinates {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArtifactCoordinates {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
