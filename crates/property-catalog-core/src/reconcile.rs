use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{fingerprint, CatalogEntry, Fingerprint, PropertyDefinition, Version};

/// What happened to one property while folding a release into the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogChange {
    Added {
        name: String,
        fingerprint: Fingerprint,
    },
    Unchanged {
        name: String,
        occurrences: u32,
    },
    Changed {
        name: String,
        previous: Fingerprint,
        current: Fingerprint,
    },
    Removed {
        name: String,
    },
}

impl CatalogChange {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Added { name, .. }
            | Self::Unchanged { name, .. }
            | Self::Changed { name, .. }
            | Self::Removed { name } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChangeSummary {
    pub added: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub removed: usize,
}

impl ChangeSummary {
    #[must_use]
    pub fn from_changes(changes: &[CatalogChange]) -> Self {
        changes.iter().fold(Self::default(), |mut summary, change| {
            match change {
                CatalogChange::Added { .. } => summary.added += 1,
                CatalogChange::Unchanged { .. } => summary.unchanged += 1,
                CatalogChange::Changed { .. } => summary.changed += 1,
                CatalogChange::Removed { .. } => summary.removed += 1,
            }
            summary
        })
    }
}

/// Persisted catalog of one artifact plus the last release folded into it.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CatalogState {
    pub entries: BTreeMap<String, CatalogEntry>,
    pub last_version: Option<Version>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReconcileOutcome {
    /// The artifact's catalog after this release, keyed by property name.
    pub catalog: BTreeMap<String, CatalogEntry>,
    pub changes: Vec<CatalogChange>,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary::from_changes(&self.changes)
    }

    /// Names whose entries were deleted by this release.
    pub fn removed_names(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().filter_map(|change| match change {
            CatalogChange::Removed { name } => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Fold one release's extracted properties into an artifact's existing catalog.
///
/// Inputs are trusted: names in `extracted` are unique and `current` is the release being
/// processed. Release ordering is enforced by the caller.
#[must_use]
pub fn reconcile(
    existing: &BTreeMap<String, CatalogEntry>,
    extracted: Vec<PropertyDefinition>,
    current: &Version,
) -> ReconcileOutcome {
    let mut catalog = BTreeMap::new();
    let mut changes = Vec::with_capacity(extracted.len());

    for definition in extracted {
        let name = definition.name.clone();
        let digest = fingerprint(&definition);

        let (entry, change) = match existing.get(&name) {
            None => (
                CatalogEntry::first_sighting(definition, digest, current),
                CatalogChange::Added {
                    name: name.clone(),
                    fingerprint: digest,
                },
            ),
            Some(previous) if previous.fingerprint == digest => {
                let occurrences = previous.occurrences.saturating_add(1);
                (
                    CatalogEntry {
                        name: name.clone(),
                        fingerprint: digest,
                        occurrences,
                        first_seen: previous.first_seen.clone(),
                        last_seen: current.clone(),
                        definition,
                    },
                    CatalogChange::Unchanged {
                        name: name.clone(),
                        occurrences,
                    },
                )
            }
            Some(previous) => (
                CatalogEntry::first_sighting(definition, digest, current),
                CatalogChange::Changed {
                    name: name.clone(),
                    previous: previous.fingerprint,
                    current: digest,
                },
            ),
        };

        changes.push(change);
        catalog.insert(name, entry);
    }

    changes.extend(
        existing
            .keys()
            .filter(|name| !catalog.contains_key(*name))
            .map(|name| CatalogChange::Removed { name: name.clone() }),
    );

    ReconcileOutcome { catalog, changes }
}
