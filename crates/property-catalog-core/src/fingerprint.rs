use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{CatalogError, Deprecation, PropertyDefinition};

/// Identifier of the canonicalization and digest layout implemented by [`fingerprint`].
///
/// Persisted catalogs record this value; altering field order, canonicalization rules or the
/// outer digest requires a new identifier.
pub const FINGERPRINT_FORMAT: &str = "fingerprint.v1";

const DIGEST_LEN: usize = 32;
const EMPTY_DIGEST: [u8; DIGEST_LEN] = [0; DIGEST_LEN];

/// 256-bit content digest of a [`PropertyDefinition`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Fingerprint([u8; DIGEST_LEN]);

impl Fingerprint {
    #[must_use]
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode a fingerprint from its 64-character hex form.
    ///
    /// # Errors
    /// Returns [`CatalogError::Validation`] when the value is not valid hex or not 32 bytes long.
    pub fn from_hex(value: &str) -> Result<Self, CatalogError> {
        let bytes = hex::decode(value)
            .map_err(|err| CatalogError::Validation(format!("invalid fingerprint hex: {err}")))?;
        let bytes: [u8; DIGEST_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            CatalogError::Validation(format!(
                "fingerprint MUST be {DIGEST_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_hex(value)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Compute the content fingerprint of one property definition.
///
/// Each of the eight fields is digested on its own, in the fixed order dataType, type,
/// typeName, name, description, defaultValue, hints, deprecation. Absent or blank fields
/// contribute 32 zero bytes. The 256-byte concatenation is digested once more.
#[must_use]
pub fn fingerprint(definition: &PropertyDefinition) -> Fingerprint {
    let field_digests = [
        digest_symbol(definition.data_type.as_str()),
        digest_symbol(definition.property_type.as_str()),
        digest_text(Some(&definition.type_name)),
        digest_text(Some(&definition.name)),
        digest_text(definition.description.as_deref()),
        digest_text(definition.default_value.as_deref()),
        digest_hints(&definition.hints),
        digest_deprecation(definition.deprecation.as_ref()),
    ];

    let mut hasher = Sha256::new();
    for digest in &field_digests {
        hasher.update(digest);
    }
    Fingerprint(sha256(hasher))
}

fn is_blank(value: &str) -> bool {
    value.chars().all(char::is_whitespace)
}

fn sha256(hasher: Sha256) -> [u8; DIGEST_LEN] {
    let mut out = [0_u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn digest_bytes(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    sha256(hasher)
}

fn digest_symbol(symbol: &str) -> [u8; DIGEST_LEN] {
    digest_bytes(symbol.as_bytes())
}

fn digest_text(value: Option<&str>) -> [u8; DIGEST_LEN] {
    match value {
        Some(text) if !is_blank(text) => {
            let stripped = text.chars().filter(|ch| !ch.is_whitespace()).collect::<String>();
            digest_bytes(stripped.as_bytes())
        }
        _ => EMPTY_DIGEST,
    }
}

fn digest_hints(hints: &[String]) -> [u8; DIGEST_LEN] {
    if hints.is_empty() {
        return EMPTY_DIGEST;
    }

    let mut sorted = hints.iter().map(String::as_str).collect::<Vec<_>>();
    sorted.sort_unstable();
    digest_bytes(sorted.concat().as_bytes())
}

fn digest_deprecation(deprecation: Option<&Deprecation>) -> [u8; DIGEST_LEN] {
    let Some(deprecation) = deprecation else {
        return EMPTY_DIGEST;
    };

    let reason = deprecation.reason.as_deref().filter(|value| !is_blank(value));
    let replacement = deprecation.replacement.as_deref().filter(|value| !is_blank(value));
    if reason.is_none() && replacement.is_none() {
        return EMPTY_DIGEST;
    }

    let joined = [reason, replacement].into_iter().flatten().collect::<String>();
    digest_bytes(joined.as_bytes())
}
