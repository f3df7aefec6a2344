use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CatalogError;

const SEMANTIC_PATTERN: &str = r"^v?(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$";
const CALENDAR_PATTERN: &str =
    r"^(\d{1,4})[._-](\d{1,4})(?:[._-](\d{1,4}))?(?:[._-]?([0-9A-Za-z]+))?$";

/// `MAJOR.MINOR.PATCH(-PRERELEASE)?(+BUILD)?` release identifier.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    pub original: String,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Vec<String>,
    pub build: Vec<String>,
}

/// `YEAR.PRIMARY(.SECONDARY)?(-MODIFIER)?` release identifier.
#[derive(Debug, Clone)]
pub struct CalendarVersion {
    pub original: String,
    pub year: u32,
    pub primary: u32,
    /// `None` sorts before any present value.
    pub secondary: Option<u32>,
    /// `None` (a final release) sorts after any present modifier.
    pub modifier: Option<String>,
}

/// A parsed release version.
///
/// Ordering is total: within a scheme components are compared first and the original text
/// breaks ties; across schemes `Unknown < Calendar < Semantic`.
#[derive(Debug, Clone)]
pub enum Version {
    Semantic(SemanticVersion),
    Calendar(CalendarVersion),
    Unknown(String),
}

impl Version {
    /// Parse a raw version string, trying the semantic grammar, then the calendar grammar,
    /// and finally keeping the literal text.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidVersion`] when the input is empty or only whitespace.
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let original = raw.chars().filter(|ch| !ch.is_whitespace()).collect::<String>();
        if original.is_empty() {
            return Err(CatalogError::InvalidVersion(
                "version MUST be a non-blank string".to_string(),
            ));
        }

        if let Some(captures) = pattern(&SEMANTIC, SEMANTIC_PATTERN)?.captures(&original) {
            if let Some(version) = semantic_from_captures(&original, &captures) {
                return Ok(Self::Semantic(version));
            }
        }

        if let Some(captures) = pattern(&CALENDAR, CALENDAR_PATTERN)?.captures(&original) {
            if let Some(version) = calendar_from_captures(&original, &captures) {
                return Ok(Self::Calendar(version));
            }
        }

        Ok(Self::Unknown(original))
    }

    #[must_use]
    pub fn original(&self) -> &str {
        match self {
            Self::Semantic(version) => &version.original,
            Self::Calendar(version) => &version.original,
            Self::Unknown(original) => original,
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Semantic(_) => "semantic",
            Self::Calendar(_) => "calendar",
            Self::Unknown(_) => "unknown",
        }
    }

    fn scheme_rank(&self) -> u8 {
        match self {
            Self::Unknown(_) => 0,
            Self::Calendar(_) => 1,
            Self::Semantic(_) => 2,
        }
    }
}

static SEMANTIC: OnceLock<Result<Regex, regex_lite::Error>> = OnceLock::new();
static CALENDAR: OnceLock<Result<Regex, regex_lite::Error>> = OnceLock::new();

fn pattern(
    cell: &'static OnceLock<Result<Regex, regex_lite::Error>>,
    source: &str,
) -> Result<&'static Regex, CatalogError> {
    cell.get_or_init(|| Regex::new(source)).as_ref().map_err(|err| {
        CatalogError::InvalidVersion(format!("version grammar failed to compile: {err}"))
    })
}

fn split_identifiers(value: Option<regex_lite::Match<'_>>) -> Vec<String> {
    value
        .map(|m| m.as_str().split('.').map(str::to_string).collect())
        .unwrap_or_default()
}

fn semantic_from_captures(original: &str, captures: &Captures<'_>) -> Option<SemanticVersion> {
    // Overflowing components fall through to the next grammar.
    let major = captures.get(1)?.as_str().parse::<u64>().ok()?;
    let minor = captures.get(2)?.as_str().parse::<u64>().ok()?;
    let patch = captures.get(3)?.as_str().parse::<u64>().ok()?;

    Some(SemanticVersion {
        original: original.to_string(),
        major,
        minor,
        patch,
        pre_release: split_identifiers(captures.get(4)),
        build: split_identifiers(captures.get(5)),
    })
}

fn calendar_from_captures(original: &str, captures: &Captures<'_>) -> Option<CalendarVersion> {
    let year = calendar_year(captures.get(1)?.as_str())?;
    let primary = captures.get(2)?.as_str().parse::<u32>().ok()?;
    let secondary = match captures.get(3) {
        Some(m) => Some(m.as_str().parse::<u32>().ok()?),
        None => None,
    };

    Some(CalendarVersion {
        original: original.to_string(),
        year,
        primary,
        secondary,
        modifier: captures.get(4).map(|m| m.as_str().to_string()),
    })
}

fn calendar_year(digits: &str) -> Option<u32> {
    let value = digits.parse::<u32>().ok()?;
    if digits.starts_with('0') {
        return Some(value);
    }

    match digits.len() {
        2 => Some(2000 + value),
        _ => Some(value),
    }
}

fn compare_identifier(lhs: &str, rhs: &str) -> Ordering {
    match (lhs.parse::<u64>(), rhs.parse::<u64>()) {
        (Ok(lhs), Ok(rhs)) => lhs.cmp(&rhs),
        _ => lhs.cmp(rhs),
    }
}

fn compare_pre_release(lhs: &[String], rhs: &[String]) -> Ordering {
    match (lhs.is_empty(), rhs.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => lhs
            .iter()
            .zip(rhs)
            .map(|(lhs, rhs)| compare_identifier(lhs, rhs))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| lhs.len().cmp(&rhs.len())),
    }
}

fn compare_modifier(lhs: Option<&str>, rhs: Option<&str>) -> Ordering {
    match (lhs, rhs) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(lhs), Some(rhs)) => lhs.cmp(rhs),
    }
}

impl SemanticVersion {
    fn cmp_components(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| compare_pre_release(&self.pre_release, &other.pre_release))
    }
}

impl CalendarVersion {
    fn cmp_components(&self, other: &Self) -> Ordering {
        self.year
            .cmp(&other.year)
            .then_with(|| self.primary.cmp(&other.primary))
            .then_with(|| self.secondary.cmp(&other.secondary))
            .then_with(|| compare_modifier(self.modifier.as_deref(), other.modifier.as_deref()))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let components = match (self, other) {
            (Self::Semantic(lhs), Self::Semantic(rhs)) => lhs.cmp_components(rhs),
            (Self::Calendar(lhs), Self::Calendar(rhs)) => lhs.cmp_components(rhs),
            (Self::Unknown(_), Self::Unknown(_)) => Ordering::Equal,
            _ => return self.scheme_rank().cmp(&other.scheme_rank()),
        };
        components.then_with(|| self.original().cmp(other.original()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme_rank().hash(state);
        self.original().hash(state);
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.original())
    }
}

impl FromStr for Version {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.original())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn v(raw: &str) -> Version {
        match Version::parse(raw) {
            Ok(version) => version,
            Err(err) => panic!("fixture version {raw} should parse: {err}"),
        }
    }

    fn seeded_shuffle(values: &[&str], seed: u64) -> Vec<Version> {
        fn splitmix64(mut value: u64) -> u64 {
            value = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
            value = (value ^ (value >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            value = (value ^ (value >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            value ^ (value >> 31)
        }

        let mut keyed = values
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let index_u64 = u64::try_from(index).unwrap_or(u64::MAX);
                (splitmix64(seed ^ index_u64), v(raw))
            })
            .collect::<Vec<_>>();
        keyed.sort_by_key(|(key, _)| *key);
        keyed.into_iter().map(|(_, version)| version).collect()
    }

    fn sorted_originals(values: &[&str], seed: u64) -> Vec<String> {
        let mut versions = seeded_shuffle(values, seed);
        versions.sort();
        versions.iter().map(|version| version.original().to_string()).collect()
    }

    const SEMANTIC_ORDER: [&str; 11] = [
        "1.0.0-alpha",
        "1.0.0-alpha.beta",
        "1.0.0-rc.1",
        "1.0.0-rc.1+build.100",
        "1.0.0-rc.2",
        "1.0.0-rc.10",
        "1.0.0",
        "1.0.1",
        "1.1.1",
        "2.0.0-alpha",
        "2.0.0",
    ];

    const CALENDAR_ORDER: [&str; 8] = [
        "2023.12-beta",
        "2023.12",
        "23.12",
        "2024.01-dev",
        "2024.01-rc",
        "24.01",
        "24-01-1-alpha",
        "2024-01-01",
    ];

    // Test IDs: TVER-001
    #[test]
    fn blank_input_is_rejected() {
        for raw in ["", "   ", "\t\n"] {
            assert!(matches!(Version::parse(raw), Err(CatalogError::InvalidVersion(_))));
        }
    }

    // Test IDs: TVER-002
    #[test]
    fn semantic_versions_capture_all_components() {
        let Version::Semantic(parsed) = v("v1.2.3-rc.1+build.7") else {
            panic!("expected semantic version");
        };
        assert_eq!((parsed.major, parsed.minor, parsed.patch), (1, 2, 3));
        assert_eq!(parsed.pre_release, vec!["rc".to_string(), "1".to_string()]);
        assert_eq!(parsed.build, vec!["build".to_string(), "7".to_string()]);
        assert_eq!(parsed.original, "v1.2.3-rc.1+build.7");
    }

    // Test IDs: TVER-003
    #[test]
    fn whitespace_is_stripped_from_original() {
        let version = v(" 1.2. 3 ");
        assert_eq!(version.original(), "1.2.3");
        assert_eq!(version.scheme(), "semantic");
    }

    // Test IDs: TVER-004
    #[test]
    fn calendar_years_follow_digit_count_rules() {
        let cases = [
            ("2024.01", 2024, 1, None, None),
            ("24.01", 2024, 1, None, None),
            ("024.5", 24, 5, None, None),
            ("0024.5", 24, 5, None, None),
            ("999.3", 999, 3, None, None),
            ("24-01-1-alpha", 2024, 1, Some(1), Some("alpha")),
            ("2023_12_0", 2023, 12, Some(0), None),
            ("2023.12rc1", 2023, 12, None, Some("rc1")),
        ];

        for (raw, year, primary, secondary, modifier) in cases {
            let Version::Calendar(parsed) = v(raw) else {
                panic!("expected calendar version for {raw}");
            };
            assert_eq!(parsed.year, year, "year of {raw}");
            assert_eq!(parsed.primary, primary, "primary of {raw}");
            assert_eq!(parsed.secondary, secondary, "secondary of {raw}");
            assert_eq!(parsed.modifier.as_deref(), modifier, "modifier of {raw}");
        }
    }

    // Test IDs: TVER-005
    #[test]
    fn absent_secondary_is_distinct_from_zero() {
        assert!(v("2024.01") < v("2024.01.0"));
        assert_ne!(v("2024.01"), v("2024.01.0"));
    }

    // Test IDs: TVER-006
    #[test]
    fn overflowing_semantic_components_fall_through() {
        let version = v("99999999999999999999.0.0");
        assert_eq!(version.scheme(), "unknown");
        assert_eq!(v("release-candidate").scheme(), "unknown");
        assert_eq!(v("1.2.3.4").scheme(), "calendar");
    }

    // Test IDs: TVER-007
    #[test]
    fn semantic_order_is_reproduced_from_shuffles() {
        let expected = SEMANTIC_ORDER.iter().map(ToString::to_string).collect::<Vec<_>>();
        for seed in [0_u64, 1, 7, 42, 1_000_003] {
            assert_eq!(sorted_originals(&SEMANTIC_ORDER, seed), expected, "seed {seed}");
        }
    }

    // Test IDs: TVER-008
    #[test]
    fn calendar_order_is_reproduced_from_shuffles() {
        let expected = CALENDAR_ORDER.iter().map(ToString::to_string).collect::<Vec<_>>();
        for seed in [0_u64, 3, 11, 99, 65_537] {
            assert_eq!(sorted_originals(&CALENDAR_ORDER, seed), expected, "seed {seed}");
        }
        for raw in CALENDAR_ORDER {
            assert_eq!(v(raw).scheme(), "calendar", "{raw}");
        }
    }

    // Test IDs: TVER-009
    #[test]
    fn build_metadata_does_not_affect_component_order() {
        let Version::Semantic(lhs) = v("1.0.0+build.1") else {
            panic!("expected semantic version");
        };
        let Version::Semantic(rhs) = v("1.0.0+build.2") else {
            panic!("expected semantic version");
        };
        assert_eq!(lhs.cmp_components(&rhs), Ordering::Equal);
        assert!(v("1.0.0+zzz") < v("1.0.1"));
    }

    // Test IDs: TVER-010
    #[test]
    fn unknown_versions_compare_lexicographically() {
        assert!(v("alpha") < v("beta"));
        assert!(v("Final") < v("final"));
    }

    // Test IDs: TVER-011
    #[test]
    fn cross_scheme_precedence_is_explicit() {
        assert!(v("nightly") < v("2024.01"));
        assert!(v("2024.01") < v("0.0.1"));
        assert!(v("nightly") < v("0.0.1"));
    }

    // Test IDs: TVER-012
    #[test]
    fn serde_uses_original_text() -> Result<(), serde_json::Error> {
        let version = v("v2.1.0-M1");
        let json = serde_json::to_string(&version)?;
        assert_eq!(json, "\"v2.1.0-M1\"");
        let parsed: Version = serde_json::from_str(&json)?;
        assert_eq!(parsed, version);
        assert!(serde_json::from_str::<Version>("\"  \"").is_err());
        Ok(())
    }

    proptest! {
        // Test IDs: TVER-013
        #[test]
        fn property_ordering_is_antisymmetric_and_transitive(
            a in "[0-9]{1,2}\\.[0-9]{1,2}(\\.[0-9]{1,2})?(-[a-z0-9]{1,3})?",
            b in "[0-9]{1,2}\\.[0-9]{1,2}(\\.[0-9]{1,2})?(-[a-z0-9]{1,3})?",
            c in "[a-z0-9.+-]{1,8}",
        ) {
            let (a, b, c) = (v(&a), v(&b), v(&c));
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
            prop_assert_eq!(a.cmp(&a), Ordering::Equal);
            if a <= b && b <= c {
                prop_assert!(a <= c);
            }
            if c <= a && a <= b {
                prop_assert!(c <= b);
            }
        }
    }
}
