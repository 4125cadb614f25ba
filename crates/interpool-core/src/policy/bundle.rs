//! Policy bundle for import/export.
//!
//! An assignment policy can be exported to JSON (for review, backup, or
//! promotion between environments) and imported with a semantic-versioning
//! compatibility check.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::AssignmentPolicy;

/// Current bundle format version (semver). Bump the major part whenever the
/// policy structure changes incompatibly.
pub const POLICY_BUNDLE_VERSION: &str = "1.0.0";

/// Metadata describing the origin and intent of an exported policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyMetadata {
    /// Human-readable name (e.g. "Conference week - strict fairness").
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub notes: String,
    pub exported_at: DateTime<Utc>,
}

/// A complete policy bundle ready for export/import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyBundle {
    /// Bundle format version (semver).
    pub version: String,
    pub metadata: PolicyMetadata,
    pub policy: AssignmentPolicy,
}

impl PolicyBundle {
    pub fn new(name: impl Into<String>, policy: AssignmentPolicy, exported_at: DateTime<Utc>) -> Self {
        Self {
            version: POLICY_BUNDLE_VERSION.to_string(),
            metadata: PolicyMetadata {
                name: name.into(),
                author: String::new(),
                notes: String::new(),
                exported_at,
            },
            policy,
        }
    }

    /// Serialize the bundle to pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a bundle from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Result of comparing two bundle versions for import.
#[derive(Debug, Clone, PartialEq)]
pub enum Compatibility {
    /// Versions are fully compatible.
    Compatible,
    /// Import version is newer in the minor part; import works with a warning.
    MinorNewer { current: String, import: String },
    /// Major mismatch or unparsable version; import must be rejected.
    Incompatible { current: String, import: String },
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compatibility::Compatible => write!(f, "versions are compatible"),
            Compatibility::MinorNewer { current, import } => write!(
                f,
                "import version ({import}) is newer than current ({current}); \
                 unknown fields will be ignored"
            ),
            Compatibility::Incompatible { current, import } => {
                write!(f, "incompatible versions: current={current}, import={import}")
            }
        }
    }
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    Some((
        parts[0].parse().ok()?,
        parts[1].parse().ok()?,
        parts[2].parse().ok()?,
    ))
}

/// Check compatibility between the running format version and an import.
///
/// Major mismatch is incompatible; a newer minor imports with a warning;
/// patch differences are ignored.
pub fn check_compatibility(current: &str, import: &str) -> Compatibility {
    let (Some(cur), Some(imp)) = (parse_version(current), parse_version(import)) else {
        return Compatibility::Incompatible {
            current: current.to_string(),
            import: import.to_string(),
        };
    };

    if cur.0 != imp.0 {
        return Compatibility::Incompatible {
            current: current.to_string(),
            import: import.to_string(),
        };
    }
    if imp.1 > cur.1 {
        return Compatibility::MinorNewer {
            current: current.to_string(),
            import: import.to_string(),
        };
    }
    Compatibility::Compatible
}
