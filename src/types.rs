//! Core data types shared by the criterion model, the event consumer and the report

use crate::error::{AuditError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Address of a build target: `(package, name)`
///
/// The canonical string form is `//package:name`, which is also how labels
/// are serialized and compared against declared dependency strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BuildLabel {
    pub package: String,
    pub name: String,
}

impl BuildLabel {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }

    /// Parse an absolute label (`//pkg:name` or `//pkg`)
    pub fn parse(label: &str) -> Result<Self> {
        Self::parse_relative(label, None)
    }

    /// Parse a label as written in a build file owned by `current_package`.
    ///
    /// Accepts `//pkg:name`, `//pkg` (short for `//pkg:<last component>`) and
    /// `:name` when a current package is known.
    pub fn parse_relative(label: &str, current_package: Option<&str>) -> Result<Self> {
        let invalid = || AuditError::InvalidLabel(label.to_string());

        if let Some(rest) = label.strip_prefix("//") {
            let (package, name) = match rest.split_once(':') {
                Some((package, name)) => (package, name),
                None => {
                    let name = rest.rsplit('/').next().unwrap_or_default();
                    (rest, name)
                }
            };
            if name.is_empty() || name.contains(':') || package.ends_with('/') {
                return Err(invalid());
            }
            return Ok(Self::new(package, name));
        }

        match (label.strip_prefix(':'), current_package) {
            (Some(name), Some(package)) if !name.is_empty() && !name.contains(':') => {
                Ok(Self::new(package, name))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for BuildLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{}:{}", self.package, self.name)
    }
}

impl From<BuildLabel> for String {
    fn from(label: BuildLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for BuildLabel {
    type Error = AuditError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

/// Value of one evaluated rule argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Str(String),
    List(Vec<String>),
    /// Dictionary arguments are carried but never matched
    Dict(BTreeMap<String, serde_json::Value>),
    /// Booleans, numbers, `None` and mixed lists
    Other(serde_json::Value),
}

impl ArgValue {
    /// Short name of the value's shape, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Other(_) => "other",
        }
    }

    /// Candidate strings a matcher may compare against.
    ///
    /// A scalar yields itself, a list yields its elements, anything else
    /// yields nothing.
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::Str(s) => std::slice::from_ref(s),
            Self::List(values) => values,
            Self::Dict(_) | Self::Other(_) => &[],
        }
    }
}

/// One fully-evaluated rule invocation emitted by the build engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    /// Repo-relative path of the build-definition file the rule came from
    pub definition_file: String,
    /// Rule type, e.g. `go_library`
    pub rule_type_name: String,
    /// Name given to the rule invocation
    pub rule_name: String,
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
}

impl EvaluationEvent {
    /// Package owning this event: the directory of its build-definition file
    pub fn package(&self) -> String {
        Path::new(&self.definition_file)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }
}

/// Outcome of auditing one source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    /// Repo-relative path of the audited file
    pub source_file: String,
    /// Label of the rule that lists the audited file in its sources
    pub source_label: BuildLabel,
    /// Dependencies declared by that rule
    pub declared_labels: BTreeSet<BuildLabel>,
    /// Import identifier → label of the target that provides it
    pub resolved_import_labels: BTreeMap<String, BuildLabel>,
    /// Resolved import targets absent from the declared dependencies
    pub missing: BTreeSet<BuildLabel>,
    /// Timestamp when the audit was performed
    pub timestamp: DateTime<Utc>,
}

impl AuditResult {
    pub fn new(
        source_file: String,
        source_label: BuildLabel,
        declared_labels: BTreeSet<BuildLabel>,
        resolved_import_labels: BTreeMap<String, BuildLabel>,
    ) -> Self {
        let missing = missing_labels(&declared_labels, &resolved_import_labels);
        Self {
            source_file,
            source_label,
            declared_labels,
            resolved_import_labels,
            missing,
            timestamp: Utc::now(),
        }
    }

    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Labels resolved for imports but not declared, deduplicated by canonical form
pub fn missing_labels(
    declared: &BTreeSet<BuildLabel>,
    resolved: &BTreeMap<String, BuildLabel>,
) -> BTreeSet<BuildLabel> {
    let declared: BTreeSet<String> = declared.iter().map(ToString::to_string).collect();

    resolved
        .values()
        .filter(|label| !declared.contains(&label.to_string()))
        .cloned()
        .collect()
}
