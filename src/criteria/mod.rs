//! Criteria describing how to locate the build target that provides an import

pub mod file;
pub mod package;

pub use file::{RuleShape, SourceFileCriterion};
pub use package::{PackageCriterion, PackageLookup};

use crate::engine::BuildEngine;
use crate::error::Result;
use crate::target::ResolvedTarget;
use crate::types::EvaluationEvent;
use std::fmt;

/// How to find the target for one import (or for the audited file itself)
#[derive(Debug, Clone)]
pub enum Criterion {
    SourceFile(SourceFileCriterion),
    Package(PackageCriterion),
}

impl Criterion {
    /// Import identifier; empty for the audited file's own criterion
    pub fn import_id(&self) -> &str {
        match self {
            Self::SourceFile(c) => &c.import_id,
            Self::Package(c) => &c.import_id,
        }
    }

    /// Packages this criterion could resolve in.
    ///
    /// Depends only on the criterion's own data (and, for source files, the
    /// engine's package-ownership lookup), never on evaluation events.
    pub fn search_scope(&self, engine: &dyn BuildEngine) -> Result<Vec<String>> {
        match self {
            Self::SourceFile(c) => c.search_scope(engine),
            Self::Package(c) => c.search_scope(engine),
        }
    }

    /// Test the criterion against one evaluation event
    pub fn find(&self, event: &EvaluationEvent) -> Result<Option<ResolvedTarget>> {
        match self {
            Self::SourceFile(c) => c.find(event),
            Self::Package(c) => c.find(event),
        }
    }
}

impl From<SourceFileCriterion> for Criterion {
    fn from(c: SourceFileCriterion) -> Self {
        Self::SourceFile(c)
    }
}

impl From<PackageCriterion> for Criterion {
    fn from(c: PackageCriterion) -> Self {
        Self::Package(c)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFile(c) => {
                let rule_types: Vec<&str> = c.shapes.iter().map(|s| s.rule_type.as_str()).collect();
                if c.import_id.is_empty() {
                    write!(f, "source file '{}'", c.file)?;
                } else {
                    write!(f, "import '{}' via file '{}'", c.import_id, c.file)?;
                }
                write!(f, " in rules of type [{}]", rule_types.join(", "))
            }
            Self::Package(c) => {
                let lookups: Vec<String> = c
                    .lookups
                    .iter()
                    .map(|l| {
                        format!(
                            "{} in //{} where {} =~ /{}/",
                            l.rule_type, l.package, l.arg_name, l.pattern
                        )
                    })
                    .collect();
                write!(f, "import '{}' via [{}]", c.import_id, lookups.join("; "))
            }
        }
    }
}
