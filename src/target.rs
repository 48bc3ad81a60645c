//! Resolved targets and typed argument extraction

use crate::criteria::{PackageLookup, RuleShape};
use crate::error::{AuditError, Result};
use crate::types::{ArgValue, BuildLabel, EvaluationEvent};
use std::collections::BTreeSet;
use tracing::warn;

/// Which rule shape or package lookup produced a match
#[derive(Debug, Clone)]
pub enum MatchedLookup {
    Rule(RuleShape),
    Package(PackageLookup),
}

impl MatchedLookup {
    /// Argument holding the matched rule's name
    pub fn label_arg(&self) -> &str {
        match self {
            Self::Rule(shape) => &shape.label,
            Self::Package(lookup) => &lookup.label,
        }
    }
}

/// A criterion's match against one evaluation event. Immutable once created.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub label: BuildLabel,
    pub lookup: MatchedLookup,
    pub event: EvaluationEvent,
}

impl ResolvedTarget {
    pub(crate) fn new(label: BuildLabel, lookup: MatchedLookup, event: EvaluationEvent) -> Self {
        Self {
            label,
            lookup,
            event,
        }
    }

    /// Re-read the build label from the matched rule's label argument
    pub fn build_label(&self) -> Result<BuildLabel> {
        let name = scalar_arg(&self.event, self.lookup.label_arg())?;
        Ok(BuildLabel::new(self.label.package.clone(), name))
    }

    /// Dependencies declared by the matched rule.
    ///
    /// Only meaningful for source-file matches, where the rule shape names
    /// the deps argument. Entries that are not in-repo labels (subrepo
    /// labels such as `@go_deps//yaml:yaml`, or anything else unparseable)
    /// are skipped: no resolved import can ever compare equal to them.
    pub fn declared_deps(&self) -> Result<BTreeSet<BuildLabel>> {
        let MatchedLookup::Rule(shape) = &self.lookup else {
            return Err(AuditError::extraction(
                "deps",
                &self.event.rule_name,
                "target was matched by a package lookup, which names no deps argument",
            ));
        };

        let mut declared = BTreeSet::new();
        for dep in list_arg(&self.event, &shape.deps)? {
            match BuildLabel::parse_relative(&dep, Some(&self.label.package)) {
                Ok(label) => {
                    declared.insert(label);
                }
                Err(_) => warn!(
                    "Skipping declared dependency '{}' of {}: not an in-repo label",
                    dep, self.label
                ),
            }
        }
        Ok(declared)
    }
}

/// Read a string-valued argument; absence or any other shape is an error
pub fn scalar_arg<'a>(event: &'a EvaluationEvent, name: &str) -> Result<&'a str> {
    match event.arg(name) {
        Some(ArgValue::Str(value)) => Ok(value),
        Some(other) => Err(AuditError::extraction(
            name,
            &event.rule_name,
            format!("expected a string, found a {}", other.kind()),
        )),
        None => Err(AuditError::extraction(
            name,
            &event.rule_name,
            "argument is not set",
        )),
    }
}

/// Read a list-valued argument; an absent argument is an empty list
pub fn list_arg(event: &EvaluationEvent, name: &str) -> Result<Vec<String>> {
    match event.arg(name) {
        Some(ArgValue::List(values)) => Ok(values.clone()),
        None => Ok(Vec::new()),
        Some(other) => Err(AuditError::extraction(
            name,
            &event.rule_name,
            format!("expected a list of strings, found a {}", other.kind()),
        )),
    }
}
