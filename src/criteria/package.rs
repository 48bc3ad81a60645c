//! Locate a rule inside a named package by matching one of its arguments

use crate::engine::BuildEngine;
use crate::error::{AuditError, Result};
use crate::target::{scalar_arg, MatchedLookup, ResolvedTarget};
use crate::types::{BuildLabel, EvaluationEvent};
use regex::Regex;
use std::collections::BTreeMap;

/// One place a package criterion may resolve in
#[derive(Debug, Clone)]
pub struct PackageLookup {
    pub package: String,
    pub rule_type: String,
    /// The single argument tested against `pattern`
    pub arg_name: String,
    pub pattern: Regex,
    /// Argument holding the rule's name
    pub label: String,
}

impl PackageLookup {
    /// Build a lookup from an argument-match spec.
    ///
    /// Only single-key specs are supported: an empty spec or one naming more
    /// than one argument is rejected.
    pub fn new(
        package: impl Into<String>,
        rule_type: impl Into<String>,
        args: &BTreeMap<String, String>,
        label: impl Into<String>,
    ) -> Result<Self> {
        let package = package.into();
        let rule_type = rule_type.into();

        let mut entries = args.iter();
        let (arg_name, pattern) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => {
                return Err(AuditError::criterion(format!(
                    "lookup for '{}' in //{} has an empty argument match",
                    rule_type, package
                )))
            }
            (Some(_), Some(_)) => {
                return Err(AuditError::criterion(format!(
                    "lookup for '{}' in //{} matches {} arguments ({}); only one is supported",
                    rule_type,
                    package,
                    args.len(),
                    args.keys().cloned().collect::<Vec<_>>().join(", ")
                )))
            }
        };

        let pattern = Regex::new(pattern)?;

        Ok(Self {
            package,
            rule_type,
            arg_name: arg_name.clone(),
            pattern,
            label: label.into(),
        })
    }

    fn applies_to(&self, event: &EvaluationEvent, package: &str) -> bool {
        self.package == package && self.rule_type == event.rule_type_name
    }

    /// Whether the tested argument has any candidate value matching the pattern
    pub fn matches_args(&self, event: &EvaluationEvent) -> bool {
        event
            .arg(&self.arg_name)
            .map(|value| {
                value
                    .candidates()
                    .iter()
                    .any(|candidate| self.pattern.is_match(candidate))
            })
            .unwrap_or(false)
    }
}

/// Find a rule of a given type in one of several packages
#[derive(Debug, Clone)]
pub struct PackageCriterion {
    pub import_id: String,
    pub lookups: Vec<PackageLookup>,
}

impl PackageCriterion {
    pub fn new(import_id: impl Into<String>, lookups: Vec<PackageLookup>) -> Self {
        Self {
            import_id: import_id.into(),
            lookups,
        }
    }

    /// The packages named by the lookups, in order, without repeats
    pub fn search_scope(&self, _engine: &dyn BuildEngine) -> Result<Vec<String>> {
        let mut packages: Vec<String> = Vec::with_capacity(self.lookups.len());
        for lookup in &self.lookups {
            if !packages.contains(&lookup.package) {
                packages.push(lookup.package.clone());
            }
        }
        Ok(packages)
    }

    pub fn find(&self, event: &EvaluationEvent) -> Result<Option<ResolvedTarget>> {
        let package = event.package();

        let Some(lookup) = self
            .lookups
            .iter()
            .find(|lookup| lookup.applies_to(event, &package))
        else {
            return Ok(None);
        };

        if !lookup.matches_args(event) {
            return Ok(None);
        }

        let name = scalar_arg(event, &lookup.label)?;
        Ok(Some(ResolvedTarget::new(
            BuildLabel::new(package, name),
            MatchedLookup::Package(lookup.clone()),
            event.clone(),
        )))
    }
}
