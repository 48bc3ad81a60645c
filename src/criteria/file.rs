//! Locate the rule whose sources argument lists a specific file

use crate::engine::BuildEngine;
use crate::error::Result;
use crate::target::{scalar_arg, MatchedLookup, ResolvedTarget};
use crate::types::{BuildLabel, EvaluationEvent};
use serde::{Deserialize, Serialize};

/// Shape of a rule type that can own a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleShape {
    /// Rule type name, e.g. `go_library`
    #[serde(rename = "id")]
    pub rule_type: String,
    /// Argument listing the rule's sources
    pub srcs: String,
    /// Argument listing the rule's dependencies
    pub deps: String,
    /// Argument holding the rule's name
    pub label: String,
}

impl RuleShape {
    pub fn new(
        rule_type: impl Into<String>,
        srcs: impl Into<String>,
        deps: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            rule_type: rule_type.into(),
            srcs: srcs.into(),
            deps: deps.into(),
            label: label.into(),
        }
    }
}

/// Find the rule, of one of the given shapes, that lists `file` in its sources
#[derive(Debug, Clone)]
pub struct SourceFileCriterion {
    pub import_id: String,
    /// Repo-relative path of the file
    pub file: String,
    pub shapes: Vec<RuleShape>,
}

impl SourceFileCriterion {
    pub fn new(import_id: impl Into<String>, file: impl Into<String>, shapes: Vec<RuleShape>) -> Self {
        Self {
            import_id: import_id.into(),
            file: file.into(),
            shapes,
        }
    }

    /// The single package owning the file
    pub fn search_scope(&self, engine: &dyn BuildEngine) -> Result<Vec<String>> {
        Ok(vec![engine.owning_package(&self.file)?])
    }

    pub fn find(&self, event: &EvaluationEvent) -> Result<Option<ResolvedTarget>> {
        let Some(shape) = self
            .shapes
            .iter()
            .find(|shape| shape.rule_type == event.rule_type_name)
        else {
            return Ok(None);
        };

        let package = event.package();
        let relative = relative_to_package(&self.file, &package);

        let listed = event
            .arg(&shape.srcs)
            .map(|srcs| srcs.candidates().iter().any(|src| src == relative))
            .unwrap_or(false);
        if !listed {
            return Ok(None);
        }

        let name = scalar_arg(event, &shape.label)?;
        Ok(Some(ResolvedTarget::new(
            BuildLabel::new(package, name),
            MatchedLookup::Rule(shape.clone()),
            event.clone(),
        )))
    }
}

/// Strip the package directory from a repo-relative path
fn relative_to_package<'a>(file: &'a str, package: &str) -> &'a str {
    if package.is_empty() {
        return file;
    }
    file.strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::types::ArgValue;
    use std::collections::BTreeMap;

    fn go_library(definition_file: &str, name: &str, srcs: ArgValue) -> EvaluationEvent {
        let mut args = BTreeMap::new();
        args.insert("name".to_string(), ArgValue::Str(name.to_string()));
        args.insert("srcs".to_string(), srcs);
        EvaluationEvent {
            definition_file: definition_file.to_string(),
            rule_type_name: "go_library".to_string(),
            rule_name: name.to_string(),
            args,
        }
    }

    fn criterion() -> SourceFileCriterion {
        SourceFileCriterion::new(
            "",
            "pkg/a/a.go",
            vec![
                RuleShape::new("go_test", "srcs", "deps", "name"),
                RuleShape::new("go_library", "srcs", "deps", "name"),
            ],
        )
    }

    #[test]
    fn test_relative_to_package() {
        assert_eq!(relative_to_package("pkg/a/a.go", "pkg/a"), "a.go");
        assert_eq!(relative_to_package("pkg/a/sub/x.go", "pkg/a"), "sub/x.go");
        assert_eq!(relative_to_package("main.go", ""), "main.go");
        assert_eq!(relative_to_package("pkg/ab/a.go", "pkg/a"), "pkg/ab/a.go");
    }

    #[test]
    fn test_matches_list_sources() {
        let event = go_library(
            "pkg/a/BUILD",
            "a",
            ArgValue::List(vec!["x.go".into(), "a.go".into(), "y.go".into()]),
        );

        let resolved = criterion().find(&event).unwrap().unwrap();

        assert_eq!(resolved.label, BuildLabel::new("pkg/a", "a"));
        assert!(matches!(resolved.lookup, MatchedLookup::Rule(ref s) if s.rule_type == "go_library"));
    }

    #[test]
    fn test_matches_scalar_sources() {
        let event = go_library("pkg/a/BUILD", "a", ArgValue::Str("a.go".into()));
        assert!(criterion().find(&event).unwrap().is_some());
    }

    #[test]
    fn test_no_match_for_other_file_or_rule_type() {
        let event = go_library("pkg/a/BUILD", "a", ArgValue::List(vec!["b.go".into()]));
        assert!(criterion().find(&event).unwrap().is_none());

        let mut other = go_library("pkg/a/BUILD", "a", ArgValue::List(vec!["a.go".into()]));
        other.rule_type_name = "filegroup".to_string();
        assert!(criterion().find(&other).unwrap().is_none());
    }

    #[test]
    fn test_only_first_shape_of_a_rule_type_is_tested() {
        let criterion = SourceFileCriterion::new(
            "",
            "pkg/a/a.go",
            vec![
                RuleShape::new("go_library", "hdrs", "deps", "name"),
                RuleShape::new("go_library", "srcs", "deps", "name"),
            ],
        );
        let event = go_library("pkg/a/BUILD", "a", ArgValue::List(vec!["a.go".into()]));

        assert!(criterion.find(&event).unwrap().is_none());
    }

    #[test]
    fn test_dict_sources_never_match() {
        let mut dict = BTreeMap::new();
        dict.insert("a.go".to_string(), serde_json::json!("a.go"));
        let event = go_library("pkg/a/BUILD", "a", ArgValue::Dict(dict));
        assert!(criterion().find(&event).unwrap().is_none());
    }

    #[test]
    fn test_list_label_is_extraction_error() {
        let mut event = go_library("pkg/a/BUILD", "a", ArgValue::List(vec!["a.go".into()]));
        event
            .args
            .insert("name".to_string(), ArgValue::List(vec!["a".into()]));

        let err = criterion().find(&event).unwrap_err();
        assert!(matches!(err, AuditError::ExtractionError { .. }));
    }
}
