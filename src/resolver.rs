//! Runs a per-language dependency resolver and parses its criteria

use crate::config::RepoConfig;
use crate::criteria::{Criterion, PackageCriterion, PackageLookup, RuleShape, SourceFileCriterion};
use crate::error::{AuditError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// One record of a resolver's JSON output
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawCriterion {
    File(RawFileCriterion),
    Package(RawPackageCriterion),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFileCriterion {
    import_id: String,
    lookup: RawFileLookup,
}

#[derive(Debug, Deserialize)]
struct RawFileLookup {
    file: String,
    calls: Vec<RuleShape>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPackageCriterion {
    import_id: String,
    lookups: Vec<RawPackageLookup>,
}

#[derive(Debug, Deserialize)]
struct RawPackageLookup {
    package: String,
    call: RawPackageCall,
}

#[derive(Debug, Deserialize)]
struct RawPackageCall {
    id: String,
    #[serde(default)]
    args: BTreeMap<String, String>,
    label: String,
}

impl RawCriterion {
    fn into_criterion(self, config: &RepoConfig) -> Result<Criterion> {
        match self {
            Self::File(raw) => {
                if raw.lookup.calls.is_empty() {
                    return Err(AuditError::criterion(format!(
                        "import '{}' lists no rule shapes",
                        raw.import_id
                    )));
                }
                let file = config.relative_file_path(Path::new(&raw.lookup.file));
                Ok(SourceFileCriterion::new(raw.import_id, file, raw.lookup.calls).into())
            }
            Self::Package(raw) => {
                if raw.lookups.is_empty() {
                    return Err(AuditError::criterion(format!(
                        "import '{}' lists no package lookups",
                        raw.import_id
                    )));
                }
                let lookups = raw
                    .lookups
                    .into_iter()
                    .map(|l| {
                        let package = l.package.trim_start_matches("//");
                        PackageLookup::new(package, l.call.id, &l.call.args, l.call.label)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(PackageCriterion::new(raw.import_id, lookups).into())
            }
        }
    }
}

/// Parse a resolver's JSON array of criteria
pub fn parse_criteria(data: &[u8], config: &RepoConfig) -> Result<Vec<Criterion>> {
    let raw: Vec<RawCriterion> =
        serde_json::from_slice(data).map_err(|e| AuditError::ResolverOutput(e.to_string()))?;

    raw.into_iter()
        .map(|r| r.into_criterion(config))
        .collect()
}

/// Run the resolver configured for `file`'s extension and parse its output.
///
/// The resolver receives the file's full path as its only argument and the
/// repository root in the `REPO` environment variable.
pub async fn resolve_imports(config: &RepoConfig, file: &Path) -> Result<Vec<Criterion>> {
    let full_path = config.full_file_path(file);
    let program = &config.extension_config(&full_path)?.deps_resolver;

    info!("Resolving imports of {} with '{}'", full_path.display(), program);

    let output = Command::new(program)
        .arg(&full_path)
        .env("REPO", &config.repo)
        .current_dir(&config.repo)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| AuditError::resolver(program, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AuditError::resolver(
            program,
            format!("exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    let criteria = parse_criteria(&output.stdout, config)?;
    debug!("Resolver produced {} criteria", criteria.len());
    Ok(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtensionConfig;

    fn config() -> RepoConfig {
        RepoConfig::builder("/repo")
            .extension(
                ".go",
                ExtensionConfig {
                    source_file_criteria_lookup: vec![RuleShape::new(
                        "go_library",
                        "srcs",
                        "deps",
                        "name",
                    )],
                    deps_resolver: "/tools/go-resolver".to_string(),
                },
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_both_record_types() {
        let json = br#"[
            {
                "type": "file",
                "importId": "example.com/repo/pkg/b",
                "lookup": {
                    "file": "/repo/pkg/b/b.go",
                    "calls": [{"id": "go_library", "srcs": "srcs", "deps": "deps", "label": "name"}]
                }
            },
            {
                "type": "package",
                "importId": "gopkg.in/yaml.v2",
                "lookups": [
                    {"package": "//third_party/go", "call": {"id": "go_module", "args": {"module": "^gopkg.in/yaml.v2$"}, "label": "name"}}
                ]
            }
        ]"#;

        let criteria = parse_criteria(json, &config()).unwrap();

        assert_eq!(criteria.len(), 2);
        match &criteria[0] {
            Criterion::SourceFile(c) => {
                assert_eq!(c.import_id, "example.com/repo/pkg/b");
                assert_eq!(c.file, "pkg/b/b.go");
            }
            other => panic!("unexpected criterion {:?}", other),
        }
        match &criteria[1] {
            Criterion::Package(c) => {
                assert_eq!(c.lookups[0].package, "third_party/go");
                assert_eq!(c.lookups[0].arg_name, "module");
            }
            other => panic!("unexpected criterion {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_resolver_output_error() {
        let json = br#"[{"type": "glob", "importId": "x"}]"#;
        let err = parse_criteria(json, &config()).unwrap_err();
        assert!(matches!(err, AuditError::ResolverOutput(_)));
    }

    #[test]
    fn test_not_an_array() {
        let err = parse_criteria(b"{}", &config()).unwrap_err();
        assert!(matches!(err, AuditError::ResolverOutput(_)));
    }

    #[test]
    fn test_multi_key_lookup_rejected() {
        let json = br#"[{
            "type": "package",
            "importId": "x",
            "lookups": [{"package": "p", "call": {"id": "r", "args": {"a": "1", "b": "2"}, "label": "name"}}]
        }]"#;
        let err = parse_criteria(json, &config()).unwrap_err();
        assert!(matches!(err, AuditError::InvalidCriterion(_)));
    }

    #[test]
    fn test_empty_output_is_no_criteria() {
        assert!(parse_criteria(b"[]", &config()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let err = resolve_imports(&config(), Path::new("pkg/a.rs")).await.unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedFileType { .. }));
    }
}
