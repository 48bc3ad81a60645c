//! Repository configuration: repo root, per-extension toolchains and the build engine

use crate::criteria::{RuleShape, SourceFileCriterion};
use crate::engine::DEFAULT_EVENT_BUFFER;
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration for one repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoConfig {
    /// Repository root
    pub repo: PathBuf,
    /// File extension (including the dot, e.g. `.go`) → toolchain
    #[serde(default)]
    pub extensions_config: HashMap<String, ExtensionConfig>,
    /// External build engine
    #[serde(default)]
    pub engine: EngineConfig,
}

/// How files of one extension are located and their imports resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionConfig {
    /// Rule shapes that may list a file of this type in their sources
    pub source_file_criteria_lookup: Vec<RuleShape>,
    /// Program turning a file's imports into criteria
    pub deps_resolver: String,
}

/// External build-engine program settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Program emitting evaluation events as JSON lines
    pub command: String,
    /// Arguments placed before the requested package specs
    pub args: Vec<String>,
    /// Names a build-definition file may have, in lookup order
    pub build_file_names: Vec<String>,
    /// Events buffered per subscriber before the engine waits
    pub event_buffer: usize,
}

/// Options for one audit run
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    /// Render a progress spinner while the engine evaluates
    pub show_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            build_file_names: vec!["BUILD".to_string(), "BUILD.plz".to_string()],
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl RepoConfig {
    /// Load a configuration file; `.toml` files are read as TOML, anything
    /// else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuditError::config(format!("cannot read '{}': {}", path.display(), e))
        })?;

        let config: RepoConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };

        config.normalized()
    }

    /// Create a new builder for RepoConfig
    pub fn builder(repo: impl Into<PathBuf>) -> RepoConfigBuilder {
        RepoConfigBuilder {
            repo: repo.into(),
            extensions_config: HashMap::new(),
            engine: EngineConfig::default(),
        }
    }

    fn normalized(mut self) -> Result<Self> {
        let repo = self.repo.to_string_lossy();
        let trimmed = repo.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(AuditError::config("'repo' must name the repository root"));
        }
        self.repo = PathBuf::from(trimmed);

        for (extension, ext_config) in &self.extensions_config {
            if !extension.starts_with('.') {
                return Err(AuditError::config(format!(
                    "extension '{}' must start with '.'",
                    extension
                )));
            }
            if ext_config.source_file_criteria_lookup.is_empty() {
                return Err(AuditError::config(format!(
                    "extension '{}' lists no source file rule shapes",
                    extension
                )));
            }
            if ext_config.deps_resolver.trim().is_empty() {
                return Err(AuditError::config(format!(
                    "extension '{}' has no dependency resolver",
                    extension
                )));
            }
        }

        Ok(self)
    }

    /// Path of a file relative to the repo root, `/`-separated
    pub fn relative_file_path(&self, file: &Path) -> String {
        let relative = file.strip_prefix(&self.repo).unwrap_or(file);
        let relative = relative.strip_prefix(".").unwrap_or(relative);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn full_file_path(&self, file: &Path) -> PathBuf {
        self.repo.join(self.relative_file_path(file))
    }

    pub fn extension_config(&self, file: &Path) -> Result<&ExtensionConfig> {
        file.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.extensions_config.get(&format!(".{}", e)))
            .ok_or_else(|| AuditError::UnsupportedFileType {
                path: file.display().to_string(),
            })
    }

    pub fn supports_file_type(&self, file: &Path) -> bool {
        self.extension_config(file).is_ok()
    }

    /// Criterion locating the rule that lists `file` in its sources
    pub fn source_file_criterion(&self, file: &Path) -> Result<SourceFileCriterion> {
        let ext_config = self.extension_config(file)?;
        Ok(SourceFileCriterion::new(
            "",
            self.relative_file_path(file),
            ext_config.source_file_criteria_lookup.clone(),
        ))
    }
}

/// Builder for RepoConfig
pub struct RepoConfigBuilder {
    repo: PathBuf,
    extensions_config: HashMap<String, ExtensionConfig>,
    engine: EngineConfig,
}

impl RepoConfigBuilder {
    pub fn extension(mut self, extension: impl Into<String>, config: ExtensionConfig) -> Self {
        self.extensions_config.insert(extension.into(), config);
        self
    }

    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn build(self) -> Result<RepoConfig> {
        RepoConfig {
            repo: self.repo,
            extensions_config: self.extensions_config,
            engine: self.engine,
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn go_extension() -> ExtensionConfig {
        ExtensionConfig {
            source_file_criteria_lookup: vec![RuleShape::new("go_library", "srcs", "deps", "name")],
            deps_resolver: "/tools/go-resolver".to_string(),
        }
    }

    fn config() -> RepoConfig {
        RepoConfig::builder("/repo/")
            .extension(".go", go_extension())
            .build()
            .unwrap()
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(config().repo, PathBuf::from("/repo"));
    }

    #[test]
    fn test_relative_and_full_paths() {
        let config = config();
        assert_eq!(config.relative_file_path(Path::new("/repo/pkg/a.go")), "pkg/a.go");
        assert_eq!(config.relative_file_path(Path::new("pkg/a.go")), "pkg/a.go");
        assert_eq!(config.relative_file_path(Path::new("./pkg/a.go")), "pkg/a.go");
        assert_eq!(
            config.full_file_path(Path::new("pkg/a.go")),
            PathBuf::from("/repo/pkg/a.go")
        );
    }

    #[test]
    fn test_file_type_support() {
        let config = config();
        assert!(config.supports_file_type(Path::new("pkg/a.go")));
        assert!(!config.supports_file_type(Path::new("pkg/a.js")));
        assert!(!config.supports_file_type(Path::new("pkg/Makefile")));

        let err = config.source_file_criterion(Path::new("pkg/a.js")).unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedFileType { .. }));
    }

    #[test]
    fn test_source_file_criterion() {
        let criterion = config()
            .source_file_criterion(Path::new("/repo/pkg/a.go"))
            .unwrap();
        assert_eq!(criterion.import_id, "");
        assert_eq!(criterion.file, "pkg/a.go");
        assert_eq!(criterion.shapes[0].rule_type, "go_library");
    }

    #[test]
    fn test_rejects_extension_without_dot() {
        let err = RepoConfig::builder("/repo")
            .extension("go", go_extension())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must start with '.'"));
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repo.json");
        std::fs::write(
            &path,
            r#"{
                "repo": "/src/monorepo/",
                "extensionsConfig": {
                    ".go": {
                        "sourceFileCriteriaLookup": [
                            {"id": "go_library", "srcs": "srcs", "deps": "deps", "label": "name"}
                        ],
                        "depsResolver": "/tools/go/resolver"
                    }
                },
                "engine": {"command": "plz-events", "args": ["--quiet"]}
            }"#,
        )
        .unwrap();

        let config = RepoConfig::load(&path).unwrap();

        assert_eq!(config.repo, PathBuf::from("/src/monorepo"));
        assert_eq!(config.engine.command, "plz-events");
        assert_eq!(config.engine.build_file_names, vec!["BUILD", "BUILD.plz"]);
        assert_eq!(config.engine.event_buffer, DEFAULT_EVENT_BUFFER);
        assert_eq!(
            config.extensions_config[".go"].deps_resolver,
            "/tools/go/resolver"
        );
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repo.toml");
        std::fs::write(
            &path,
            r#"
repo = "/src/monorepo"

[engine]
command = "plz-events"
buildFileNames = ["BUILD.plz"]

[extensionsConfig.".js"]
depsResolver = "/tools/js/resolver"
sourceFileCriteriaLookup = [
    { id = "js_library", srcs = "srcs", deps = "deps", label = "name" },
]
"#,
        )
        .unwrap();

        let config = RepoConfig::load(&path).unwrap();

        assert_eq!(config.engine.build_file_names, vec!["BUILD.plz"]);
        assert!(config.supports_file_type(Path::new("web/app.js")));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RepoConfig::load(Path::new("/nonexistent/repo.json")).unwrap_err();
        assert!(matches!(err, AuditError::ConfigError(_)));
    }
}
