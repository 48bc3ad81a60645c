//! Adapter over an external build-engine program
//!
//! The program is run from the repository root with the requested package
//! specs (`//pkg:all`) appended to its configured arguments. It must print
//! one JSON evaluation event per stdout line and exit zero once every
//! requested package has been evaluated.

use super::{BuildEngine, EventHub, EventStream};
use crate::config::EngineConfig;
use crate::error::{AuditError, Result};
use crate::types::EvaluationEvent;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Build engine driven by an external event-emitting program
#[derive(Debug)]
pub struct CommandEngine {
    repo_root: PathBuf,
    config: EngineConfig,
    hub: EventHub,
}

impl CommandEngine {
    pub fn new(repo_root: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        if config.command.trim().is_empty() {
            return Err(AuditError::config("no build engine command configured"));
        }
        if config.build_file_names.is_empty() {
            return Err(AuditError::config("no build file names configured"));
        }

        let hub = EventHub::new(config.event_buffer);
        Ok(Self {
            repo_root: repo_root.into(),
            config,
            hub,
        })
    }

    fn find_build_file(&self, dir: &Path) -> Option<&str> {
        self.config
            .build_file_names
            .iter()
            .map(String::as_str)
            .find(|name| dir.join(name).is_file())
    }

    fn relative_path(&self, path: &str) -> String {
        Path::new(path)
            .strip_prefix(&self.repo_root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string())
    }

    async fn run(&self, packages: &[String]) -> Result<()> {
        let specs: Vec<String> = packages.iter().map(|p| format!("//{}:all", p)).collect();
        info!(
            "Running build engine '{}' for {} packages",
            self.config.command,
            specs.len()
        );

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .args(&specs)
            .current_dir(&self.repo_root)
            .env("REPO", &self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AuditError::engine(format!("failed to start '{}': {}", self.config.command, e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AuditError::engine("build engine stdout was not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let mut event: EvaluationEvent = serde_json::from_str(&line).map_err(|e| {
                AuditError::engine(format!("malformed evaluation event '{}': {}", line, e))
            })?;
            event.definition_file = self.relative_path(&event.definition_file);
            self.hub.publish(event).await;
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(AuditError::engine(format!(
                "'{}' exited with {}",
                self.config.command, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildEngine for CommandEngine {
    fn owning_package(&self, file: &str) -> Result<String> {
        let full = self.repo_root.join(file);
        let mut dir = full.parent();

        while let Some(current) = dir {
            if !current.starts_with(&self.repo_root) {
                break;
            }
            if self.find_build_file(current).is_some() {
                let package = current
                    .strip_prefix(&self.repo_root)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                debug!("'{}' is owned by //{}", file, package);
                return Ok(package);
            }
            dir = current.parent();
        }

        Err(AuditError::engine(format!(
            "no package owns '{}' (looked for {})",
            file,
            self.config.build_file_names.join(", ")
        )))
    }

    fn build_file(&self, package: &str) -> Result<String> {
        let dir = self.repo_root.join(package);
        let name = self.find_build_file(&dir).ok_or_else(|| {
            AuditError::engine(format!("package //{} has no build file", package))
        })?;

        Ok(if package.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", package, name)
        })
    }

    fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    async fn evaluate(&self, packages: &[String]) -> Result<()> {
        let result = self.run(packages).await;
        self.hub.close();
        result
    }
}
