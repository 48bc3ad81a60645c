//! In-process engine over pre-declared packages and their evaluation events

use super::{BuildEngine, EventHub, EventStream};
use crate::error::{AuditError, Result};
use crate::types::EvaluationEvent;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryPackage {
    build_file: String,
    events: Vec<EvaluationEvent>,
}

/// Engine whose packages and rule evaluations are known up front.
///
/// `evaluate` replays the events of each requested package, in request
/// order, to whoever is subscribed at that moment.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    packages: BTreeMap<String, MemoryPackage>,
    hub: EventHub,
    requests: Mutex<Vec<Vec<String>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a package, its build file and the rules it evaluates to
    pub fn with_package(
        mut self,
        package: impl Into<String>,
        build_file: impl Into<String>,
        events: Vec<EvaluationEvent>,
    ) -> Self {
        self.packages.insert(
            package.into(),
            MemoryPackage {
                build_file: build_file.into(),
                events,
            },
        );
        self
    }

    /// Every package set passed to `evaluate`, oldest first
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record_request(&self, packages: &[String]) {
        let mut requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        requests.push(packages.to_vec());
    }
}

#[async_trait]
impl BuildEngine for MemoryEngine {
    fn owning_package(&self, file: &str) -> Result<String> {
        let mut dir = Path::new(file).parent();
        while let Some(current) = dir {
            let package = current.to_string_lossy();
            if self.packages.contains_key(&*package) {
                return Ok(package.into_owned());
            }
            dir = current.parent();
        }
        Err(AuditError::engine(format!("no package owns '{}'", file)))
    }

    fn build_file(&self, package: &str) -> Result<String> {
        self.packages
            .get(package)
            .map(|p| p.build_file.clone())
            .ok_or_else(|| AuditError::engine(format!("unknown package //{}", package)))
    }

    fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    async fn evaluate(&self, packages: &[String]) -> Result<()> {
        self.record_request(packages);

        let result = async {
            for package in packages {
                let declared = self.packages.get(package).ok_or_else(|| {
                    AuditError::engine(format!("unknown package //{}", package))
                })?;
                debug!("Evaluating //{} ({} rules)", package, declared.events.len());
                for event in &declared.events {
                    self.hub.publish(event.clone()).await;
                }
            }
            Ok::<(), AuditError>(())
        }
        .await;

        self.hub.close();
        result
    }
}
