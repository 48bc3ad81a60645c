//! # build_dep_audit
//!
//! Audits a source file's declared build dependencies against the targets its
//! imports actually resolve to:
//! - **Criteria**: per-import descriptions of how to locate the providing target
//! - **Streaming resolution**: criteria are matched against the build engine's
//!   evaluation events as they are emitted, in a single pass
//! - **Missing dependencies**: resolved import targets the source file's rule
//!   does not declare
//!
//! ## Quick Start
//!
//! ```no_run
//! use build_dep_audit::{audit_file, AuditOptions, RepoConfig};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = RepoConfig::load(Path::new("repo.json"))?;
//! let result = audit_file(&config, Path::new("pkg/a/a.go"), &AuditOptions::default()).await?;
//!
//! for label in &result.missing {
//!     println!("missing: {}", label);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Collaborators
//!
//! The build engine is abstracted behind [`BuildEngine`]. [`CommandEngine`]
//! drives an external program emitting JSON evaluation events;
//! [`MemoryEngine`] serves pre-declared packages. Import extraction is done by
//! an external per-language resolver program (see [`resolve_imports`]).

mod audit;
mod config;
mod consumer;
mod criteria;
mod engine;
mod error;
mod progress;
mod resolver;
mod target;
mod types;

// Re-export public API
pub use audit::{audit_file, audit_source_file, plan_requests, RequestPlan};
pub use config::{AuditOptions, EngineConfig, ExtensionConfig, RepoConfig, RepoConfigBuilder};
pub use consumer::{consume_events, Buckets, Resolution};
pub use criteria::{Criterion, PackageCriterion, PackageLookup, RuleShape, SourceFileCriterion};
pub use engine::{BuildEngine, CommandEngine, EventHub, EventStream, MemoryEngine};
pub use error::{AuditError, Result};
pub use resolver::{parse_criteria, resolve_imports};
pub use target::{list_arg, scalar_arg, MatchedLookup, ResolvedTarget};
pub use types::{missing_labels, ArgValue, AuditResult, BuildLabel, EvaluationEvent};
