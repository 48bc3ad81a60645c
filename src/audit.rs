//! Main audit orchestration logic

use crate::config::{AuditOptions, RepoConfig};
use crate::consumer::{consume_events, Buckets, Resolution};
use crate::criteria::{Criterion, SourceFileCriterion};
use crate::engine::{BuildEngine, CommandEngine};
use crate::error::{AuditError, Result};
use crate::progress::observe_progress;
use crate::resolver::resolve_imports;
use crate::types::AuditResult;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinError;
use tracing::{debug, info};

/// Packages to evaluate and the criteria waiting on each build file
#[derive(Debug, Clone, Default)]
pub struct RequestPlan {
    /// One package per distinct build-definition file, in discovery order
    pub packages: Vec<String>,
    pub buckets: Buckets,
}

/// Compute every criterion's search scope and bucket the criteria by the
/// build-definition file each scope package maps to.
pub fn plan_requests(engine: &dyn BuildEngine, criteria: &[Criterion]) -> Result<RequestPlan> {
    let mut plan = RequestPlan::default();

    for (index, criterion) in criteria.iter().enumerate() {
        for package in criterion.search_scope(engine)? {
            let build_file = engine.build_file(&package)?;

            let bucket = plan.buckets.entry(build_file).or_insert_with(|| {
                plan.packages.push(package.clone());
                Vec::new()
            });
            if !bucket.contains(&index) {
                bucket.push(index);
            }
        }
    }

    Ok(plan)
}

/// Audit a source file with an already-built criterion set.
///
/// `source` locates the rule owning the audited file; `imports` are the
/// criteria produced for its imports.
pub async fn audit_source_file<E>(
    engine: Arc<E>,
    source: SourceFileCriterion,
    imports: Vec<Criterion>,
    options: &AuditOptions,
) -> Result<AuditResult>
where
    E: BuildEngine + 'static,
{
    info!(
        "Starting audit of {} with {} import criteria",
        source.file,
        imports.len()
    );

    let source_file = source.file.clone();
    let mut criteria = Vec::with_capacity(imports.len() + 1);
    criteria.push(Criterion::from(source));
    criteria.extend(imports);

    let plan = plan_requests(engine.as_ref(), &criteria)?;
    info!("Requesting evaluation of {} packages", plan.packages.len());
    debug!("Packages: {:?}", plan.packages);

    let criteria = Arc::new(criteria);
    let resolution = evaluate_and_match(engine, Arc::clone(&criteria), plan, options).await?;
    resolution.ensure_complete(&criteria)?;

    let source_target = resolution
        .get(0)
        .ok_or_else(|| AuditError::TaskFailed("source file criterion lost".to_string()))?;
    let source_label = source_target.build_label()?;
    let declared_labels = source_target.declared_deps()?;

    let mut resolved_import_labels = BTreeMap::new();
    for (index, criterion) in criteria.iter().enumerate().skip(1) {
        if let Some(target) = resolution.get(index) {
            resolved_import_labels.insert(criterion.import_id().to_string(), target.build_label()?);
        }
    }

    let result = AuditResult::new(
        source_file,
        source_label,
        declared_labels,
        resolved_import_labels,
    );

    info!(
        "Audit complete: {} declared, {} imports resolved, {} missing",
        result.declared_labels.len(),
        result.resolved_import_labels.len(),
        result.missing.len()
    );

    Ok(result)
}

/// Run the matcher and the evaluator side by side.
///
/// The evaluator starts the engine only after the matcher confirms its
/// subscription is installed: the stream has no replay.
async fn evaluate_and_match<E>(
    engine: Arc<E>,
    criteria: Arc<Vec<Criterion>>,
    plan: RequestPlan,
    options: &AuditOptions,
) -> Result<Resolution>
where
    E: BuildEngine + 'static,
{
    let RequestPlan { packages, buckets } = plan;
    let (subscribed_tx, subscribed_rx) = oneshot::channel::<()>();
    let (progress_tx, progress_rx) = watch::channel(0u64);

    let matcher = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let stream = engine.subscribe();
            if subscribed_tx.send(()).is_err() {
                debug!("Evaluator gone before subscription was confirmed");
            }
            consume_events(stream, &criteria, &buckets, Some(&progress_tx)).await
        })
    };

    let show_progress = options.show_progress;
    let evaluator = tokio::spawn(async move {
        subscribed_rx.await.map_err(|_| {
            AuditError::TaskFailed("matcher exited before subscribing".to_string())
        })?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let observer = tokio::spawn(observe_progress(progress_rx, cancel_rx, show_progress));

        let evaluated = engine.evaluate(&packages).await;

        let _ = cancel_tx.send(());
        let _ = observer.await;
        evaluated
    });

    let (matched, evaluated) = tokio::join!(matcher, evaluator);
    evaluated.map_err(task_failed)??;
    matched.map_err(task_failed)?
}

fn task_failed(err: JoinError) -> AuditError {
    AuditError::TaskFailed(err.to_string())
}

/// Audit one source file of a configured repository end to end: resolve its
/// imports, evaluate the packages that could provide them and report the
/// targets used but not declared.
pub async fn audit_file(
    config: &RepoConfig,
    file: &Path,
    options: &AuditOptions,
) -> Result<AuditResult> {
    let full_path = config.full_file_path(file);
    if !full_path.is_file() {
        return Err(AuditError::FileNotFound {
            path: full_path.display().to_string(),
        });
    }

    let source = config.source_file_criterion(&full_path)?;
    let engine = Arc::new(CommandEngine::new(
        config.repo.clone(),
        config.engine.clone(),
    )?);
    let imports = resolve_imports(config, &full_path).await?;

    audit_source_file(engine, source, imports, options).await
}
