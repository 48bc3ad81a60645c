//! Streaming matcher: resolves pending criteria against evaluation events

use crate::criteria::Criterion;
use crate::engine::EventStream;
use crate::error::{AuditError, Result};
use crate::target::ResolvedTarget;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info};

/// Build-definition file → indices of the criteria that can resolve from it
pub type Buckets = HashMap<String, Vec<usize>>;

/// Per-criterion resolution status, indexed like the criteria list
#[derive(Debug)]
pub struct Resolution {
    targets: Vec<Option<ResolvedTarget>>,
    events_seen: u64,
}

impl Resolution {
    pub fn new(criteria_count: usize) -> Self {
        Self {
            targets: vec![None; criteria_count],
            events_seen: 0,
        }
    }

    pub fn get(&self, index: usize) -> Option<&ResolvedTarget> {
        self.targets.get(index).and_then(Option::as_ref)
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// Indices of the criteria that never matched
    pub fn unresolved(&self) -> impl Iterator<Item = usize> + '_ {
        self.targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_none())
            .map(|(i, _)| i)
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved().next().is_none()
    }

    /// Fail with every unresolved criterion named, not just the first
    pub fn ensure_complete(&self, criteria: &[Criterion]) -> Result<()> {
        let missing: Vec<String> = self
            .unresolved()
            .map(|i| match criteria.get(i) {
                Some(criterion) => criterion.to_string(),
                None => format!("criterion #{}", i),
            })
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuditError::UnresolvedCriteria(missing))
        }
    }

    /// Record a match unless the criterion is already resolved
    fn record(&mut self, index: usize, target: ResolvedTarget) {
        if let Some(slot) = self.targets.get_mut(index) {
            if slot.is_none() {
                *slot = Some(target);
            }
        }
    }
}

/// Consume `stream` until it closes, matching each event against the
/// still-unresolved criteria bucketed under its build-definition file.
///
/// The first matching event wins; later events are never retested against
/// a resolved criterion. An extraction failure aborts consumption.
pub async fn consume_events(
    mut stream: EventStream,
    criteria: &[Criterion],
    buckets: &Buckets,
    progress: Option<&watch::Sender<u64>>,
) -> Result<Resolution> {
    let mut resolution = Resolution::new(criteria.len());

    while let Some(event) = stream.recv().await {
        resolution.events_seen += 1;
        if let Some(progress) = progress {
            progress.send_replace(resolution.events_seen);
        }

        let Some(pending) = buckets.get(&event.definition_file) else {
            continue;
        };

        for &index in pending {
            let criterion = criteria.get(index).ok_or_else(|| {
                AuditError::criterion(format!(
                    "{} is bucketed under criterion #{} but only {} criteria exist",
                    event.definition_file,
                    index,
                    criteria.len()
                ))
            })?;
            if resolution.get(index).is_some() {
                continue;
            }
            if let Some(target) = criterion.find(&event)? {
                debug!(
                    "Resolved {} to {} (rule {} in {})",
                    criterion, target.label, event.rule_name, event.definition_file
                );
                resolution.record(index, target);
            }
        }
    }

    info!(
        "Event stream drained after {} events; {}/{} criteria resolved",
        resolution.events_seen,
        criteria.len() - resolution.unresolved().count(),
        criteria.len()
    );

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{RuleShape, SourceFileCriterion};
    use crate::types::{ArgValue, EvaluationEvent};
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;

    fn library(file: &str, name: &str, srcs: &[&str]) -> EvaluationEvent {
        let mut args = BTreeMap::new();
        args.insert("name".to_string(), ArgValue::Str(name.to_string()));
        args.insert(
            "srcs".to_string(),
            ArgValue::List(srcs.iter().map(|s| s.to_string()).collect()),
        );
        EvaluationEvent {
            definition_file: file.to_string(),
            rule_type_name: "go_library".to_string(),
            rule_name: name.to_string(),
            args,
        }
    }

    fn file_criterion(file: &str) -> Criterion {
        SourceFileCriterion::new(
            "",
            file,
            vec![RuleShape::new("go_library", "srcs", "deps", "name")],
        )
        .into()
    }

    async fn run(
        events: Vec<EvaluationEvent>,
        criteria: &[Criterion],
        buckets: &Buckets,
    ) -> Result<Resolution> {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        consume_events(rx, criteria, buckets, None).await
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let criteria = vec![file_criterion("pkg/a/a.go")];
        let buckets: Buckets = [("pkg/a/BUILD".to_string(), vec![0])].into_iter().collect();

        let resolution = run(
            vec![
                library("pkg/a/BUILD", "first", &["a.go"]),
                library("pkg/a/BUILD", "second", &["a.go"]),
            ],
            &criteria,
            &buckets,
        )
        .await
        .unwrap();

        assert!(resolution.is_complete());
        assert_eq!(resolution.get(0).unwrap().label.name, "first");
        assert_eq!(resolution.events_seen(), 2);
    }

    #[tokio::test]
    async fn test_events_outside_buckets_are_ignored() {
        let criteria = vec![file_criterion("pkg/a/a.go")];
        let buckets: Buckets = [("pkg/a/BUILD".to_string(), vec![0])].into_iter().collect();

        let resolution = run(
            vec![library("pkg/b/BUILD", "b", &["../a/a.go", "a.go"])],
            &criteria,
            &buckets,
        )
        .await
        .unwrap();

        assert!(!resolution.is_complete());
        let err = resolution.ensure_complete(&criteria).unwrap_err();
        assert!(err.to_string().contains("source file 'pkg/a/a.go'"));
    }

    #[tokio::test]
    async fn test_shared_bucket_resolves_each_criterion() {
        let criteria = vec![file_criterion("pkg/a/a.go"), file_criterion("pkg/a/b.go")];
        let buckets: Buckets = [("pkg/a/BUILD".to_string(), vec![0, 1])].into_iter().collect();

        let resolution = run(
            vec![
                library("pkg/a/BUILD", "a", &["a.go"]),
                library("pkg/a/BUILD", "b", &["b.go"]),
            ],
            &criteria,
            &buckets,
        )
        .await
        .unwrap();

        assert_eq!(resolution.get(0).unwrap().label.name, "a");
        assert_eq!(resolution.get(1).unwrap().label.name, "b");
    }

    #[tokio::test]
    async fn test_reports_every_unresolved_criterion() {
        let criteria = vec![file_criterion("pkg/a/a.go"), file_criterion("pkg/c/c.go")];
        let resolution = run(Vec::new(), &criteria, &Buckets::new()).await.unwrap();

        match resolution.ensure_complete(&criteria).unwrap_err() {
            AuditError::UnresolvedCriteria(names) => assert_eq!(names.len(), 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_progress_counts_events() {
        let (tx, rx) = mpsc::channel(4);
        let (progress_tx, progress_rx) = watch::channel(0u64);
        tx.send(library("x/BUILD", "x", &[])).await.unwrap();
        tx.send(library("y/BUILD", "y", &[])).await.unwrap();
        drop(tx);

        consume_events(rx, &[], &Buckets::new(), Some(&progress_tx))
            .await
            .unwrap();

        assert_eq!(*progress_rx.borrow(), 2);
    }

    #[tokio::test]
    async fn test_bucket_index_out_of_range_is_error() {
        let criteria = vec![file_criterion("pkg/a/a.go")];
        let buckets: Buckets = [("pkg/a/BUILD".to_string(), vec![0, 3])].into_iter().collect();

        let err = run(
            vec![library("pkg/a/BUILD", "a", &["a.go"])],
            &criteria,
            &buckets,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuditError::InvalidCriterion(ref msg) if msg.contains("criterion #3")));
    }

    #[tokio::test]
    async fn test_ensure_complete_with_shorter_criteria_list() {
        let criteria = vec![file_criterion("pkg/a/a.go"), file_criterion("pkg/b/b.go")];
        let resolution = run(Vec::new(), &criteria, &Buckets::new()).await.unwrap();

        match resolution.ensure_complete(&criteria[..1]).unwrap_err() {
            AuditError::UnresolvedCriteria(names) => {
                assert_eq!(names[1], "criterion #1");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
