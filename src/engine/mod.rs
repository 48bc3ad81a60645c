//! Build-engine collaborator: package layout, evaluation trigger and event stream

pub mod command;
pub mod memory;

pub use command::CommandEngine;
pub use memory::MemoryEngine;

use crate::error::Result;
use crate::types::EvaluationEvent;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Default per-subscriber channel capacity
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Receiving end of an evaluation-event subscription.
///
/// Yields `None` once the engine has finished evaluating.
pub type EventStream = mpsc::Receiver<EvaluationEvent>;

/// The external engine that evaluates build-definition files
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Package owning a repo-relative file
    fn owning_package(&self, file: &str) -> Result<String>;

    /// Repo-relative path of a package's build-definition file
    fn build_file(&self, package: &str) -> Result<String>;

    /// Install a subscription. Only events emitted after this call are
    /// delivered; there is no replay.
    fn subscribe(&self) -> EventStream;

    /// Evaluate exactly the given packages, publishing one event per
    /// evaluated rule, and close every subscription when done.
    async fn evaluate(&self, packages: &[String]) -> Result<()>;
}

/// Fan-out of evaluation events to the subscribers present at emission time
#[derive(Debug)]
pub struct EventHub {
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<EvaluationEvent>>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().push(tx);
        rx
    }

    /// Deliver an event, waiting on full subscribers. Subscribers whose
    /// receiver has been dropped are forgotten.
    pub async fn publish(&self, event: EvaluationEvent) {
        let subscribers = self.lock().clone();
        if subscribers.is_empty() {
            debug!("No subscriber for event from {}", event.definition_file);
            return;
        }

        let mut dropped = false;
        for tx in &subscribers {
            if tx.send(event.clone()).await.is_err() {
                dropped = true;
            }
        }

        if dropped {
            self.lock().retain(|tx| !tx.is_closed());
        }
    }

    /// Close every current subscription
    pub fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<EvaluationEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
