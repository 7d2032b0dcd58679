//! Pipeline stages and progress reporting
//!
//! Observers receive an ordered stage sequence with strictly increasing
//! sequence numbers. Without an observer the pipeline emits nothing.

use citeforge_common::models::KnowledgeBaseId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;

/// Per-request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    EnhancingQuery,
    Searching,
    Filtering,
    Assembling,
    Cached,
    Done,
}

/// Observable progress of one request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    QueryEnhancementStarted,
    QueriesEnhanced { variants: Vec<String> },
    SearchDispatched { calls: usize },
    SearchCompleted { counts: BTreeMap<KnowledgeBaseId, usize> },
    ContextReady { citation_count: usize },
}

impl ProgressEvent {
    /// Stage the pipeline is in once this event has been emitted
    pub fn stage(&self) -> PipelineStage {
        match self {
            ProgressEvent::QueryEnhancementStarted => PipelineStage::EnhancingQuery,
            ProgressEvent::QueriesEnhanced { .. } | ProgressEvent::SearchDispatched { .. } => {
                PipelineStage::Searching
            }
            ProgressEvent::SearchCompleted { .. } => PipelineStage::Filtering,
            ProgressEvent::ContextReady { .. } => PipelineStage::Done,
        }
    }
}

/// An event with its position in the request's sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub sequence: u32,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Receives progress updates
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

impl<F> ProgressObserver for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: ProgressUpdate) {
        self(update)
    }
}

impl ProgressObserver for mpsc::UnboundedSender<ProgressUpdate> {
    fn on_progress(&self, update: ProgressUpdate) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.send(update);
    }
}

/// Numbers and forwards events for one request
pub struct ProgressReporter<'a> {
    observer: Option<&'a dyn ProgressObserver>,
    next: AtomicU32,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(observer: Option<&'a dyn ProgressObserver>) -> Self {
        Self {
            observer,
            next: AtomicU32::new(1),
        }
    }

    /// Reporter that drops every event
    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(observer) = self.observer {
            let sequence = self.next.fetch_add(1, Ordering::SeqCst);
            observer.on_progress(ProgressUpdate { sequence, event });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_sequence_numbers_increase() {
        let seen = Mutex::new(Vec::new());
        let observer = |u: ProgressUpdate| seen.lock().unwrap().push(u.sequence);
        let reporter = ProgressReporter::new(Some(&observer));

        reporter.emit(ProgressEvent::QueryEnhancementStarted);
        reporter.emit(ProgressEvent::SearchDispatched { calls: 3 });
        reporter.emit(ProgressEvent::ContextReady { citation_count: 0 });

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_silent_reporter() {
        let reporter = ProgressReporter::silent();
        reporter.emit(ProgressEvent::QueryEnhancementStarted);
    }

    #[test]
    fn test_channel_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(Some(&tx));
        reporter.emit(ProgressEvent::ContextReady { citation_count: 2 });

        let update = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(update.sequence, 1);
        assert_eq!(update.event.stage(), PipelineStage::Done);
    }

    #[test]
    fn test_event_serialization() {
        let update = ProgressUpdate {
            sequence: 4,
            event: ProgressEvent::ContextReady { citation_count: 7 },
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["event"], "context_ready");
        assert_eq!(json["citation_count"], 7);
        assert_eq!(json["sequence"], 4);
    }
}
