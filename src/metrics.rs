//! Pipeline observability.
//!
//! Two layers: process-wide atomic counters for cheap aggregate stats,
//! and per-request [`TranslationEvent`]s pushed to an optional unbounded
//! channel for an external collector. Event emission is fire-and-forget
//! and never blocks the pipeline; if the collector is gone the event is
//! dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc;

/// Final disposition of one translate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// Every unit translated.
    Translated,
    /// Language matcher short-circuited; original text returned.
    Skipped,
    /// Some units fell back to source text.
    PartialFailure,
    /// Every unit fell back to source text.
    Failed,
}

/// One per-request observability record for the external metrics
/// collector.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationEvent {
    pub char_count: usize,
    pub provider: String,
    pub latency_ms: u64,
    pub outcome: EventOutcome,
}

/// Handle the coordinator uses to publish events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<TranslationEvent>>,
}

impl EventSink {
    /// A sink that drops all events.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A connected sink plus the receiving end for the collector.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TranslationEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Publish an event. Unbounded send never blocks; a closed receiver
    /// just discards the event.
    pub fn emit(&self, event: TranslationEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

/// Global pipeline metrics singleton.
pub struct PipelineMetrics {
    /// Requests short-circuited by the language matcher
    skips: AtomicUsize,

    /// Provider calls actually issued over the network
    provider_calls: AtomicUsize,

    /// Provider calls that failed (after normalization, per attempt)
    provider_failures: AtomicUsize,

    /// Units served from the dedup cache or a coalesced in-flight call
    dedup_hits: AtomicUsize,

    /// Units that claimed their fingerprint and called a provider
    dedup_misses: AtomicUsize,
}

static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

impl PipelineMetrics {
    pub fn global() -> &'static PipelineMetrics {
        METRICS.get_or_init(|| PipelineMetrics {
            skips: AtomicUsize::new(0),
            provider_calls: AtomicUsize::new(0),
            provider_failures: AtomicUsize::new(0),
            dedup_hits: AtomicUsize::new(0),
            dedup_misses: AtomicUsize::new(0),
        })
    }

    pub fn record_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_call(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dedup_hit(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dedup_miss(&self) {
        self.dedup_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skips(&self) -> usize {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::Relaxed)
    }

    pub fn provider_failures(&self) -> usize {
        self.provider_failures.load(Ordering::Relaxed)
    }

    pub fn dedup_hits(&self) -> usize {
        self.dedup_hits.load(Ordering::Relaxed)
    }

    pub fn dedup_misses(&self) -> usize {
        self.dedup_misses.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let hits = self.dedup_hits();
        let misses = self.dedup_misses();
        let total = hits + misses;
        let dedup_hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let calls = self.provider_calls();
        let failures = self.provider_failures();
        let provider_success_rate = if calls > 0 {
            ((calls.saturating_sub(failures)) as f64 / calls as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            skips: self.skips(),
            provider_calls: calls,
            provider_failures: failures,
            provider_success_rate,
            dedup_hits: hits,
            dedup_misses: misses,
            dedup_hit_rate,
        }
    }

    /// Reset all counters (shared global state; tests using this run
    /// serially).
    #[cfg(test)]
    pub fn reset(&self) {
        self.skips.store(0, Ordering::Relaxed);
        self.provider_calls.store(0, Ordering::Relaxed);
        self.provider_failures.store(0, Ordering::Relaxed);
        self.dedup_hits.store(0, Ordering::Relaxed);
        self.dedup_misses.store(0, Ordering::Relaxed);
    }
}

/// Aggregate snapshot of the global counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub skips: usize,
    pub provider_calls: usize,
    pub provider_failures: usize,
    pub provider_success_rate: f64,
    pub dedup_hits: usize,
    pub dedup_misses: usize,
    pub dedup_hit_rate: f64,
}
