//! Translation coordinator.
//!
//! Orchestrates one message through the pipeline: tokenize, language-match
//! short-circuit, per-unit dispatch through the provider fallback chain
//! (dedup cache, rate limiting, retry with backoff), reassembly, and the
//! glossary pass. Per-unit failures never abort the whole message: a
//! failed unit falls back to its source text and the message-level result
//! carries a partial-failure flag.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, warn};

use crate::config::Config;
use crate::dedup::{self, DedupCache, Lookup};
use crate::error::TranslateError;
use crate::glossary::CompiledGlossary;
use crate::langid::{self, MatchPolicy};
use crate::metrics::{EventOutcome, EventSink, PipelineMetrics, TranslationEvent};
use crate::providers::{self, ProviderId, TranslationOutcome, Translator};
use crate::ratelimit::{RateLimiter, RateLimiterRegistry};
use crate::retry::RetryConfig;
use crate::spans::{self, TranslationUnit};

/// Cooperative cancellation for one in-flight translation request.
///
/// The delivery layer holds the handle; when the source message is
/// deleted or edited it cancels, and the pipeline abandons in-flight
/// provider calls instead of delivering a stale result.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelToken { receiver })
}

#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that never fires, for callers without a cancellation source.
    pub fn never() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves when cancelled; pends forever if the handle is gone
    /// without having cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Disposition of one translation unit.
#[derive(Debug, Clone)]
pub enum UnitStatus {
    Translated {
        outcome: TranslationOutcome,
        /// Served from the dedup cache or a coalesced in-flight call.
        cached: bool,
    },
    /// The unit kept its source text.
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub span_index: usize,
    pub status: UnitStatus,
}

impl UnitOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, UnitStatus::Failed { .. })
    }
}

/// Message-level result. `text` is always a complete, renderable message:
/// failed units carry their original source text, never blanks.
#[derive(Debug)]
pub struct TranslatedMessage {
    pub text: String,
    pub outcomes: Vec<UnitOutcome>,
    /// The language matcher short-circuited; no provider was consulted.
    pub skipped: bool,
    /// At least one unit fell back to its source text. A message where
    /// every unit failed should be reported as "translation unavailable"
    /// by the delivery layer rather than silently echoing the source.
    pub partial_failure: bool,
    pub all_units_failed: bool,
}

/// The format-preserving translation pipeline.
///
/// Holds the provider chain, rate limiters and dedup cache; constructed
/// once at startup and shared by reference across concurrent requests.
#[derive(Debug)]
pub struct Pipeline {
    client: reqwest::Client,
    chain: Vec<Translator>,
    limiters: RateLimiterRegistry,
    dedup: DedupCache,
    retry: RetryConfig,
    match_policy: MatchPolicy,
    provider_timeout: Duration,
    message_deadline: Duration,
    events: EventSink,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Self::with_events(config, EventSink::disabled())
    }

    pub fn with_events(config: &Config, events: EventSink) -> Self {
        let chain = providers::build_chain(config);
        let mut limiters = RateLimiterRegistry::new();
        for translator in &chain {
            let id = translator.id().as_str();
            limiters.insert(
                id,
                RateLimiter::new(
                    id,
                    config.rate_limit_per_sec,
                    config.rate_limit_burst,
                    Duration::from_millis(config.rate_limit_max_wait_ms),
                ),
            );
        }
        Self {
            client: reqwest::Client::new(),
            chain,
            limiters,
            dedup: DedupCache::new(Duration::from_secs(config.dedup_ttl_secs)),
            retry: RetryConfig::new(
                config.retry_max_attempts,
                Duration::from_millis(config.retry_initial_delay_ms),
            )
            .with_max_delay(Duration::from_secs(5)),
            match_policy: MatchPolicy {
                confidence_threshold: config.match_confidence_threshold,
                min_chars: config.match_min_chars,
            },
            provider_timeout: Duration::from_secs(config.provider_timeout_secs),
            message_deadline: Duration::from_secs(config.message_deadline_secs),
            events,
        }
    }

    /// Providers in fallback order.
    pub fn providers(&self) -> Vec<ProviderId> {
        self.chain.iter().map(Translator::id).collect()
    }

    /// Translate one message, preserving all protected structure.
    ///
    /// The single entry point for every delivery mode. Returns `Err` only
    /// for cancellation and for an unsupported target language; provider
    /// trouble surfaces as per-unit fallbacks on an `Ok` result.
    pub async fn translate(
        &self,
        raw_text: &str,
        target_lang: &str,
        source_hint: Option<&str>,
        glossary: &CompiledGlossary,
        cancel: &CancelToken,
    ) -> Result<TranslatedMessage, TranslateError> {
        if !langid::is_supported(target_lang) {
            return Err(TranslateError::permanent(
                "pipeline",
                format!("unsupported target language '{target_lang}'"),
            ));
        }
        if cancel.is_cancelled() {
            return Err(TranslateError::Cancelled);
        }

        let started = Instant::now();
        let parsed = spans::parse(raw_text);
        let units: Vec<TranslationUnit> = parsed
            .units()
            .into_iter()
            .filter(|unit| !unit.text.trim().is_empty())
            .collect();
        let translatable = parsed.translatable_text();
        let char_count = translatable.chars().count();

        // Nothing translatable (structure-only message).
        if units.is_empty() {
            self.emit(char_count, "none", started, EventOutcome::Skipped);
            return Ok(TranslatedMessage {
                text: raw_text.to_string(),
                outcomes: vec![],
                skipped: true,
                partial_failure: false,
                all_units_failed: false,
            });
        }

        // Detect: already in the target language with enough confidence.
        if langid::matches_target(&translatable, target_lang, &self.match_policy) {
            PipelineMetrics::global().record_skip();
            debug!("Language matcher skip for target {}", target_lang);
            self.emit(char_count, "none", started, EventOutcome::Skipped);
            return Ok(TranslatedMessage {
                text: raw_text.to_string(),
                outcomes: vec![],
                skipped: true,
                partial_failure: false,
                all_units_failed: false,
            });
        }

        // No usable provider: degrade to echo rather than failing.
        if self.chain.is_empty() {
            let outcomes = units
                .iter()
                .map(|unit| UnitOutcome {
                    span_index: unit.span_index,
                    status: UnitStatus::Translated {
                        outcome: TranslationOutcome {
                            text: unit.text.clone(),
                            provider: ProviderId::Echo,
                            latency: Duration::ZERO,
                            char_count: unit.text.chars().count(),
                        },
                        cached: false,
                    },
                })
                .collect();
            self.emit(char_count, "echo", started, EventOutcome::Translated);
            return Ok(TranslatedMessage {
                text: raw_text.to_string(),
                outcomes,
                skipped: false,
                partial_failure: false,
                all_units_failed: false,
            });
        }

        // Units run concurrently; all complete (or fall back) before
        // reassembly. Each unit races the shared message deadline on its
        // own, so an expiring deadline only reverts the still-pending
        // units and keeps every translation that already finished.
        // Dropping the work future on cancellation abandons in-flight
        // provider calls and releases dedup claims.
        let deadline = started + self.message_deadline;
        let work = join_all(units.iter().map(|unit| async move {
            tokio::select! {
                outcome = self.translate_unit(unit, target_lang, source_hint) => outcome,
                _ = sleep_until(deadline) => {
                    warn!("Message deadline exceeded with a unit still pending");
                    UnitOutcome {
                        span_index: unit.span_index,
                        status: UnitStatus::Failed {
                            reason: "message deadline exceeded".to_string(),
                        },
                    }
                }
            }
        }));
        let results: Vec<UnitOutcome> = tokio::select! {
            _ = cancel.cancelled() => return Err(TranslateError::Cancelled),
            results = work => results,
        };

        // Reassemble, applying the glossary to translated unit text when
        // the provider has no native glossary support. Protected spans are
        // emitted verbatim, so the glossary can never rewrite them.
        let mut translated_map: HashMap<usize, String> = HashMap::new();
        let mut used_provider: Option<ProviderId> = None;
        for result in &results {
            if let UnitStatus::Translated { outcome, .. } = &result.status {
                let mut text = outcome.text.clone();
                if !glossary.is_empty() && !self.provider_supports_glossary(outcome.provider) {
                    text = glossary.apply(&text);
                }
                translated_map.insert(result.span_index, text);
                used_provider.get_or_insert(outcome.provider);
            }
        }
        let final_text = spans::reassemble(&parsed, &translated_map);

        let failed = results.iter().filter(|r| r.is_failed()).count();
        let partial_failure = failed > 0;
        let all_units_failed = failed == results.len();
        let event_outcome = if all_units_failed {
            EventOutcome::Failed
        } else if partial_failure {
            EventOutcome::PartialFailure
        } else {
            EventOutcome::Translated
        };
        let provider_name = used_provider.map(ProviderId::as_str).unwrap_or("none");
        self.emit(char_count, provider_name, started, event_outcome);

        Ok(TranslatedMessage {
            text: final_text,
            outcomes: results,
            skipped: false,
            partial_failure,
            all_units_failed,
        })
    }

    /// Translate one unit through the fallback chain. Infallible at this
    /// level: chain exhaustion becomes a `Failed` status and the unit
    /// keeps its source text.
    async fn translate_unit(
        &self,
        unit: &TranslationUnit,
        target_lang: &str,
        source_hint: Option<&str>,
    ) -> UnitOutcome {
        let metrics = PipelineMetrics::global();
        let mut last_error: Option<TranslateError> = None;

        for translator in &self.chain {
            let provider = translator.id();
            let key = dedup::fingerprint(&unit.text, target_lang, provider.as_str());
            // One re-lookup after a coalesced flight fails: the key is
            // free again and this caller may claim it.
            let mut reclaim = true;

            let cached_outcome = |text: String| TranslationOutcome {
                text,
                provider,
                latency: Duration::ZERO,
                char_count: unit.text.chars().count(),
            };

            let attempt_result = loop {
                match self.dedup.lookup(&key) {
                    Lookup::Hit(text) => {
                        metrics.record_dedup_hit();
                        break Some((cached_outcome(text), true));
                    }
                    Lookup::InFlight(rx) => match dedup::await_flight(rx).await {
                        Some(text) => {
                            metrics.record_dedup_hit();
                            break Some((cached_outcome(text), true));
                        }
                        None if reclaim => {
                            reclaim = false;
                            continue;
                        }
                        None => {
                            last_error = Some(TranslateError::transient(
                                provider.as_str(),
                                "coalesced provider call failed",
                            ));
                            break None;
                        }
                    },
                    Lookup::Miss(claim) => {
                        metrics.record_dedup_miss();
                        match self
                            .attempt_provider(translator, &unit.text, target_lang, source_hint)
                            .await
                        {
                            Ok(outcome) => {
                                claim.complete(outcome.text.clone());
                                break Some((outcome, false));
                            }
                            Err(err) => {
                                claim.fail();
                                warn!("Provider {} failed for unit: {}", provider, err);
                                last_error = Some(err);
                                break None;
                            }
                        }
                    }
                }
            };

            if let Some((outcome, cached)) = attempt_result {
                return UnitOutcome {
                    span_index: unit.span_index,
                    status: UnitStatus::Translated { outcome, cached },
                };
            }
        }

        let reason = match last_error {
            Some(err) => err.to_string(),
            None => TranslateError::AllProvidersExhausted.to_string(),
        };
        UnitOutcome {
            span_index: unit.span_index,
            status: UnitStatus::Failed { reason },
        }
    }

    /// One provider's bounded attempt loop: rate-limit token, per-call
    /// timeout, exponential backoff with jitter on transient failures.
    /// Permanent failures and local rate-limit exhaustion return
    /// immediately so the chain can advance.
    async fn attempt_provider(
        &self,
        translator: &Translator,
        text: &str,
        target_lang: &str,
        source_hint: Option<&str>,
    ) -> Result<TranslationOutcome, TranslateError> {
        let provider = translator.id();
        let metrics = PipelineMetrics::global();
        let mut last_error: Option<TranslateError> = None;

        for attempt in 0..self.retry.max_attempts {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(
                    "{}: retry attempt {}/{} after {:?}",
                    provider,
                    attempt + 1,
                    self.retry.max_attempts,
                    delay
                );
                sleep(delay).await;
            }

            if let Some(limiter) = self.limiters.get(provider.as_str()) {
                limiter.acquire().await?;
            }

            let started = Instant::now();
            metrics.record_provider_call();
            let call = translator.translate(&self.client, text, target_lang, source_hint);
            let normalized = match timeout(self.provider_timeout, call).await {
                Ok(Ok(translated)) => {
                    return Ok(TranslationOutcome {
                        text: translated,
                        provider,
                        latency: started.elapsed(),
                        char_count: text.chars().count(),
                    });
                }
                Ok(Err(err)) => err,
                Err(_) => TranslateError::transient(provider.as_str(), "provider call timed out"),
            };
            metrics.record_provider_failure();

            if !normalized.is_transient() {
                return Err(normalized);
            }
            warn!(
                "{}: attempt {}/{} failed ({})",
                provider,
                attempt + 1,
                self.retry.max_attempts,
                normalized
            );
            last_error = Some(normalized);
        }

        Err(last_error
            .unwrap_or_else(|| TranslateError::transient(provider.as_str(), "no attempts made")))
    }

    fn provider_supports_glossary(&self, provider: ProviderId) -> bool {
        self.chain
            .iter()
            .find(|t| t.id() == provider)
            .map(Translator::supports_glossary)
            .unwrap_or(false)
    }

    fn emit(&self, char_count: usize, provider: &str, started: Instant, outcome: EventOutcome) {
        self.events.emit(TranslationEvent {
            char_count,
            provider: provider.to_string(),
            latency_ms: started.elapsed().as_millis() as u64,
            outcome,
        });
    }
}
