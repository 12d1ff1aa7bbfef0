//! Format-preserving chat message translation pipeline.
//!
//! Takes a raw chat message, protects its non-translatable structure
//! (code, mentions, links, spoilers, emoji, timestamps), translates the
//! plain-text spans through a fallback chain of providers, and
//! reassembles a message that renders identically apart from the
//! translated text. Around the provider calls it layers rate limiting,
//! request deduplication, retry with jittered backoff, a language-match
//! skip heuristic, and a glossary pass for curated terminology.
//!
//! [`coordinator::Pipeline`] is the entry point; everything else is the
//! machinery it composes.

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod glossary;
pub mod langid;
pub mod metrics;
pub mod providers;
pub mod ratelimit;
pub mod retry;
pub mod spans;

pub use config::Config;
pub use coordinator::{cancel_pair, CancelHandle, CancelToken, Pipeline, TranslatedMessage};
pub use error::TranslateError;
pub use glossary::{CompiledGlossary, GlossaryEntry};
pub use providers::ProviderId;
