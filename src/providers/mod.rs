//! Translation provider adapters.
//!
//! A closed set of backends behind one `translate` operation: DeepL and
//! Google Translate (commercial MT) and an OpenAI chat-completions
//! backend. Adapters are stateless aside from credentials and a base URL,
//! so one instance is safely shared across concurrent requests. Each
//! adapter normalizes backend-specific transport and HTTP errors into the
//! shared [`TranslateError`] taxonomy.

mod deepl;
mod google;
mod openai;

pub use deepl::DeeplTranslator;
pub use google::GoogleTranslator;
pub use openai::OpenAiTranslator;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::error::TranslateError;

/// Provider identity, used for rate-limiter buckets, dedup fingerprints
/// and observability events. `Echo` is the degenerate no-provider case:
/// text passes through untranslated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenAi,
    Deepl,
    Google,
    Echo,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Deepl => "deepl",
            ProviderId::Google => "google",
            ProviderId::Echo => "echo",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unsupported translation provider")]
pub struct UnknownProvider;

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "deepl" => Ok(ProviderId::Deepl),
            "google" => Ok(ProviderId::Google),
            _ => Err(UnknownProvider),
        }
    }
}

/// Result of one successful provider call for one translation unit.
/// Created by the coordinator around the adapter call, consumed after
/// reassembly, never persisted.
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub text: String,
    pub provider: ProviderId,
    pub latency: Duration,
    pub char_count: usize,
}

/// The closed set of configured backends. The coordinator holds an
/// ordered chain of these and advances it on failure.
#[derive(Debug)]
pub enum Translator {
    OpenAi(OpenAiTranslator),
    Deepl(DeeplTranslator),
    Google(GoogleTranslator),
}

impl Translator {
    pub fn id(&self) -> ProviderId {
        match self {
            Translator::OpenAi(_) => ProviderId::OpenAi,
            Translator::Deepl(_) => ProviderId::Deepl,
            Translator::Google(_) => ProviderId::Google,
        }
    }

    /// Whether the backend applies guild glossaries natively. None of the
    /// current adapters wire one through, so the coordinator always runs
    /// its own glossary pass.
    pub fn supports_glossary(&self) -> bool {
        false
    }

    pub async fn translate(
        &self,
        client: &reqwest::Client,
        text: &str,
        target_lang: &str,
        source_hint: Option<&str>,
    ) -> Result<String, TranslateError> {
        match self {
            Translator::OpenAi(adapter) => {
                adapter.translate(client, text, target_lang, source_hint).await
            }
            Translator::Deepl(adapter) => {
                adapter.translate(client, text, target_lang, source_hint).await
            }
            Translator::Google(adapter) => {
                adapter.translate(client, text, target_lang, source_hint).await
            }
        }
    }
}

/// Build the ordered provider chain from configuration. Providers whose
/// credentials are missing or unreadable are skipped with a warning; an
/// empty chain degrades to echo behavior in the coordinator.
pub fn build_chain(config: &Config) -> Vec<Translator> {
    let mut chain = Vec::new();
    for id in config.ordered_providers() {
        let built = match id {
            ProviderId::OpenAi => OpenAiTranslator::from_config(config).map(Translator::OpenAi),
            ProviderId::Deepl => DeeplTranslator::from_config(config).map(Translator::Deepl),
            ProviderId::Google => GoogleTranslator::from_config(config).map(Translator::Google),
            ProviderId::Echo => continue,
        };
        match built {
            Ok(translator) => chain.push(translator),
            Err(err) => warn!("Skipping provider {}: {}", id, err),
        }
    }
    if chain.is_empty() {
        warn!("No translators configured; messages will pass through untranslated");
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_parse() {
        assert_eq!("openai".parse::<ProviderId>().unwrap(), ProviderId::OpenAi);
        assert_eq!("DeepL".parse::<ProviderId>().unwrap(), ProviderId::Deepl);
        assert_eq!("GOOGLE".parse::<ProviderId>().unwrap(), ProviderId::Google);
        assert!("echo".parse::<ProviderId>().is_err());
        assert!("bing".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_provider_id_display_roundtrip() {
        for id in [ProviderId::OpenAi, ProviderId::Deepl, ProviderId::Google] {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
    }
}
