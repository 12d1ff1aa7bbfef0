use anyhow::{Context, Result};
use tracing::warn;

use crate::providers::ProviderId;

#[derive(Debug, Clone)]
pub struct Config {
    // Provider chain
    pub primary_provider: ProviderId,
    pub fallback_providers: Vec<ProviderId>,

    // OpenAI
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_url: String,

    // DeepL
    pub deepl_api_key: Option<String>,
    pub deepl_api_url: String,

    // Google Cloud Translation
    pub google_project_id: Option<String>,
    pub google_credentials: Option<String>,
    pub google_api_url: String,

    // Language-match skip heuristic
    pub match_confidence_threshold: f32,
    pub match_min_chars: usize,

    // Per-provider token bucket
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: f64,
    pub rate_limit_max_wait_ms: u64,

    // Dedup cache
    pub dedup_ttl_secs: u64,

    // Timeouts and retries
    pub provider_timeout_secs: u64,
    pub message_deadline_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let primary_raw =
            std::env::var("TRANSLATOR_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let primary_provider: ProviderId = primary_raw
            .parse()
            .with_context(|| format!("Unsupported TRANSLATOR_PROVIDER '{}'", primary_raw))?;

        let fallback_providers = std::env::var("TRANSLATOR_FALLBACKS")
            .map(|raw| parse_fallbacks(&raw))
            .unwrap_or_default();

        Ok(Self {
            primary_provider,
            fallback_providers,

            // OpenAI
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),

            // DeepL
            deepl_api_key: std::env::var("DEEPL_API_KEY").ok().filter(|v| !v.is_empty()),
            deepl_api_url: std::env::var("DEEPL_API_URL")
                .unwrap_or_else(|_| "https://api-free.deepl.com/v2/translate".to_string()),

            // Google
            google_project_id: std::env::var("GOOGLE_PROJECT_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            google_credentials: std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
                .ok()
                .filter(|v| !v.is_empty()),
            google_api_url: std::env::var("GOOGLE_API_URL")
                .unwrap_or_else(|_| "https://translation.googleapis.com/v3".to_string()),

            // Skip heuristic
            match_confidence_threshold: env_parse("MATCH_CONFIDENCE_THRESHOLD", 0.85),
            match_min_chars: env_parse("MATCH_MIN_CHARS", 24),

            // Rate limiting
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC", 5.0),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", 10.0),
            rate_limit_max_wait_ms: env_parse("RATE_LIMIT_MAX_WAIT_MS", 2000),

            // Dedup
            dedup_ttl_secs: env_parse("DEDUP_TTL_SECS", 60),

            // Timeouts and retries
            provider_timeout_secs: env_parse("PROVIDER_TIMEOUT_SECS", 15),
            message_deadline_secs: env_parse("MESSAGE_DEADLINE_SECS", 45),
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
            retry_initial_delay_ms: env_parse("RETRY_INITIAL_DELAY_MS", 500),
        })
    }

    /// The provider chain attempted in order: primary first, then each
    /// fallback once.
    pub fn ordered_providers(&self) -> Vec<ProviderId> {
        let mut ordered = vec![self.primary_provider];
        for provider in &self.fallback_providers {
            if !ordered.contains(provider) {
                ordered.push(*provider);
            }
        }
        ordered
    }
}

#[cfg(test)]
impl Config {
    /// Baseline configuration for unit tests; override fields as needed.
    pub(crate) fn test_defaults() -> Self {
        Self {
            primary_provider: ProviderId::OpenAi,
            fallback_providers: vec![],
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            deepl_api_key: None,
            deepl_api_url: "https://api-free.deepl.com/v2/translate".to_string(),
            google_project_id: None,
            google_credentials: None,
            google_api_url: "https://translation.googleapis.com/v3".to_string(),
            match_confidence_threshold: 0.85,
            match_min_chars: 24,
            rate_limit_per_sec: 5.0,
            rate_limit_burst: 10.0,
            rate_limit_max_wait_ms: 2000,
            dedup_ttl_secs: 60,
            provider_timeout_secs: 15,
            message_deadline_secs: 45,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 500,
        }
    }
}

fn parse_fallbacks(raw: &str) -> Vec<ProviderId> {
    let mut ordered = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.parse::<ProviderId>() {
            Ok(provider) => {
                if !ordered.contains(&provider) {
                    ordered.push(provider);
                }
            }
            Err(_) => warn!("Ignoring unsupported fallback provider '{}'", item),
        }
    }
    ordered
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
