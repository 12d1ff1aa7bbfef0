use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the translation pipeline.
///
/// The classification drives the coordinator's dispatch behavior:
/// `Transient` failures are retried with backoff on the same provider,
/// `Permanent` failures advance the fallback chain immediately, and
/// `RateLimited` means the local token bucket refused the call within its
/// bounded wait.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Timeout, 429, 5xx or transport failure. Retried, then chain-advanced.
    #[error("transient failure from {provider}: {message}")]
    Transient { provider: String, message: String },

    /// Bad credential, unsupported language pair, content rejected.
    /// Never retried on the same provider.
    #[error("permanent failure from {provider}: {message}")]
    Permanent { provider: String, message: String },

    /// The local token bucket could not grant a token within its maximum wait.
    #[error("local rate limit exhausted for {provider} (needed {wait:?} more)")]
    RateLimited { provider: String, wait: Duration },

    /// Terminal for a translation unit; the unit falls back to its source text.
    #[error("all configured providers exhausted")]
    AllProvidersExhausted,

    /// The originating message was deleted or edited; no output is delivered.
    #[error("translation request cancelled")]
    Cancelled,
}

impl TranslateError {
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Normalize an HTTP status into the shared taxonomy.
    ///
    /// 429 and 5xx are worth retrying; everything else in 4xx is a request
    /// the provider will keep rejecting (bad key, unsupported pair, policy).
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, truncate(body, 200));
        if status == 429 || status >= 500 {
            Self::transient(provider, message)
        } else {
            Self::permanent(provider, message)
        }
    }

    /// Normalize a reqwest transport error. Network-level failures and
    /// timeouts are all transient.
    pub fn from_transport(provider: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        Self::transient(provider, message)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_is_transient() {
        let err = TranslateError::from_status("deepl", 429, "slow down");
        assert!(err.is_transient());
    }

    #[test]
    fn test_5xx_is_transient() {
        assert!(TranslateError::from_status("google", 500, "").is_transient());
        assert!(TranslateError::from_status("google", 503, "").is_transient());
    }

    #[test]
    fn test_4xx_is_permanent() {
        assert!(!TranslateError::from_status("openai", 400, "bad pair").is_transient());
        assert!(!TranslateError::from_status("openai", 401, "bad key").is_transient());
        assert!(!TranslateError::from_status("openai", 403, "forbidden").is_transient());
    }

    #[test]
    fn test_error_display_includes_provider() {
        let err = TranslateError::transient("deepl", "boom");
        assert!(err.to_string().contains("deepl"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(300);
        let err = TranslateError::from_status("openai", 500, &long);
        // Must not panic on multi-byte boundaries; message is capped
        assert!(err.to_string().len() < long.len());
    }
}
