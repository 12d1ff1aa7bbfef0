use serde::Deserialize;

use crate::config::Config;
use crate::error::TranslateError;

const PROVIDER: &str = "deepl";

/// DeepL REST adapter: form-encoded POST to `/v2/translate` with an
/// auth-key header. Language codes are uppercased on the wire.
#[derive(Debug)]
pub struct DeeplTranslator {
    api_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    text: String,
}

impl DeeplTranslator {
    pub fn from_config(config: &Config) -> Result<Self, TranslateError> {
        let api_key = config
            .deepl_api_key
            .clone()
            .ok_or_else(|| TranslateError::permanent(PROVIDER, "DEEPL_API_KEY not configured"))?;
        Ok(Self {
            api_key,
            api_url: config.deepl_api_url.clone(),
        })
    }

    pub async fn translate(
        &self,
        client: &reqwest::Client,
        text: &str,
        target_lang: &str,
        source_hint: Option<&str>,
    ) -> Result<String, TranslateError> {
        let mut params = vec![
            ("text", text.to_string()),
            ("target_lang", target_lang.to_uppercase()),
        ];
        if let Some(source) = source_hint {
            params.push(("source_lang", source.to_uppercase()));
        }

        let response = client
            .post(&self.api_url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&params)
            .send()
            .await
            .map_err(|e| TranslateError::from_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::from_status(PROVIDER, status.as_u16(), &body));
        }

        let data: DeeplResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::transient(PROVIDER, format!("invalid response body: {e}")))?;
        data.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| TranslateError::transient(PROVIDER, "response contained no translations"))
    }
}
