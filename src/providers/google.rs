use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::TranslateError;

const PROVIDER: &str = "google";

/// Google Cloud Translation v3 adapter. The access token is read once at
/// startup from the `token` field of the credentials JSON file; token
/// refresh is the deployment's concern.
#[derive(Debug)]
pub struct GoogleTranslator {
    project_id: String,
    access_token: String,
    api_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest<'a> {
    contents: [&'a str; 1],
    mime_type: &'static str,
    target_language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_language_code: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
}

impl GoogleTranslator {
    pub fn from_config(config: &Config) -> Result<Self, TranslateError> {
        let project_id = config
            .google_project_id
            .clone()
            .ok_or_else(|| TranslateError::permanent(PROVIDER, "GOOGLE_PROJECT_ID not configured"))?;
        let credentials_path = config.google_credentials.clone().ok_or_else(|| {
            TranslateError::permanent(PROVIDER, "GOOGLE_APPLICATION_CREDENTIALS not configured")
        })?;

        let raw = std::fs::read_to_string(&credentials_path).map_err(|e| {
            TranslateError::permanent(PROVIDER, format!("credentials file unreadable: {e}"))
        })?;
        let creds: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            TranslateError::permanent(PROVIDER, format!("credentials file invalid: {e}"))
        })?;
        let access_token = creds
            .get("token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                TranslateError::permanent(PROVIDER, "credentials missing token field")
            })?;

        Ok(Self {
            project_id,
            access_token,
            api_url: config.google_api_url.clone(),
        })
    }

    pub async fn translate(
        &self,
        client: &reqwest::Client,
        text: &str,
        target_lang: &str,
        source_hint: Option<&str>,
    ) -> Result<String, TranslateError> {
        let url = format!(
            "{}/projects/{}:translateText",
            self.api_url, self.project_id
        );
        let body = GoogleRequest {
            contents: [text],
            mime_type: "text/plain",
            target_language_code: target_lang,
            source_language_code: source_hint,
        };

        let response = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslateError::from_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::from_status(PROVIDER, status.as_u16(), &body));
        }

        let data: GoogleResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::transient(PROVIDER, format!("invalid response body: {e}")))?;
        data.translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| TranslateError::transient(PROVIDER, "response contained no translations"))
    }
}
