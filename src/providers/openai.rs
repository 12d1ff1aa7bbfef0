use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::TranslateError;

const PROVIDER: &str = "openai";

/// LLM-based backend over the chat-completions API. Temperature is pinned
/// to 0 so repeated calls for the same unit stay cache-friendly.
#[derive(Debug)]
pub struct OpenAiTranslator {
    api_key: String,
    model: String,
    api_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

fn system_prompt(target_lang: &str, source_hint: Option<&str>) -> String {
    let source_clause = match source_hint {
        Some(source) => format!(" The source language is {source}."),
        None => String::new(),
    };
    format!(
        "You are a translation engine. Translate the user content into {target_lang}.\
         {source_clause} Reply with the translation only. Preserve whitespace, \
         punctuation and capitalization style; do not add commentary."
    )
}

impl OpenAiTranslator {
    pub fn from_config(config: &Config) -> Result<Self, TranslateError> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| TranslateError::permanent(PROVIDER, "OPENAI_API_KEY not configured"))?;
        Ok(Self {
            api_key,
            model: config.openai_model.clone(),
            api_url: config.openai_api_url.clone(),
        })
    }

    pub async fn translate(
        &self,
        client: &reqwest::Client,
        text: &str,
        target_lang: &str,
        source_hint: Option<&str>,
    ) -> Result<String, TranslateError> {
        let prompt = system_prompt(target_lang, source_hint);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.0,
        };

        let response = client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslateError::from_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::from_status(PROVIDER, status.as_u16(), &body));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::transient(PROVIDER, format!("invalid response body: {e}")))?;
        // Chat models occasionally pad the reply with a stray newline.
        data.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| TranslateError::transient(PROVIDER, "response contained no choices"))
    }
}
