//! End-to-end pipeline tests against mocked provider HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lingo_pipeline::coordinator::{CancelToken, Pipeline, UnitStatus};
use lingo_pipeline::glossary::{self, CompiledGlossary, GlossaryEntry};
use lingo_pipeline::providers::ProviderId;
use lingo_pipeline::Config;

fn base_config() -> Config {
    Config {
        primary_provider: ProviderId::OpenAi,
        fallback_providers: vec![],
        openai_api_key: None,
        openai_model: "gpt-4o-mini".to_string(),
        openai_api_url: String::new(),
        deepl_api_key: None,
        deepl_api_url: String::new(),
        google_project_id: None,
        google_credentials: None,
        google_api_url: String::new(),
        match_confidence_threshold: 0.85,
        match_min_chars: 24,
        rate_limit_per_sec: 100.0,
        rate_limit_burst: 100.0,
        rate_limit_max_wait_ms: 2000,
        dedup_ttl_secs: 60,
        provider_timeout_secs: 15,
        message_deadline_secs: 45,
        retry_max_attempts: 2,
        retry_initial_delay_ms: 10,
    }
}

fn chat_response(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}

/// A permanent failure on the primary advances the chain immediately:
/// the primary is not retried, the fallback is called exactly once.
#[tokio::test]
async fn permanent_failure_advances_to_fallback_without_retry() {
    let deepl = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/translate"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&deepl)
        .await;

    let openai = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("Hallo Welt")))
        .expect(1)
        .mount(&openai)
        .await;

    let config = Config {
        primary_provider: ProviderId::Deepl,
        fallback_providers: vec![ProviderId::OpenAi],
        deepl_api_key: Some("dk".to_string()),
        deepl_api_url: format!("{}/v2/translate", deepl.uri()),
        openai_api_key: Some("ok".to_string()),
        openai_api_url: format!("{}/v1/chat/completions", openai.uri()),
        ..base_config()
    };
    let pipeline = Pipeline::new(&config);

    let result = pipeline
        .translate(
            "hello world",
            "de",
            None,
            &CompiledGlossary::empty(),
            &CancelToken::never(),
        )
        .await
        .unwrap();

    assert_eq!(result.text, "Hallo Welt");
    assert!(!result.partial_failure);
    match &result.outcomes[0].status {
        UnitStatus::Translated { outcome, .. } => assert_eq!(outcome.provider, ProviderId::OpenAi),
        other => panic!("unexpected status {:?}", other),
    }
}

/// Transient failures are retried on the same provider before the chain
/// advances; a later success stays on the primary.
#[tokio::test]
async fn transient_failure_retries_same_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("blip"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("bonjour")))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        openai_api_key: Some("ok".to_string()),
        openai_api_url: format!("{}/v1/chat/completions", server.uri()),
        ..base_config()
    };
    let pipeline = Pipeline::new(&config);

    let result = pipeline
        .translate("hello", "fr", None, &CompiledGlossary::empty(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(result.text, "bonjour");
    match &result.outcomes[0].status {
        UnitStatus::Translated { outcome, .. } => assert_eq!(outcome.provider, ProviderId::OpenAi),
        other => panic!("unexpected status {:?}", other),
    }
}

/// N concurrent identical requests coalesce into exactly one provider
/// call; everyone receives the producer's result.
#[tokio::test]
async fn concurrent_identical_requests_issue_one_provider_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_response("hola"))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        openai_api_key: Some("ok".to_string()),
        openai_api_url: format!("{}/v1/chat/completions", server.uri()),
        ..base_config()
    };
    let pipeline = Arc::new(Pipeline::new(&config));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            pipeline
                .translate(
                    "hello",
                    "es",
                    None,
                    &CompiledGlossary::empty(),
                    &CancelToken::never(),
                )
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.text, "hola");
        assert!(!result.partial_failure);
    }
}

/// Every protected construct survives translation byte-for-byte, with
/// the glossary applied to translated text only.
#[tokio::test]
async fn protected_structure_and_glossary_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("voir la doc API")))
        .mount(&server)
        .await;

    let config = Config {
        openai_api_key: Some("ok".to_string()),
        openai_api_url: format!("{}/v1/chat/completions", server.uri()),
        ..base_config()
    };
    let pipeline = Pipeline::new(&config);
    let compiled = glossary::compile(&[GlossaryEntry::new("API", "interface")]);

    let raw = "see the docs <@42> at https://docs.example.com and run ```sh\nmake check\n``` before <t:1700000000:R> ||spoiler|| :smile:";
    let result = pipeline
        .translate(raw, "fr", None, &compiled, &CancelToken::never())
        .await
        .unwrap();

    for protected in [
        "<@42>",
        "https://docs.example.com",
        "```sh\nmake check\n```",
        "<t:1700000000:R>",
        "||spoiler||",
    ] {
        assert!(
            result.text.contains(protected),
            "missing {protected:?} in {:?}",
            result.text
        );
    }
    // Glossary rewrote translated text, nothing else.
    assert!(result.text.contains("voir la doc interface"));
}

/// When every provider fails, the message is still delivered intact:
/// each unit keeps its source text and the failure is flagged.
#[tokio::test]
async fn all_providers_failing_returns_source_text() {
    let a = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&a)
        .await;
    let b = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&b)
        .await;

    let config = Config {
        primary_provider: ProviderId::OpenAi,
        fallback_providers: vec![ProviderId::Deepl],
        openai_api_key: Some("ok".to_string()),
        openai_api_url: format!("{}/v1/chat/completions", a.uri()),
        deepl_api_key: Some("dk".to_string()),
        deepl_api_url: format!("{}/v2/translate", b.uri()),
        ..base_config()
    };
    let pipeline = Pipeline::new(&config);

    let raw = "hello `keep this` world";
    let result = pipeline
        .translate(raw, "fr", None, &CompiledGlossary::empty(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(result.text, raw);
    assert!(result.partial_failure);
    assert!(result.all_units_failed);
}

/// A drained rate limiter whose wait exceeds its budget fails fast:
/// no provider call is issued and the unit falls back to source text
/// without sitting out the refill.
#[tokio::test]
async fn rate_limit_exhaustion_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("nope")))
        .expect(0)
        .mount(&server)
        .await;

    let config = Config {
        openai_api_key: Some("ok".to_string()),
        openai_api_url: format!("{}/v1/chat/completions", server.uri()),
        // Bucket starts empty relative to a 1-token cost and refills far
        // too slowly for the 10ms budget.
        rate_limit_per_sec: 0.001,
        rate_limit_burst: 0.0,
        rate_limit_max_wait_ms: 10,
        ..base_config()
    };
    let pipeline = Pipeline::new(&config);

    let started = std::time::Instant::now();
    let result = pipeline
        .translate("hello", "fr", None, &CompiledGlossary::empty(), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(result.text, "hello");
    assert!(result.all_units_failed);
    // The next token is ~1000s away; a fast-fail returns in well under that.
    assert!(started.elapsed() < Duration::from_secs(5));
}
