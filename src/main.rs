use anyhow::{Context, Result};
use tracing::info;

use lingo_pipeline::coordinator::{CancelToken, Pipeline};
use lingo_pipeline::glossary::CompiledGlossary;
use lingo_pipeline::metrics::PipelineMetrics;
use lingo_pipeline::Config;

/// Translate one message from the command line (or stdin) and print the
/// result. Usage: `lingo-pipeline <target-lang> [text...]`.
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lingo_pipeline=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let target_lang = args
        .next()
        .context("usage: lingo-pipeline <target-lang> [text...]")?;
    let joined = args.collect::<Vec<_>>().join(" ");
    let text = if joined.is_empty() {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .context("reading message from stdin")?;
        buffer
    } else {
        joined
    };

    let config = Config::from_env()?;
    let pipeline = Pipeline::new(&config);
    info!(
        "Provider chain: {:?}",
        pipeline
            .providers()
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
    );

    let result = pipeline
        .translate(
            &text,
            &target_lang,
            None,
            &CompiledGlossary::empty(),
            &CancelToken::never(),
        )
        .await?;

    if result.skipped {
        info!("Message already matches the target language; nothing to do");
    }
    if result.partial_failure {
        info!("Some units fell back to their source text");
    }
    println!("{}", result.text);

    info!("Metrics: {:?}", PipelineMetrics::global().report());
    Ok(())
}
