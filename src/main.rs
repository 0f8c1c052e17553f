//! Demo binary: run the ingest pipeline against the configured sources and
//! log accepted articles. Library consumers wire their own sink instead.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use fintech_news_ingest::pipeline::{ArticleSink, Coordinator};
use fintech_news_ingest::score::{DictionaryExtractor, KeywordExtractor};
use fintech_news_ingest::{telemetry, Article, PipelineConfig};

const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

struct LogSink;

#[async_trait]
impl ArticleSink for LogSink {
    async fn emit(&self, article: Article) {
        tracing::info!(
            source = %article.source,
            id = %article.id,
            score = article.score,
            breaking = article.breaking,
            url = %article.url,
            title = %article.title,
            "article"
        );
    }
}

fn load_extractor() -> anyhow::Result<Arc<dyn KeywordExtractor>> {
    match std::env::var("KEYWORDS_PATH") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading keyword dictionary {path}"))?;
            Ok(Arc::new(DictionaryExtractor::from_json_str(&raw)?))
        }
        Err(_) => Ok(Arc::new(DictionaryExtractor::with_defaults())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PIPELINE_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
    let cfg = PipelineConfig::from_toml_str(&raw).with_context(|| format!("parsing {path}"))?;

    let transport = Arc::new(fintech_news_ingest::fetcher::HttpTransport::new(
        &cfg.http.user_agent,
        cfg.http.timeout(),
    )?);
    let coordinator = Arc::new(Coordinator::new(cfg, transport, load_extractor()?));
    tracing::info!(sources = coordinator.enabled_sources(), "pipeline starting");

    let handle = coordinator.start(Arc::new(LogSink));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown requested");
    handle.stop().await;
    Ok(())
}
