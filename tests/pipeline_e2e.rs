// tests/pipeline_e2e.rs
// End-to-end cycles over fixture feeds with a routed in-memory transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use fintech_news_ingest::fetcher::{Transport, TransportResponse};
use fintech_news_ingest::pipeline::{ArticleSink, Coordinator};
use fintech_news_ingest::score::DictionaryExtractor;
use fintech_news_ingest::{Article, FetchError, PipelineConfig};

/// Serves canned bodies by URL; unknown URLs get a 404.
struct RoutedTransport {
    routes: Mutex<HashMap<String, Result<String, FetchError>>>,
    calls: Arc<AtomicUsize>,
}

impl RoutedTransport {
    fn new(routes: Vec<(&str, Result<String, FetchError>)>) -> Self {
        Self {
            routes: Mutex::new(
                routes
                    .into_iter()
                    .map(|(u, r)| (u.to_string(), r))
                    .collect(),
            ),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let routes = self.routes.lock().expect("routes mutex");
        match routes.get(url) {
            Some(Ok(body)) => Ok(TransportResponse {
                status: 200,
                body: body.clone(),
                retry_after: None,
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(TransportResponse {
                status: 404,
                body: String::new(),
                retry_after: None,
            }),
        }
    }
}

#[derive(Default)]
struct VecSink {
    emitted: Mutex<Vec<Article>>,
}

impl VecSink {
    fn articles(&self) -> Vec<Article> {
        self.emitted.lock().expect("sink mutex").clone()
    }
}

#[async_trait]
impl ArticleSink for VecSink {
    async fn emit(&self, article: Article) {
        self.emitted.lock().expect("sink mutex").push(article);
    }
}

fn config(toml: &str) -> PipelineConfig {
    PipelineConfig::from_toml_str(toml).expect("test config parses")
}

fn coordinator(cfg: PipelineConfig, transport: RoutedTransport) -> Coordinator {
    Coordinator::new(
        cfg,
        Arc::new(transport),
        Arc::new(DictionaryExtractor::with_defaults()),
    )
}

#[tokio::test(start_paused = true)]
async fn bad_candidate_is_dropped_and_the_cycle_continues() {
    let cfg = config(
        r#"
        [rate_limit]
        min_interval_ms = 0

        [[sources]]
        name = "wire"
        kind = "rss"
        feed_urls = ["https://news.example.test/rss.xml"]
        "#,
    );
    let transport = RoutedTransport::new(vec![
        (
            "https://news.example.test/rss.xml",
            Ok(include_str!("fixtures/feed_mixed.xml").to_string()),
        ),
        // The summary-less item links here; the page never answers.
        (
            "https://news.example.test/markets/broken.html",
            Err(FetchError::Network("connection refused".into())),
        ),
    ]);

    let coord = coordinator(cfg, transport);
    let sink = Arc::new(VecSink::default());
    let stats = coord.run_once(sink.clone()).await;

    let (_, wire) = stats
        .iter()
        .find(|(name, _)| name == "wire")
        .expect("stats for the wire source");
    assert_eq!(wire.discovered, 2);
    assert_eq!(wire.emitted, 1);
    assert_eq!(wire.dropped, 1);
    assert_eq!(wire.deduped, 0);

    let articles = sink.articles();
    assert_eq!(articles.len(), 1);
    let a = &articles[0];
    assert_eq!(a.title, "Fed signals possible rate cut later this year");
    assert!(a.body.contains("rate cut may come later this year"));
    assert!(a.published_at.is_some());
    assert!(!a.keywords.is_empty());
    assert!(a.score > 0.0);
}

#[tokio::test(start_paused = true)]
async fn repeated_cycle_emits_nothing_new() {
    let cfg = config(
        r#"
        [rate_limit]
        min_interval_ms = 0

        [[sources]]
        name = "wire"
        kind = "rss"
        feed_urls = ["https://news.example.test/rss.xml"]
        "#,
    );
    let transport = RoutedTransport::new(vec![(
        "https://news.example.test/rss.xml",
        Ok(include_str!("fixtures/feed_alpha.xml").to_string()),
    )]);

    let coord = coordinator(cfg, transport);
    let sink = Arc::new(VecSink::default());
    coord.run_once(sink.clone()).await;
    let stats = coord.run_once(sink.clone()).await;

    assert_eq!(sink.articles().len(), 1);
    let (_, second) = &stats[0];
    assert_eq!(second.emitted, 0);
    assert_eq!(second.deduped, 1);
}

#[tokio::test(start_paused = true)]
async fn same_story_across_sources_is_emitted_once() {
    let cfg = config(
        r#"
        [rate_limit]
        min_interval_ms = 0

        [[sources]]
        name = "alpha"
        kind = "rss"
        feed_urls = ["https://alpha.example.test/rss.xml"]

        [[sources]]
        name = "beta"
        kind = "rss"
        feed_urls = ["https://beta.example.test/rss.xml"]
        "#,
    );
    let transport = RoutedTransport::new(vec![
        (
            "https://alpha.example.test/rss.xml",
            Ok(include_str!("fixtures/feed_alpha.xml").to_string()),
        ),
        (
            "https://beta.example.test/rss.xml",
            Ok(include_str!("fixtures/feed_beta.xml").to_string()),
        ),
    ]);

    let coord = coordinator(cfg, transport);
    let sink = Arc::new(VecSink::default());
    let stats = coord.run_once(sink.clone()).await;

    // Both sources see the story; exactly one copy reaches the sink.
    assert_eq!(sink.articles().len(), 1);
    let emitted: usize = stats.iter().map(|(_, s)| s.emitted).sum();
    let deduped: usize = stats.iter().map(|(_, s)| s.deduped).sum();
    assert_eq!(emitted, 1);
    assert_eq!(deduped, 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_source_is_disabled_and_the_rest_run() {
    let cfg = config(
        r#"
        [rate_limit]
        min_interval_ms = 0

        [[sources]]
        name = "broken"
        kind = "rss"
        feed_urls = []

        [[sources]]
        name = "wire"
        kind = "rss"
        feed_urls = ["https://alpha.example.test/rss.xml"]
        "#,
    );
    let transport = RoutedTransport::new(vec![(
        "https://alpha.example.test/rss.xml",
        Ok(include_str!("fixtures/feed_alpha.xml").to_string()),
    )]);

    let coord = coordinator(cfg, transport);
    assert_eq!(coord.enabled_sources(), 1);

    let sink = Arc::new(VecSink::default());
    coord.run_once(sink.clone()).await;
    assert_eq!(sink.articles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_shutdown_sender_stops_the_scheduler() {
    let cfg = config(
        r#"
        [rate_limit]
        min_interval_ms = 0

        [scheduler]
        poll_interval_secs = 300

        [[sources]]
        name = "wire"
        kind = "rss"
        feed_urls = ["https://alpha.example.test/rss.xml"]
        "#,
    );
    let transport = RoutedTransport::new(vec![(
        "https://alpha.example.test/rss.xml",
        Ok(include_str!("fixtures/feed_alpha.xml").to_string()),
    )]);
    let calls = transport.call_count();

    let coord = Arc::new(coordinator(cfg, transport));
    let sink = Arc::new(VecSink::default());

    // Drop-as-cancel: no sender means no one can ever signal shutdown, so
    // the scheduler must wind down instead of re-polling in a tight loop.
    let (tx, rx) = watch::channel(false);
    drop(tx);

    let run = {
        let coord = coord.clone();
        let sink = sink.clone();
        tokio::spawn(async move { coord.run(sink, rx).await })
    };
    tokio::time::timeout(std::time::Duration::from_secs(30), run)
        .await
        .expect("scheduler exits on its own")
        .expect("scheduler task completes");

    // One poll cycle, one feed fetch, one article delivered.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.articles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scheduler_starts_polls_and_stops_cleanly() {
    let cfg = config(
        r#"
        [rate_limit]
        min_interval_ms = 0

        [scheduler]
        poll_interval_secs = 3600
        shutdown_grace_secs = 5

        [[sources]]
        name = "wire"
        kind = "rss"
        feed_urls = ["https://alpha.example.test/rss.xml"]
        "#,
    );
    let transport = RoutedTransport::new(vec![(
        "https://alpha.example.test/rss.xml",
        Ok(include_str!("fixtures/feed_alpha.xml").to_string()),
    )]);

    let coord = Arc::new(coordinator(cfg, transport));
    let sink = Arc::new(VecSink::default());
    let handle = coord.start(sink.clone());

    // Let the first cycle and the sink forwarder run.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    handle.stop().await;

    assert_eq!(sink.articles().len(), 1);
}
