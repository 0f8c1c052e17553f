// src/pipeline.rs
//! The coordinator. One worker per enabled source cycling IDLE → POLLING →
//! IDLE on the poll interval; workers share the seen-set and the pace
//! limiter, and hand accepted articles to the sink through a bounded
//! drop-oldest buffer so a slow sink never stalls the pipeline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;

use crate::article::Article;
use crate::config::PipelineConfig;
use crate::dedup::{Admission, SeenSet};
use crate::error::FetchError;
use crate::fetcher::{Fetcher, HttpTransport, Transport};
use crate::limiter::PaceLimiter;
use crate::normalize::Normalizer;
use crate::retry::RetryPolicy;
use crate::score::{DictionaryExtractor, KeywordExtractor, Scorer};
use crate::source::PreparedSource;

/// One-time metrics registration (so series show up wherever they are
/// exported).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_candidates_total", "Candidates discovered per cycle.");
        describe_counter!("ingest_emitted_total", "Articles accepted and queued for the sink.");
        describe_counter!("ingest_dedup_total", "Articles suppressed by dedup.");
        describe_counter!("ingest_dropped_total", "Candidates dropped (fetch/parse errors).");
        describe_counter!(
            "sink_backpressure_dropped_total",
            "Articles dropped from the sink buffer under backpressure."
        );
        describe_histogram!("fetch_latency_ms", "Single-attempt fetch latency.");
        describe_gauge!("ingest_last_cycle_ts", "Unix ts of the last completed cycle.");
    });
}

/// Receives accepted, non-duplicate articles. Implementations must tolerate
/// concurrent, unordered calls.
#[async_trait]
pub trait ArticleSink: Send + Sync {
    async fn emit(&self, article: Article);
}

/// Bounded handoff between workers and the sink forwarder. When the sink
/// falls behind, the oldest queued article is dropped and counted: data loss
/// is acceptable under backpressure, stalling the pipeline is not.
pub struct SinkQueue {
    inner: Mutex<VecDeque<Article>>,
    notify: Notify,
    capacity: usize,
}

impl SinkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Never blocks. Returns the article that had to be dropped, if any.
    pub fn push(&self, article: Article) -> Option<Article> {
        let dropped = {
            let mut q = self.inner.lock().expect("sink queue mutex poisoned");
            let dropped = if q.len() >= self.capacity {
                q.pop_front()
            } else {
                None
            };
            q.push_back(article);
            dropped
        };
        if let Some(old) = &dropped {
            counter!("sink_backpressure_dropped_total").increment(1);
            tracing::warn!(
                id = %old.id,
                source = %old.source,
                "sink backpressure: dropped oldest queued article"
            );
        }
        self.notify.notify_one();
        dropped
    }

    pub fn pop(&self) -> Option<Article> {
        self.inner
            .lock()
            .expect("sink queue mutex poisoned")
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("sink queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn wait_for_item(&self) {
        self.notify.notified().await;
    }
}

/// Counters for one polling cycle of one source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub discovered: usize,
    pub emitted: usize,
    pub deduped: usize,
    pub dropped: usize,
}

pub struct Coordinator {
    cfg: PipelineConfig,
    sources: Vec<Arc<PreparedSource>>,
    fetcher: Arc<Fetcher>,
    seen: Arc<SeenSet>,
    normalizer: Arc<Normalizer>,
    scorer: Arc<Scorer>,
}

impl Coordinator {
    /// Build with explicit transport and extractor (tests, embedding).
    /// Invalid sources are logged and disabled; the rest keep running.
    pub fn new(
        cfg: PipelineConfig,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn KeywordExtractor>,
    ) -> Self {
        ensure_metrics_described();

        let limiter = Arc::new(PaceLimiter::new(cfg.rate_limit.clone()));
        let mut sources = Vec::new();
        for sc in cfg.sources.iter().filter(|s| s.enabled) {
            match PreparedSource::prepare(sc) {
                Ok(prepared) => {
                    limiter.register(
                        &prepared.name,
                        prepared.min_interval_ms.map(Duration::from_millis),
                        prepared.burst,
                    );
                    sources.push(Arc::new(prepared));
                }
                Err(e) => {
                    tracing::error!(source = %sc.name, error = %e, "invalid source config; source disabled");
                }
            }
        }

        let retry = RetryPolicy::from_config(&cfg.retry);
        let fetcher = Arc::new(Fetcher::new(
            transport,
            limiter.clone(),
            retry,
            cfg.concurrency.max_in_flight_requests,
        ));
        let seen = Arc::new(SeenSet::new(&cfg.dedup));
        let normalizer = Arc::new(Normalizer::new(cfg.normalize.clone()));
        let scorer = Arc::new(Scorer::new(extractor, cfg.breaking.clone()));

        Self {
            cfg,
            sources,
            fetcher,
            seen,
            normalizer,
            scorer,
        }
    }

    /// Production constructor: reqwest transport + default dictionary.
    pub fn with_http(cfg: PipelineConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(
            &cfg.http.user_agent,
            cfg.http.timeout(),
        )?);
        Ok(Self::new(
            cfg,
            transport,
            Arc::new(DictionaryExtractor::with_defaults()),
        ))
    }

    pub fn enabled_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn seen_set(&self) -> Arc<SeenSet> {
        self.seen.clone()
    }

    /// Run exactly one polling cycle for every source, concurrently, then
    /// drain the queue into the sink. Returns per-source stats.
    pub async fn run_once(&self, sink: Arc<dyn ArticleSink>) -> Vec<(String, CycleStats)> {
        let queue = Arc::new(SinkQueue::new(self.cfg.sink.buffer_capacity));
        let (_tx, rx) = watch::channel(false);

        let cycles = self.sources.iter().map(|src| {
            let queue = queue.clone();
            let shutdown = rx.clone();
            async move {
                let stats = self.run_source_cycle(src, &queue, &shutdown).await;
                (src.name.clone(), stats)
            }
        });
        let stats = futures::future::join_all(cycles).await;

        while let Some(article) = queue.pop() {
            sink.emit(article).await;
        }
        stats
    }

    /// Start the continuous scheduler on the current runtime.
    pub fn start(self: Arc<Self>, sink: Arc<dyn ArticleSink>) -> Handle {
        let (tx, rx) = watch::channel(false);
        let grace = Duration::from_secs(self.cfg.scheduler.shutdown_grace_secs);
        let coordinator = self.clone();
        let join = tokio::spawn(async move {
            coordinator.run(sink, rx).await;
        });
        Handle {
            shutdown_tx: tx,
            join,
            grace,
        }
    }

    /// Run until `shutdown` flips to true. One task per source; a bounded
    /// forwarder feeds the sink.
    pub async fn run(&self, sink: Arc<dyn ArticleSink>, shutdown: watch::Receiver<bool>) {
        let queue = Arc::new(SinkQueue::new(self.cfg.sink.buffer_capacity));
        let poll_interval = Duration::from_secs(self.cfg.scheduler.poll_interval_secs);

        let forwarder = tokio::spawn(forward_to_sink(
            queue.clone(),
            sink,
            shutdown.clone(),
        ));

        let mut workers = JoinSet::new();
        for src in &self.sources {
            let ctx = WorkerCtx {
                source: src.clone(),
                coordinator: CoordinatorShared {
                    fetcher: self.fetcher.clone(),
                    seen: self.seen.clone(),
                    normalizer: self.normalizer.clone(),
                    scorer: self.scorer.clone(),
                    crawl: self.cfg.crawl.clone(),
                },
                queue: queue.clone(),
                poll_interval,
                shutdown: shutdown.clone(),
            };
            workers.spawn(source_worker(ctx));
        }

        while workers.join_next().await.is_some() {}
        // Workers are done; let the forwarder drain what is left.
        queue.notify.notify_one();
        let _ = forwarder.await;
        tracing::info!("coordinator stopped");
    }
}

/// Running coordinator handle: flips the shutdown signal and waits out the
/// grace period before abandoning in-flight work.
pub struct Handle {
    shutdown_tx: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
    grace: Duration,
}

impl Handle {
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if tokio::time::timeout(self.grace, &mut self.join).await.is_err() {
            tracing::warn!(
                grace_secs = self.grace.as_secs(),
                "grace period elapsed; aborting in-flight work"
            );
            self.join.abort();
        }
    }

    /// Override the configured grace period.
    pub async fn stop_with_grace(mut self, grace: Duration) {
        self.grace = grace;
        self.stop().await;
    }
}

/// State shared by every worker; everything else is source-local.
struct CoordinatorShared {
    fetcher: Arc<Fetcher>,
    seen: Arc<SeenSet>,
    normalizer: Arc<Normalizer>,
    scorer: Arc<Scorer>,
    crawl: crate::config::CrawlConfig,
}

struct WorkerCtx {
    source: Arc<PreparedSource>,
    coordinator: CoordinatorShared,
    queue: Arc<SinkQueue>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

async fn source_worker(mut ctx: WorkerCtx) {
    loop {
        if *ctx.shutdown.borrow() {
            break;
        }
        let stats =
            Coordinator::cycle_inner(&ctx.source, &ctx.coordinator, &ctx.queue, &ctx.shutdown)
                .await;

        gauge!("ingest_last_cycle_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        tracing::info!(
            source = %ctx.source.name,
            discovered = stats.discovered,
            emitted = stats.emitted,
            deduped = stats.deduped,
            dropped = stats.dropped,
            "poll cycle finished"
        );

        tokio::select! {
            _ = tokio::time::sleep(ctx.poll_interval) => {}
            changed = ctx.shutdown.changed() => {
                // A dropped sender means no one can ever resume us.
                if changed.is_err() || *ctx.shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!(source = %ctx.source.name, "source worker exiting");
}

impl Coordinator {
    async fn run_source_cycle(
        &self,
        source: &Arc<PreparedSource>,
        queue: &Arc<SinkQueue>,
        shutdown: &watch::Receiver<bool>,
    ) -> CycleStats {
        let shared = CoordinatorShared {
            fetcher: self.fetcher.clone(),
            seen: self.seen.clone(),
            normalizer: self.normalizer.clone(),
            scorer: self.scorer.clone(),
            crawl: self.cfg.crawl.clone(),
        };
        Self::cycle_inner(source, &shared, queue, shutdown).await
    }

    /// One discovery + ingest pass for one source. Per-candidate errors are
    /// logged and skipped; the cycle always runs to completion (or shutdown).
    async fn cycle_inner(
        source: &Arc<PreparedSource>,
        shared: &CoordinatorShared,
        queue: &Arc<SinkQueue>,
        shutdown: &watch::Receiver<bool>,
    ) -> CycleStats {
        let mut stats = CycleStats::default();

        let candidates = source.discover(&shared.fetcher, &shared.crawl).await;
        stats.discovered = candidates.len();
        counter!("ingest_candidates_total").increment(candidates.len() as u64);

        // Discovery order is preserved within the cycle.
        for cand in candidates {
            if *shutdown.borrow() {
                break;
            }
            let article = match shared.normalizer.normalize(&shared.fetcher, &cand).await {
                Ok(a) => a,
                Err(e) => {
                    stats.dropped += 1;
                    counter!("ingest_dropped_total", "kind" => e.kind()).increment(1);
                    match e {
                        FetchError::Parse(_) => {
                            tracing::debug!(source = %cand.source, url = %cand.url, error = %e, "candidate dropped")
                        }
                        _ => {
                            tracing::warn!(source = %cand.source, url = %cand.url, error = %e, "candidate fetch failed")
                        }
                    }
                    continue;
                }
            };

            match shared.seen.admit(&article.id, &article.title) {
                Admission::Fresh => {}
                Admission::DuplicateId => {
                    stats.deduped += 1;
                    counter!("ingest_dedup_total", "kind" => "identity").increment(1);
                    continue;
                }
                Admission::NearDuplicate { of } => {
                    stats.deduped += 1;
                    counter!("ingest_dedup_total", "kind" => "near").increment(1);
                    tracing::debug!(
                        source = %article.source,
                        id = %article.id,
                        duplicate_of = %of,
                        "near-duplicate suppressed"
                    );
                    continue;
                }
            }

            let article = shared.scorer.enrich(article);
            stats.emitted += 1;
            counter!("ingest_emitted_total").increment(1);
            queue.push(article);
        }
        stats
    }
}

async fn forward_to_sink(
    queue: Arc<SinkQueue>,
    sink: Arc<dyn ArticleSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if let Some(article) = queue.pop() {
            sink.emit(article).await;
            continue;
        }
        if *shutdown.borrow() {
            // Drained and shutting down.
            if queue.is_empty() {
                break;
            }
            continue;
        }
        tokio::select! {
            _ = queue.wait_for_item() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone; drain whatever is left and exit.
                    while let Some(article) = queue.pop() {
                        sink.emit(article).await;
                    }
                    break;
                }
            }
        }
    }
}
