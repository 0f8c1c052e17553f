// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod article;
pub mod config;
pub mod dedup;
pub mod discover;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod limiter;
pub mod normalize;
pub mod pipeline;
pub mod retry;
pub mod rss;
pub mod score;
pub mod source;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::article::{Article, WeightedTerm};
pub use crate::config::PipelineConfig;
pub use crate::error::FetchError;
pub use crate::pipeline::{ArticleSink, Coordinator, CycleStats};
pub use crate::score::{DictionaryExtractor, KeywordExtractor};
pub use crate::source::Candidate;
