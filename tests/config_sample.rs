// tests/config_sample.rs
// The shipped sample config and keyword dictionary must stay loadable.

use fintech_news_ingest::config::SourceKind;
use fintech_news_ingest::{DictionaryExtractor, KeywordExtractor, PipelineConfig};

#[test]
fn shipped_pipeline_toml_parses() {
    let cfg = PipelineConfig::from_toml_str(include_str!("../config/pipeline.toml"))
        .expect("sample config parses");
    assert_eq!(cfg.sources.len(), 3);
    assert!(cfg
        .sources
        .iter()
        .any(|s| matches!(s.kind, SourceKind::Crawl { .. })));
    for s in &cfg.sources {
        s.validate().expect("sample sources validate");
    }
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.scheduler.poll_interval_secs, 300);
}

#[test]
fn shipped_keyword_dictionary_parses() {
    let ex = DictionaryExtractor::from_json_str(include_str!("../config/keywords.json"))
        .expect("sample dictionary parses");
    let terms = ex.extract("Inflation fears trigger a rate hike debate");
    assert!(terms.iter().any(|t| t.term == "inflation"));
    assert!(terms.iter().any(|t| t.term == "rate hike"));
}
