// src/dedup.rs
//! Process-wide seen-set. Two layers: exact identity (canonical hash) and
//! near-duplicate detection over normalized titles within a sliding window,
//! since the same story tends to appear near-simultaneously across sources
//! with different URLs. Check-and-mark is a single atomic operation so a race
//! between two workers resolves to exactly one winner.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::DedupConfig;

/// Why an article was (or wasn't) admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Fresh,
    DuplicateId,
    /// Near-duplicate of a previously admitted article's identity.
    NearDuplicate { of: String },
}

#[derive(Debug)]
struct RecentTitle {
    id: String,
    tokens: HashSet<String>,
    title: String,
    at: Instant,
}

#[derive(Debug)]
struct Inner {
    ids: HashMap<String, Instant>,
    recent: VecDeque<RecentTitle>,
}

/// Shared across all source workers; owned by the coordinator.
#[derive(Debug)]
pub struct SeenSet {
    inner: Mutex<Inner>,
    similarity_threshold: f64,
    window: Duration,
    retention: Duration,
}

impl SeenSet {
    pub fn new(cfg: &DedupConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ids: HashMap::new(),
                recent: VecDeque::new(),
            }),
            similarity_threshold: cfg.similarity_threshold.clamp(0.0, 1.0),
            window: Duration::from_secs(cfg.window_secs),
            retention: Duration::from_secs(cfg.retention_secs.max(cfg.window_secs)),
        }
    }

    /// Atomically check and mark. The first writer for an identity (or a
    /// near-identical title within the window) wins; later calls are
    /// suppressed without error.
    pub fn admit(&self, id: &str, title: &str) -> Admission {
        self.admit_at(id, title, Instant::now())
    }

    pub fn admit_at(&self, id: &str, title: &str, now: Instant) -> Admission {
        let mut inner = self.inner.lock().expect("seen-set mutex poisoned");
        Self::evict(&mut inner, now, self.window, self.retention);

        if inner.ids.contains_key(id) {
            return Admission::DuplicateId;
        }

        let tokens = title_tokens(title);
        let near = inner
            .recent
            .iter()
            .filter(|r| now.saturating_duration_since(r.at) <= self.window)
            .find(|r| {
                title_similarity(&tokens, title, &r.tokens, &r.title) >= self.similarity_threshold
            })
            .map(|r| r.id.clone());

        // Mark the identity either way: a suppressed duplicate must not be
        // re-admitted when its URL resurfaces next cycle.
        inner.ids.insert(id.to_string(), now);

        if let Some(of) = near {
            return Admission::NearDuplicate { of };
        }

        inner.recent.push_back(RecentTitle {
            id: id.to_string(),
            tokens,
            title: title.to_string(),
            at: now,
        });
        Admission::Fresh
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("seen-set mutex poisoned").ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(inner: &mut Inner, now: Instant, window: Duration, retention: Duration) {
        while let Some(front) = inner.recent.front() {
            if now.saturating_duration_since(front.at) > window {
                inner.recent.pop_front();
            } else {
                break;
            }
        }
        if inner.ids.len() > 10_000 {
            inner
                .ids
                .retain(|_, at| now.saturating_duration_since(*at) <= retention);
        }
    }
}

fn title_tokens(title: &str) -> HashSet<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Max of token-set Jaccard and Sørensen–Dice over the raw strings; the
/// latter catches reorderings of very short titles that tokens miss.
fn title_similarity(
    a_tokens: &HashSet<String>,
    a_title: &str,
    b_tokens: &HashSet<String>,
    b_title: &str,
) -> f64 {
    let jaccard = if a_tokens.is_empty() || b_tokens.is_empty() {
        0.0
    } else {
        let inter = a_tokens.intersection(b_tokens).count() as f64;
        let union = a_tokens.union(b_tokens).count() as f64;
        inter / union
    };
    let dice = strsim::sorensen_dice(&a_title.to_lowercase(), &b_title.to_lowercase());
    jaccard.max(dice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen() -> SeenSet {
        SeenSet::new(&DedupConfig {
            similarity_threshold: 0.6,
            window_secs: 1_800,
            retention_secs: 86_400,
        })
    }

    #[test]
    fn exact_identity_admitted_once() {
        let s = seen();
        assert_eq!(s.admit("id1", "Fed holds rates"), Admission::Fresh);
        assert_eq!(s.admit("id1", "Fed holds rates"), Admission::DuplicateId);
    }

    #[test]
    fn near_identical_titles_are_suppressed_across_sources() {
        let s = seen();
        assert_eq!(
            s.admit("id-reuters", "Fed holds interest rates at two-decade high"),
            Admission::Fresh
        );
        let second = s.admit(
            "id-other",
            "Fed holds interest rates at a two-decade high",
        );
        assert_eq!(
            second,
            Admission::NearDuplicate {
                of: "id-reuters".to_string()
            }
        );
        // The suppressed identity is still marked.
        assert_eq!(
            s.admit("id-other", "anything"),
            Admission::DuplicateId
        );
    }

    #[test]
    fn unrelated_titles_pass() {
        let s = seen();
        assert_eq!(s.admit("a", "Oil prices slide on supply"), Admission::Fresh);
        assert_eq!(
            s.admit("b", "Tech shares rally after earnings beat"),
            Admission::Fresh
        );
    }

    #[test]
    fn near_duplicates_expire_outside_the_window() {
        let s = seen();
        let t0 = Instant::now();
        assert_eq!(
            s.admit_at("a", "Fed holds interest rates steady", t0),
            Admission::Fresh
        );
        // Same story 31 minutes later is treated as a fresh item.
        let later = t0 + Duration::from_secs(1_860);
        assert_eq!(
            s.admit_at("b", "Fed holds interest rates steady", later),
            Admission::Fresh
        );
    }
}
