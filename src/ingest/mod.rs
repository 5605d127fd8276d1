// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod types;

use crate::ingest::config::FeedRegistry;
use crate::ingest::types::{Item, RawEntry, SourceFetcher};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Headlines accepted into a batch.");
        describe_counter!(
            "ingest_dedup_total",
            "Entries dropped because their identity key was already accepted."
        );
        describe_counter!(
            "ingest_empty_total",
            "Entries dropped because their title was empty."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Sources skipped because of fetch/parse errors."
        );
        describe_histogram!("ingest_fetch_ms", "Per-source fetch time in milliseconds.");
    });
}

/// Counters describing one collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub kept: usize,
    pub duplicates: usize,
    pub empty: usize,
    pub skipped_sources: Vec<String>,
}

/// Build one ordered, deduplicated batch from per-source entries.
///
/// `per_source` is in source-iteration order; entries within a source are in
/// feed order. At most `per_source_cap` items are accepted from each source,
/// and an entry is skipped when its identity key (link, else trimmed title)
/// was already accepted from any source.
pub fn collect_batch(
    per_source: Vec<(String, Vec<RawEntry>)>,
    per_source_cap: usize,
) -> (Vec<Item>, CollectStats) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut batch = Vec::new();
    let mut stats = CollectStats::default();

    for (source, entries) in per_source {
        let mut taken = 0usize;
        for entry in entries {
            if taken >= per_source_cap {
                break;
            }
            let text = entry.title.as_deref().map(str::trim).unwrap_or_default();
            if text.is_empty() {
                stats.empty += 1;
                continue;
            }
            let link = entry.link.filter(|l| !l.trim().is_empty());
            let item = Item {
                text: text.to_string(),
                source: source.clone(),
                link,
            };
            if !seen.insert(item.identity_key().to_string()) {
                stats.duplicates += 1;
                continue;
            }
            batch.push(item);
            taken += 1;
        }
    }

    stats.kept = batch.len();
    (batch, stats)
}

/// Fetch every registry source once, in registry order. Failing sources are
/// logged and left out; they never abort the others.
pub async fn fetch_all(
    fetcher: &dyn SourceFetcher,
    registry: &FeedRegistry,
) -> (Vec<(String, Vec<RawEntry>)>, Vec<String>) {
    ensure_metrics_described();

    let mut out = Vec::with_capacity(registry.len());
    let mut skipped = Vec::new();
    for source in registry.sources() {
        let t0 = std::time::Instant::now();
        match fetcher.fetch(source).await {
            Ok(entries) => {
                tracing::debug!(
                    target: "ingest",
                    source = %source.name,
                    entries = entries.len(),
                    "source fetched"
                );
                out.push((source.name.clone(), entries));
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, source = %source.name, "source skipped");
                counter!("ingest_source_errors_total").increment(1);
                skipped.push(source.name.clone());
            }
        }
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    }
    (out, skipped)
}

/// Fetch all sources and collapse them into one batch.
pub async fn collect(
    fetcher: &dyn SourceFetcher,
    registry: &FeedRegistry,
    per_source_cap: usize,
) -> (Vec<Item>, CollectStats) {
    let (per_source, skipped) = fetch_all(fetcher, registry).await;
    let (batch, mut stats) = collect_batch(per_source, per_source_cap);
    stats.skipped_sources = skipped;

    counter!("ingest_items_total").increment(stats.kept as u64);
    counter!("ingest_dedup_total").increment(stats.duplicates as u64);
    counter!("ingest_empty_total").increment(stats.empty as u64);

    tracing::info!(
        target: "ingest",
        kept = stats.kept,
        duplicates = stats.duplicates,
        empty = stats.empty,
        skipped = stats.skipped_sources.len(),
        "headlines collected"
    );
    (batch, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, link: Option<&str>) -> RawEntry {
        RawEntry {
            title: Some(title.to_string()),
            link: link.map(str::to_string),
        }
    }

    #[test]
    fn cross_source_dedup_by_link_keeps_first_seen() {
        let input = vec![
            ("Zeit".to_string(), vec![entry("A", Some("https://x/1"))]),
            (
                "FAZ".to_string(),
                vec![entry("A (FAZ copy)", Some("https://x/1")), entry("B", None)],
            ),
        ];
        let (batch, stats) = collect_batch(input, 5);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].source, "Zeit");
        assert_eq!(batch[0].text, "A");
        assert_eq!(batch[1].text, "B");
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn dedup_by_trimmed_text_without_links() {
        let input = vec![
            ("Zeit".to_string(), vec![entry("  Same headline ", None)]),
            ("TAZ".to_string(), vec![entry("Same headline", None)]),
        ];
        let (batch, stats) = collect_batch(input, 5);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].text, "Same headline");
        assert_eq!(batch[0].source, "Zeit");
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn cap_counts_accepted_entries_only() {
        let input = vec![(
            "n-tv".to_string(),
            vec![
                entry("", None),
                entry("first", None),
                entry("first", None),
                entry("second", None),
                entry("third", None),
            ],
        )];
        let (batch, stats) = collect_batch(input, 2);
        let texts: Vec<&str> = batch.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn whitespace_titles_and_missing_titles_are_skipped() {
        let input = vec![(
            "Focus".to_string(),
            vec![
                entry("   \t", None),
                RawEntry {
                    title: None,
                    link: Some("https://x/2".into()),
                },
            ],
        )];
        let (batch, stats) = collect_batch(input, 3);
        assert!(batch.is_empty());
        assert_eq!(stats.empty, 2);
    }

    #[test]
    fn empty_sources_give_empty_batch() {
        let (batch, stats) = collect_batch(vec![("Stern".into(), vec![])], 1);
        assert!(batch.is_empty());
        assert_eq!(stats, CollectStats::default());
    }

    #[test]
    fn blank_link_falls_back_to_text_key() {
        let input = vec![
            ("A".to_string(), vec![entry("Headline", Some("  "))]),
            ("B".to_string(), vec![entry("Headline", None)]),
        ];
        let (batch, _) = collect_batch(input, 1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].link, None);
    }
}
