//! Ticker detection over normalized feed items.

use regex::Regex;
use std::collections::BTreeSet;

use crate::ingest::types::{FeedItem, NewsHit};

/// Precompiled whole-word, case-insensitive matchers for a set of symbols.
#[derive(Debug, Clone)]
pub struct TickerDetector {
    matchers: Vec<(String, Regex)>,
}

impl TickerDetector {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut matchers = Vec::new();
        for sym in symbols {
            let sym = sym.as_ref().trim().to_ascii_uppercase();
            if sym.is_empty() || !seen.insert(sym.clone()) {
                continue;
            }
            // `\b` fails next to symbols ending in punctuation (e.g. "BF.B"),
            // so word boundaries are spelled out as non-word neighbours.
            let pattern = format!(r"(?i)(?:^|[^\p{{L}}\p{{N}}_]){}(?:$|[^\p{{L}}\p{{N}}_])", regex::escape(&sym));
            match Regex::new(&pattern) {
                Ok(re) => matchers.push((sym, re)),
                Err(e) => tracing::warn!(symbol = %sym, error = %e, "skipping unmatchable symbol"),
            }
        }
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Symbols mentioned in the item's title or summary.
    pub fn detect(&self, item: &FeedItem) -> BTreeSet<String> {
        let text = format!("{}\n{}", item.title, item.summary_text);
        self.matchers
            .iter()
            .filter(|(_, re)| re.is_match(&text))
            .map(|(sym, _)| sym.clone())
            .collect()
    }

    /// Tag items and keep only candidates: at least one ticker and a
    /// parseable timestamp.
    pub fn candidates(&self, items: Vec<FeedItem>) -> Vec<NewsHit> {
        items
            .into_iter()
            .filter_map(|item| {
                let tickers = self.detect(&item);
                NewsHit::candidate(item, tickers)
            })
            .collect()
    }
}

/// One-off detection against an ad-hoc symbol set.
pub fn detect(item: &FeedItem, tracked: &BTreeSet<String>) -> BTreeSet<String> {
    TickerDetector::new(tracked).detect(item)
}
