//! Request fingerprints
//!
//! A fingerprint is a similarity-comparable key over a task's normalized
//! content, its character-trigram bag, and a stable hash of the window
//! state the request was made against. The reload cache scores candidate
//! entries by fingerprint similarity.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::windows::WindowRecord;

const TITLE_HASH_LEN: usize = 40;

/// Similarity-comparable request key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hex sha256 of the normalized content.
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    /// Unique character trigrams of the normalized content.
    pub trigrams: BTreeSet<String>,
    /// Stable digest over `(id, renderer, truncated title)` of open windows.
    #[serde(rename = "windowHash")]
    pub window_hash: String,
}

impl Fingerprint {
    /// Fingerprint `content` against the given window-state snapshot.
    pub fn compute(content: &str, windows: &[WindowRecord]) -> Self {
        let normalized = normalize(content);
        Self {
            content_hash: hex_sha256(normalized.as_bytes()),
            trigrams: trigrams(&normalized),
            window_hash: window_state_hash(windows),
        }
    }

    /// Weighted similarity in `[0, 1]`.
    ///
    /// `0.7 · jaccard(trigrams) + 0.3 · [window hashes equal]`, symmetric,
    /// and equal to 1 exactly when content hash, trigrams, and window hash
    /// all match. Near-misses (distinct texts can share a trigram set) cap
    /// at 0.99.
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        if self.is_exact_match(other) {
            return 1.0;
        }
        let content_sim = jaccard(&self.trigrams, &other.trigrams);
        let window_sim = if self.window_hash == other.window_hash {
            1.0
        } else {
            0.0
        };
        (0.7 * content_sim + 0.3 * window_sim).clamp(0.0, 0.99)
    }

    /// True when every component matches.
    pub fn is_exact_match(&self, other: &Fingerprint) -> bool {
        self.content_hash == other.content_hash
            && self.window_hash == other.window_hash
            && self.trigrams == other.trigrams
    }
}

/// Collapse whitespace and case-fold.
pub fn normalize(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Unique character trigrams of an (already normalized) string.
///
/// Strings shorter than three characters contribute themselves as a single
/// gram so they remain comparable.
pub fn trigrams(normalized: &str) -> BTreeSet<String> {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return BTreeSet::new();
    }
    if chars.len() < 3 {
        return BTreeSet::from([normalized.to_string()]);
    }
    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Stable digest of the output-relevant window state.
///
/// Only fields that could steer the model's output participate: ids,
/// renderer kinds, and titles (truncated). Window order does not matter;
/// triples are sorted by id.
pub fn window_state_hash(windows: &[WindowRecord]) -> String {
    let mut triples: Vec<(String, String, String)> = windows
        .iter()
        .map(|w| {
            let renderer = w
                .content
                .as_ref()
                .map(|c| c.renderer.clone())
                .unwrap_or_default();
            let title: String = w.title.chars().take(TITLE_HASH_LEN).collect();
            (w.id.clone(), renderer, title)
        })
        .collect();
    triples.sort();

    let mut hasher = Sha256::new();
    for (id, renderer, title) in &triples {
        hasher.update(id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(renderer.as_bytes());
        hasher.update([0x1f]);
        hasher.update(title.as_bytes());
        hasher.update([0x1e]);
    }
    hex_encode(hasher.finalize().as_slice())
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn hex_sha256(bytes: &[u8]) -> String {
    hex_encode(Sha256::digest(bytes).as_slice())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
