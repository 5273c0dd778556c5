//! Reload cache
//!
//! A per-session, content-addressed store of previously produced action
//! sequences. When a new request fingerprints close enough to a prior one,
//! the context pool offers the recorded sequence to the model as a replay
//! candidate instead of recomputing from scratch.
//!
//! The cache is loaded lazily from its per-session file on first access;
//! writes are serialized and asynchronous, and a failed write is logged,
//! never fatal.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::actions::OsAction;
use crate::config::PoolConfig;
use crate::fingerprint::Fingerprint;

const CACHE_FILE_VERSION: u32 = 1;
const LABEL_MAX_CHARS: usize = 50;

/// One recorded action sequence with its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    /// Human-readable, at most 50 characters, derived from the task.
    pub label: String,
    pub fingerprint: Fingerprint,
    pub actions: Vec<OsAction>,
    /// Windows that must still be open for the entry to be replayable.
    #[serde(
        rename = "requiredWindowIds",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub required_window_ids: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastHitAt")]
    pub last_hit_at: DateTime<Utc>,
    #[serde(default)]
    pub hits: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// A scored lookup result.
#[derive(Debug, Clone)]
pub struct ReloadMatch {
    pub entry_id: String,
    pub label: String,
    pub score: f64,
    pub is_exact: bool,
    pub actions: Vec<OsAction>,
    pub required_window_ids: Vec<String>,
}

/// Per-session fingerprint-indexed action cache, LRU by last hit.
pub struct ReloadCache {
    path: Option<PathBuf>,
    max_entries: usize,
    similarity_floor: f64,
    entries: Mutex<Option<Vec<CacheEntry>>>,
    write_lock: Arc<Mutex<()>>,
    scheduled_generation: Arc<AtomicU64>,
}

impl ReloadCache {
    /// Cache backed by `path`; pass `None` for a memory-only cache.
    pub fn new(path: Option<PathBuf>, config: &PoolConfig) -> Self {
        Self {
            path,
            max_entries: config.max_cache_entries_per_session,
            similarity_floor: config.reload_similarity_floor,
            entries: Mutex::new(None),
            write_lock: Arc::new(Mutex::new(())),
            scheduled_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Top `limit` entries scoring at or above the similarity floor,
    /// best first. Returned entries count as hits for LRU purposes.
    pub async fn find_matches(&self, fingerprint: &Fingerprint, limit: usize) -> Vec<ReloadMatch> {
        let mut guard = self.entries.lock().await;
        let entries = self.ensure_loaded(&mut guard).await;

        let mut scored: Vec<(f64, usize)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (fingerprint.similarity(&e.fingerprint), i))
            .filter(|(score, _)| *score >= self.similarity_floor)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let now = Utc::now();
        scored
            .into_iter()
            .map(|(score, i)| {
                let entry = &mut entries[i];
                entry.last_hit_at = now;
                entry.hits += 1;
                ReloadMatch {
                    entry_id: entry.id.clone(),
                    label: entry.label.clone(),
                    score,
                    is_exact: score >= 1.0,
                    actions: entry.actions.clone(),
                    required_window_ids: entry.required_window_ids.clone(),
                }
            })
            .collect()
    }

    /// Insert an entry, coalescing into an existing one on an exact
    /// fingerprint match. Evicts least-recently-hit entries beyond the cap.
    pub async fn record(
        &self,
        fingerprint: Fingerprint,
        actions: Vec<OsAction>,
        label: &str,
        required_window_ids: Vec<String>,
    ) {
        let mut guard = self.entries.lock().await;
        let entries = self.ensure_loaded(&mut guard).await;
        let now = Utc::now();

        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.fingerprint.is_exact_match(&fingerprint))
        {
            existing.actions = actions;
            existing.required_window_ids = required_window_ids;
            existing.last_hit_at = now;
            existing.hits += 1;
        } else {
            entries.push(CacheEntry {
                id: uuid::Uuid::new_v4().to_string(),
                label: derive_label(label),
                fingerprint,
                actions,
                required_window_ids,
                created_at: now,
                last_hit_at: now,
                hits: 0,
            });
            if entries.len() > self.max_entries {
                entries.sort_by_key(|e| e.last_hit_at);
                let excess = entries.len() - self.max_entries;
                entries.drain(..excess);
            }
        }

        self.schedule_save(entries.clone());
    }

    /// Drop every entry that requires the closed window.
    pub async fn invalidate_window(&self, window_id: &str) {
        let mut guard = self.entries.lock().await;
        let entries = self.ensure_loaded(&mut guard).await;
        let before = entries.len();
        entries.retain(|e| !e.required_window_ids.iter().any(|id| id == window_id));
        if entries.len() != before {
            tracing::debug!(
                window_id,
                dropped = before - entries.len(),
                "invalidated reload entries"
            );
            self.schedule_save(entries.clone());
        }
    }

    /// Current entry count.
    pub async fn len(&self) -> usize {
        let mut guard = self.entries.lock().await;
        self.ensure_loaded(&mut guard).await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the current contents to disk and wait for completion.
    ///
    /// Normal operation relies on the asynchronous scheduled writes; this
    /// exists for shutdown and tests.
    pub async fn persist(&self) {
        let snapshot = {
            let mut guard = self.entries.lock().await;
            self.ensure_loaded(&mut guard).await.clone()
        };
        let Some(path) = self.path.clone() else {
            return;
        };
        let generation = self.scheduled_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _serialized = self.write_lock.lock().await;
        if self.scheduled_generation.load(Ordering::SeqCst) == generation {
            write_cache_file(&path, &snapshot).await;
        }
    }

    async fn ensure_loaded<'a>(
        &self,
        guard: &'a mut tokio::sync::MutexGuard<'_, Option<Vec<CacheEntry>>>,
    ) -> &'a mut Vec<CacheEntry> {
        if guard.is_none() {
            let loaded = match &self.path {
                Some(path) => match tokio::fs::read(path).await {
                    Ok(bytes) => match serde_json::from_slice::<CacheFile>(&bytes) {
                        Ok(file) => file.entries,
                        Err(error) => {
                            tracing::warn!(path = %path.display(), %error, "discarding unreadable reload cache");
                            Vec::new()
                        }
                    },
                    // A missing file is the normal first-run case.
                    Err(_) => Vec::new(),
                },
                None => Vec::new(),
            };
            **guard = Some(loaded);
        }
        guard.get_or_insert_with(Vec::new)
    }

    fn schedule_save(&self, snapshot: Vec<CacheEntry>) {
        let Some(path) = self.path.clone() else {
            return;
        };
        let write_lock = self.write_lock.clone();
        let scheduled = self.scheduled_generation.clone();
        let generation = scheduled.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(async move {
            let _serialized = write_lock.lock().await;
            // A newer snapshot is queued behind us; let it do the writing.
            if scheduled.load(Ordering::SeqCst) != generation {
                return;
            }
            write_cache_file(&path, &snapshot).await;
        });
    }
}

async fn write_cache_file(path: &PathBuf, entries: &[CacheEntry]) {
    let file = CacheFile {
        version: CACHE_FILE_VERSION,
        entries: entries.to_vec(),
    };
    let result = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&file)?;
        tokio::fs::write(path, json).await?;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    }
    .await;
    if let Err(error) = result {
        tracing::warn!(path = %path.display(), %error, "reload cache write failed");
    }
}

/// Shorten task content into a cache-entry label (at most 50 characters).
pub fn derive_label(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= LABEL_MAX_CHARS {
        collapsed
    } else {
        let mut label: String = collapsed.chars().take(LABEL_MAX_CHARS - 1).collect();
        label.push('…');
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Bounds, OsAction};

    fn cache() -> ReloadCache {
        ReloadCache::new(None, &PoolConfig::default())
    }

    fn create_action(id: &str) -> OsAction {
        OsAction::WindowCreate {
            id: id.to_string(),
            title: "Notes".into(),
            bounds: Bounds::new(0, 0, 300, 200),
            content: None,
            app_protocol: None,
        }
    }

    #[tokio::test]
    async fn test_record_and_exact_match() {
        let cache = cache();
        let fp = Fingerprint::compute("open notes", &[]);
        cache
            .record(fp.clone(), vec![create_action("w1")], "open notes", vec![])
            .await;

        let matches = cache.find_matches(&fp, 3).await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 1.0);
        assert!(matches[0].is_exact);
        assert_eq!(matches[0].label, "open notes");
    }

    #[tokio::test]
    async fn test_floor_filters_unrelated_content() {
        let cache = cache();
        let fp = Fingerprint::compute("open notes", &[]);
        cache
            .record(fp, vec![create_action("w1")], "open notes", vec![])
            .await;

        let unrelated = Fingerprint::compute("play some jazz", &[]);
        assert!(cache.find_matches(&unrelated, 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_exact_record_coalesces() {
        let cache = cache();
        let fp = Fingerprint::compute("open notes", &[]);
        cache
            .record(fp.clone(), vec![create_action("w1")], "open notes", vec![])
            .await;
        cache
            .record(
                fp.clone(),
                vec![create_action("w2")],
                "open notes",
                vec!["w2".into()],
            )
            .await;

        assert_eq!(cache.len().await, 1);
        let matches = cache.find_matches(&fp, 3).await;
        assert_eq!(matches[0].required_window_ids, vec!["w2".to_string()]);
    }

    #[tokio::test]
    async fn test_lru_eviction_beyond_cap() {
        let config = PoolConfig {
            max_cache_entries_per_session: 2,
            ..PoolConfig::default()
        };
        let cache = ReloadCache::new(None, &config);

        let first = Fingerprint::compute("first task", &[]);
        let second = Fingerprint::compute("second task", &[]);
        let third = Fingerprint::compute("third task", &[]);

        cache.record(first.clone(), vec![], "first task", vec![]).await;
        cache.record(second, vec![], "second task", vec![]).await;
        // Touch "first" so "second" is the LRU victim.
        cache.find_matches(&first, 1).await;
        cache.record(third.clone(), vec![], "third task", vec![]).await;

        assert_eq!(cache.len().await, 2);
        assert!(!cache.find_matches(&first, 1).await.is_empty());
        assert!(!cache.find_matches(&third, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_window_drops_dependents() {
        let cache = cache();
        let fp = Fingerprint::compute("open notes", &[]);
        cache
            .record(
                fp.clone(),
                vec![create_action("w1")],
                "open notes",
                vec!["w1".into()],
            )
            .await;
        let other = Fingerprint::compute("different thing entirely", &[]);
        cache.record(other, vec![], "different thing entirely", vec![]).await;

        cache.invalidate_window("w1").await;

        assert!(cache.find_matches(&fp, 3).await.is_empty());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = PoolConfig::default();

        let fp = Fingerprint::compute("open notes", &[]);
        {
            let cache = ReloadCache::new(Some(path.clone()), &config);
            cache
                .record(
                    fp.clone(),
                    vec![create_action("w1")],
                    "open notes",
                    vec!["w1".into()],
                )
                .await;
            cache.persist().await;
        }

        let reloaded = ReloadCache::new(Some(path), &config);
        let matches = reloaded.find_matches(&fp, 3).await;
        assert_eq!(matches.len(), 1);
        assert!(matches[0].is_exact);
        assert_eq!(matches[0].actions.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let cache = ReloadCache::new(Some(path), &PoolConfig::default());
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_derive_label_truncates() {
        assert_eq!(derive_label("short  task"), "short task");
        let long = "x".repeat(80);
        let label = derive_label(&long);
        assert_eq!(label.chars().count(), 50);
        assert!(label.ends_with('…'));
    }
}
