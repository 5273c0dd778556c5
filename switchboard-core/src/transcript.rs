//! Session transcript
//!
//! An append-only record of everything a session's agents said and did.
//! Entries are kept in memory for restore prompts; when a file is attached,
//! each entry is also appended as one JSON line by a single writer task,
//! preserving append order. Write failures are logged, never fatal.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// What a transcript entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptKind {
    Prompt,
    Response,
    Thinking,
    Action,
    Tool,
    Error,
}

/// One recorded transcript line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    /// Role of the agent the entry belongs to (`main`, `task-…`, …).
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub kind: TranscriptKind,
    pub payload: Value,
}

/// Append-only session record.
pub struct Transcript {
    entries: Mutex<Vec<TranscriptEntry>>,
    writer: Option<mpsc::UnboundedSender<String>>,
}

impl Transcript {
    /// In-memory transcript.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            writer: None,
        }
    }

    /// Transcript that also appends JSON lines to `path`.
    ///
    /// Must be called within a tokio runtime; the writer task lives until
    /// the transcript is dropped.
    pub fn with_file(path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            if let Some(parent) = path.parent() {
                if let Err(error) = tokio::fs::create_dir_all(parent).await {
                    tracing::warn!(path = %path.display(), %error, "transcript dir create failed");
                    return;
                }
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await;
            let mut file = match file {
                Ok(f) => f,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "transcript open failed");
                    return;
                }
            };
            while let Some(line) = rx.recv().await {
                if let Err(error) = file.write_all(line.as_bytes()).await {
                    tracing::warn!(path = %path.display(), %error, "transcript write failed");
                    return;
                }
            }
        });
        Self {
            entries: Mutex::new(Vec::new()),
            writer: Some(tx),
        }
    }

    /// Append one entry.
    pub fn append(&self, agent_id: &str, kind: TranscriptKind, payload: Value) {
        let entry = TranscriptEntry {
            timestamp: Utc::now(),
            agent_id: agent_id.to_string(),
            kind,
            payload,
        };
        if let Some(writer) = &self.writer {
            if let Ok(mut line) = serde_json::to_string(&entry) {
                line.push('\n');
                let _ = writer.send(line);
            }
        }
        self.entries.lock().push(entry);
    }

    /// All entries recorded so far.
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// The most recent prompt payload, used for restore summaries.
    pub fn last_prompt(&self) -> Option<TranscriptEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.kind == TranscriptKind::Prompt)
            .cloned()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_preserves_order() {
        let transcript = Transcript::new();
        transcript.append("main", TranscriptKind::Prompt, json!("open notes"));
        transcript.append("main", TranscriptKind::Response, json!("done"));

        let entries = transcript.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, TranscriptKind::Prompt);
        assert_eq!(entries[1].kind, TranscriptKind::Response);
    }

    #[test]
    fn test_last_prompt() {
        let transcript = Transcript::new();
        assert!(transcript.last_prompt().is_none());

        transcript.append("main", TranscriptKind::Prompt, json!("first"));
        transcript.append("main", TranscriptKind::Response, json!("ok"));
        transcript.append("main", TranscriptKind::Prompt, json!("second"));

        let last = transcript.last_prompt().unwrap();
        assert_eq!(last.payload, json!("second"));
    }

    #[tokio::test]
    async fn test_file_backed_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");

        let transcript = Transcript::with_file(path.clone());
        transcript.append("main", TranscriptKind::Prompt, json!("hello"));
        transcript.append("task-1", TranscriptKind::Action, json!({"type": "toast.show"}));

        // The writer task runs asynchronously; poll for the lines.
        let mut content = String::new();
        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if content.lines().count() == 2 {
                break;
            }
        }
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: TranscriptEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.agent_id, "main");
    }
}
