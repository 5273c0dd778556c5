//! Window state registry
//!
//! The per-session authoritative model of open windows. The registry is
//! mutated only by applying OS actions in their emitted order, which makes a
//! recorded action sequence replayable against an empty registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::actions::{Bounds, ContentOp, ContentOpKind, OsAction, WindowContent};

/// Invalid window mutations, returned to the invoking tool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("no such window: {0}")]
    UnknownWindow(String),

    #[error("window already exists: {0}")]
    DuplicateWindow(String),
}

/// Authoritative record for one open window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    pub id: String,
    pub title: String,
    pub bounds: Bounds,
    pub content: Option<WindowContent>,
    pub locked: bool,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub app_protocol: Option<String>,
}

type CloseCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Per-session window registry.
///
/// External readers see consistent snapshots at action boundaries; all
/// mutation goes through [`apply`](WindowRegistry::apply).
pub struct WindowRegistry {
    windows: RwLock<BTreeMap<String, WindowRecord>>,
    on_close: RwLock<Vec<CloseCallback>>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(BTreeMap::new()),
            on_close: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback fired with the window id after each close.
    ///
    /// The context pool wires reload-cache invalidation through this.
    pub fn on_close(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.on_close.write().push(Box::new(callback));
    }

    /// Apply one action. Non-window actions are accepted and ignored.
    pub fn apply(&self, action: &OsAction) -> Result<(), StateError> {
        let closed = {
            let mut windows = self.windows.write();
            match action {
                OsAction::WindowCreate {
                    id,
                    title,
                    bounds,
                    content,
                    app_protocol,
                } => {
                    if windows.contains_key(id) {
                        return Err(StateError::DuplicateWindow(id.clone()));
                    }
                    let now = Utc::now();
                    windows.insert(
                        id.clone(),
                        WindowRecord {
                            id: id.clone(),
                            title: title.clone(),
                            bounds: *bounds,
                            content: content.clone(),
                            locked: false,
                            locked_by: None,
                            created_at: now,
                            updated_at: now,
                            app_protocol: app_protocol.clone(),
                        },
                    );
                    None
                }
                OsAction::WindowClose { id } => {
                    if windows.remove(id).is_none() {
                        return Err(StateError::UnknownWindow(id.clone()));
                    }
                    Some(id.clone())
                }
                OsAction::WindowSetTitle { id, title } => {
                    let record = get_mut(&mut windows, id)?;
                    record.title = title.clone();
                    record.updated_at = Utc::now();
                    None
                }
                OsAction::WindowSetContent { id, content } => {
                    let record = get_mut(&mut windows, id)?;
                    record.content = Some(content.clone());
                    record.updated_at = Utc::now();
                    None
                }
                OsAction::WindowUpdateContent { id, operation } => {
                    let record = get_mut(&mut windows, id)?;
                    let content = record
                        .content
                        .get_or_insert_with(|| WindowContent::text(""));
                    apply_content_op(content, operation);
                    record.updated_at = Utc::now();
                    None
                }
                OsAction::WindowMove { id, x, y } => {
                    let record = get_mut(&mut windows, id)?;
                    record.bounds.x = *x;
                    record.bounds.y = *y;
                    record.updated_at = Utc::now();
                    None
                }
                OsAction::WindowResize { id, width, height } => {
                    let record = get_mut(&mut windows, id)?;
                    record.bounds.width = *width;
                    record.bounds.height = *height;
                    record.updated_at = Utc::now();
                    None
                }
                OsAction::WindowLock { id, locked_by } => {
                    let record = get_mut(&mut windows, id)?;
                    record.locked = true;
                    record.locked_by = locked_by.clone();
                    record.updated_at = Utc::now();
                    None
                }
                OsAction::WindowUnlock { id } => {
                    let record = get_mut(&mut windows, id)?;
                    record.locked = false;
                    record.locked_by = None;
                    record.updated_at = Utc::now();
                    None
                }
                _ => None,
            }
        };

        if let Some(id) = closed {
            for callback in self.on_close.read().iter() {
                callback(&id);
            }
        }
        Ok(())
    }

    /// Apply a recorded sequence in order, stopping at the first error.
    pub fn apply_all<'a>(
        &self,
        actions: impl IntoIterator<Item = &'a OsAction>,
    ) -> Result<(), StateError> {
        for action in actions {
            self.apply(action)?;
        }
        Ok(())
    }

    /// Cloned records of all open windows, ordered by id.
    pub fn snapshot(&self) -> Vec<WindowRecord> {
        self.windows.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<WindowRecord> {
        self.windows.read().get(id).cloned()
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.windows.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.read().is_empty()
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn get_mut<'a>(
    windows: &'a mut BTreeMap<String, WindowRecord>,
    id: &str,
) -> Result<&'a mut WindowRecord, StateError> {
    windows
        .get_mut(id)
        .ok_or_else(|| StateError::UnknownWindow(id.to_string()))
}

fn apply_content_op(content: &mut WindowContent, operation: &ContentOp) {
    let data = operation.data.as_deref().unwrap_or("");
    match operation.op {
        ContentOpKind::Replace => content.data = data.to_string(),
        ContentOpKind::Append => content.data.push_str(data),
        ContentOpKind::Prepend => content.data = format!("{}{}", data, content.data),
        ContentOpKind::InsertAt => {
            let position = operation.position.unwrap_or(content.data.len());
            // Positions are character offsets; clamp past-the-end inserts.
            let byte_pos = content
                .data
                .char_indices()
                .nth(position)
                .map(|(i, _)| i)
                .unwrap_or(content.data.len());
            content.data.insert_str(byte_pos, data);
        }
        ContentOpKind::Clear => content.data.clear(),
    }
}
