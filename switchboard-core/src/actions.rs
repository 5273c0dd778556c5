//! OS action vocabulary
//!
//! Actions are the unit of UI mutation: tools publish them on the
//! [`crate::emitter::ActionEmitter`], the per-session window registry applies
//! them in emission order, and clients receive them inside `ACTIONS` events.
//! They are plain serializable values, safe to record and replay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Screen-space placement of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Renderer plus payload for a window body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowContent {
    /// Renderer kind (`text`, `markdown`, `html`, `iframe`, ...). Open set.
    pub renderer: String,
    /// Renderer-specific payload.
    pub data: String,
}

impl WindowContent {
    pub fn new(renderer: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            renderer: renderer.into(),
            data: data.into(),
        }
    }

    /// Convenience constructor for plain-text content.
    pub fn text(data: impl Into<String>) -> Self {
        Self::new("text", data)
    }
}

/// Operation kind for `window.updateContent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentOpKind {
    Replace,
    Append,
    Prepend,
    InsertAt,
    Clear,
}

/// An incremental content edit carried by `window.updateContent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentOp {
    pub op: ContentOpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Character offset for [`ContentOpKind::InsertAt`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl ContentOp {
    pub fn replace(data: impl Into<String>) -> Self {
        Self {
            op: ContentOpKind::Replace,
            data: Some(data.into()),
            position: None,
        }
    }

    pub fn append(data: impl Into<String>) -> Self {
        Self {
            op: ContentOpKind::Append,
            data: Some(data.into()),
            position: None,
        }
    }

    pub fn prepend(data: impl Into<String>) -> Self {
        Self {
            op: ContentOpKind::Prepend,
            data: Some(data.into()),
            position: None,
        }
    }

    pub fn insert_at(position: usize, data: impl Into<String>) -> Self {
        Self {
            op: ContentOpKind::InsertAt,
            data: Some(data.into()),
            position: Some(position),
        }
    }

    pub fn clear() -> Self {
        Self {
            op: ContentOpKind::Clear,
            data: None,
            position: None,
        }
    }
}

/// Confirmation-dialog options that mark a permission request.
///
/// A `dialog.confirm` carrying these is routed to the client as an
/// `APPROVAL_REQUEST` event instead of a plain `ACTIONS` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOptions {
    /// Offer a "remember this choice" checkbox.
    #[serde(default)]
    pub show_remember_choice: bool,
    /// Identifier the approval decision is keyed under when remembered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_key: Option<String>,
}

/// The OS action union consumed by the desktop UI.
///
/// Serialized with dotted `type` tags (`window.create`, `toast.show`, ...)
/// matching the client protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OsAction {
    #[serde(rename = "window.create")]
    WindowCreate {
        id: String,
        title: String,
        bounds: Bounds,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<WindowContent>,
        #[serde(
            rename = "appProtocol",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        app_protocol: Option<String>,
    },

    #[serde(rename = "window.close")]
    WindowClose { id: String },

    #[serde(rename = "window.setTitle")]
    WindowSetTitle { id: String, title: String },

    #[serde(rename = "window.setContent")]
    WindowSetContent { id: String, content: WindowContent },

    #[serde(rename = "window.updateContent")]
    WindowUpdateContent { id: String, operation: ContentOp },

    #[serde(rename = "window.move")]
    WindowMove { id: String, x: i32, y: i32 },

    #[serde(rename = "window.resize")]
    WindowResize { id: String, width: u32, height: u32 },

    #[serde(rename = "window.lock")]
    WindowLock {
        id: String,
        #[serde(
            rename = "lockedBy",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        locked_by: Option<String>,
    },

    #[serde(rename = "window.unlock")]
    WindowUnlock { id: String },

    #[serde(rename = "notification.show")]
    NotificationShow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        message: String,
    },

    #[serde(rename = "toast.show")]
    ToastShow {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
    },

    #[serde(rename = "dialog.confirm")]
    DialogConfirm {
        #[serde(rename = "dialogId")]
        dialog_id: String,
        title: String,
        message: String,
        #[serde(
            rename = "confirmText",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        confirm_text: Option<String>,
        #[serde(
            rename = "cancelText",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        cancel_text: Option<String>,
        #[serde(
            rename = "permissionOptions",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        permission_options: Option<PermissionOptions>,
    },

    #[serde(rename = "desktop.createShortcut")]
    DesktopCreateShortcut {
        id: String,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
        target: Value,
    },
}

impl OsAction {
    /// The window id this action targets, if it targets one.
    pub fn window_id(&self) -> Option<&str> {
        match self {
            Self::WindowCreate { id, .. }
            | Self::WindowClose { id }
            | Self::WindowSetTitle { id, .. }
            | Self::WindowSetContent { id, .. }
            | Self::WindowUpdateContent { id, .. }
            | Self::WindowMove { id, .. }
            | Self::WindowResize { id, .. }
            | Self::WindowLock { id, .. }
            | Self::WindowUnlock { id } => Some(id),
            _ => None,
        }
    }

    /// True when this is a `dialog.confirm` carrying permission options.
    pub fn is_permission_request(&self) -> bool {
        matches!(
            self,
            Self::DialogConfirm {
                permission_options: Some(_),
                ..
            }
        )
    }

    /// One-line human description, used for task summaries and transcripts.
    pub fn describe(&self) -> String {
        match self {
            Self::WindowCreate { id, title, .. } => {
                format!("created window {} (\"{}\")", id, title)
            }
            Self::WindowClose { id } => format!("closed window {}", id),
            Self::WindowSetTitle { id, title } => {
                format!("retitled window {} to \"{}\"", id, title)
            }
            Self::WindowSetContent { id, content } => {
                format!("set {} content of window {}", content.renderer, id)
            }
            Self::WindowUpdateContent { id, operation } => {
                format!("updated content of window {} ({:?})", id, operation.op)
            }
            Self::WindowMove { id, x, y } => format!("moved window {} to ({}, {})", id, x, y),
            Self::WindowResize { id, width, height } => {
                format!("resized window {} to {}x{}", id, width, height)
            }
            Self::WindowLock { id, .. } => format!("locked window {}", id),
            Self::WindowUnlock { id } => format!("unlocked window {}", id),
            Self::NotificationShow { message, .. } => {
                format!("showed notification \"{}\"", message)
            }
            Self::ToastShow { message, .. } => format!("showed toast \"{}\"", message),
            Self::DialogConfirm { title, .. } => format!("asked \"{}\"", title),
            Self::DesktopCreateShortcut { label, .. } => {
                format!("created shortcut \"{}\"", label)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_tags() {
        let action = OsAction::WindowCreate {
            id: "w1".into(),
            title: "Notes".into(),
            bounds: Bounds::new(0, 0, 400, 300),
            content: None,
            app_protocol: None,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "window.create");
        assert_eq!(json["bounds"]["width"], 400);

        let action = OsAction::WindowUpdateContent {
            id: "w1".into(),
            operation: ContentOp::insert_at(3, "abc"),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "window.updateContent");
        assert_eq!(json["operation"]["op"], "insertAt");
        assert_eq!(json["operation"]["position"], 3);
    }

    #[test]
    fn test_action_round_trip() {
        let action = OsAction::DialogConfirm {
            dialog_id: "d1".into(),
            title: "Allow?".into(),
            message: "The agent wants to fetch a URL".into(),
            confirm_text: Some("Allow".into()),
            cancel_text: None,
            permission_options: Some(PermissionOptions {
                show_remember_choice: true,
                grant_key: Some("fetch".into()),
            }),
        };
        let json = serde_json::to_string(&action).unwrap();
        let back: OsAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
        assert!(back.is_permission_request());
    }

    #[test]
    fn test_window_id_extraction() {
        let action = OsAction::WindowMove {
            id: "w7".into(),
            x: 10,
            y: 20,
        };
        assert_eq!(action.window_id(), Some("w7"));

        let action = OsAction::ToastShow {
            message: "done".into(),
            variant: None,
        };
        assert_eq!(action.window_id(), None);
    }
}
