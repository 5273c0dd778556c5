//! The per-turn tool-action bridge
//!
//! Tools publish OS actions on the shared emitter without knowing which
//! agent turn they belong to. For the duration of one turn, the bridge
//! subscribes on the agent's behalf: it keeps only emissions tagged for
//! this agent (and monitor), records them into the turn buffer, rewrites
//! the outbound `agentId` to the agent's current role, and translates each
//! action into the matching server event.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::actions::OsAction;
use crate::emitter::{ActionEmitter, SubscriptionId};
use crate::events::{EventSink, ServerEvent};
use crate::transcript::{Transcript, TranscriptKind};

pub(crate) struct TurnBridge {
    emitter: Arc<ActionEmitter>,
    subscription: Option<SubscriptionId>,
    buffer: Arc<Mutex<Vec<OsAction>>>,
}

impl TurnBridge {
    /// Subscribe to the emitter for one turn.
    pub(crate) fn install(
        emitter: Arc<ActionEmitter>,
        instance_id: String,
        monitor_id: Option<String>,
        role: String,
        sink: Arc<dyn EventSink>,
        transcript: Arc<Transcript>,
    ) -> Self {
        let buffer: Arc<Mutex<Vec<OsAction>>> = Arc::new(Mutex::new(Vec::new()));

        let recorded = buffer.clone();
        let subscription = emitter.subscribe(move |tagged| {
            if let Some(origin) = &tagged.tags.agent_id {
                if *origin != instance_id {
                    return;
                }
            }
            if let (Some(target), Some(own)) = (&tagged.tags.monitor_id, &monitor_id) {
                if target != own {
                    return;
                }
            }

            recorded.lock().push(tagged.action.clone());
            transcript.append(
                &role,
                TranscriptKind::Action,
                serde_json::to_value(&tagged.action).unwrap_or_default(),
            );
            sink.send(translate(&tagged.action, &role, monitor_id.as_deref()));
        });

        Self {
            emitter,
            subscription: Some(subscription),
            buffer,
        }
    }

    /// Actions recorded so far, in emission order.
    pub(crate) fn actions(&self) -> Vec<OsAction> {
        self.buffer.lock().clone()
    }
}

impl Drop for TurnBridge {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.emitter.unsubscribe(subscription);
        }
    }
}

/// Turn an action into its outbound event, rewriting the agent identity.
///
/// A `dialog.confirm` carrying permission options becomes a dedicated
/// `APPROVAL_REQUEST`; everything else flows as `ACTIONS`.
fn translate(action: &OsAction, role: &str, monitor_id: Option<&str>) -> ServerEvent {
    if let OsAction::DialogConfirm {
        dialog_id,
        title,
        message,
        confirm_text,
        cancel_text,
        permission_options: Some(options),
    } = action
    {
        return ServerEvent::ApprovalRequest {
            dialog_id: dialog_id.clone(),
            title: title.clone(),
            message: message.clone(),
            confirm_text: confirm_text.clone(),
            cancel_text: cancel_text.clone(),
            permission_options: Some(options.clone()),
            agent_id: role.to_string(),
        };
    }

    ServerEvent::Actions {
        actions: vec![action.clone()],
        agent_id: role.to_string(),
        monitor_id: monitor_id.map(str::to_string),
    }
}
