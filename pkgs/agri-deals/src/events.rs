//! Events surfaced to whoever renders deals and chats

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::RequestId;
use crate::room::RoomId;

/// Events emitted by chat sessions and the deal board
#[derive(Debug, Clone, PartialEq)]
pub enum DealEvent {
    /// A history fetch replaced the transcript of `room`
    TranscriptUpdated { room: RoomId, messages: usize },
    /// The accepted-deal snapshot was refreshed
    DealsUpdated { count: usize },
    /// A chat session was bound to a deal
    ChatOpened { deal_id: RequestId, room: RoomId },
    /// The chat session for `room` stopped polling
    ChatClosed { room: RoomId },
    /// Non-fatal failure the user should see; state is left unchanged
    Error { context: String, message: String },
}

/// Sending half of the event channel.
///
/// Emitting never fails: with no receiver attached, or after the receiver is
/// dropped, events are discarded.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<DealEvent>>,
}

impl EventSink {
    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DealEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: DealEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                debug!("Event receiver dropped, discarding event");
            }
        }
    }

    /// Emit a user-visible error notification
    pub fn error(&self, context: &str, message: impl ToString) {
        self.emit(DealEvent::Error {
            context: context.to_string(),
            message: message.to_string(),
        });
    }
}
