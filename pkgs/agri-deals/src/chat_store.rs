//! Chat store - typed client view over the backend's chat operations

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::backend::DealsBackend;
use crate::error::{DealsError, Result};
use crate::models::{ChatMessage, OutgoingMessage, SendOutcome};
use crate::room::{derive_room, RoomId};

/// Chat store
#[derive(Clone)]
pub struct ChatStore {
    backend: Arc<dyn DealsBackend>,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn DealsBackend>) -> Self {
        Self { backend }
    }

    /// Build a message for `sender` → `receiver`, deriving the room
    pub fn compose(sender: &str, receiver: &str, text: &str) -> Result<OutgoingMessage> {
        let room = derive_room(sender, receiver)?;
        Ok(OutgoingMessage {
            sender: sender.trim().to_string(),
            receiver: receiver.trim().to_string(),
            text: text.to_string(),
            room,
        })
    }

    /// Send a message.
    ///
    /// Empty text and a room that does not match the participants are both
    /// rejected before the backend is called.
    #[instrument(skip(self, message), fields(room = %message.room))]
    pub async fn send(&self, message: &OutgoingMessage) -> Result<SendOutcome> {
        if message.text.trim().is_empty() {
            return Err(DealsError::Validation("message text is empty".into()));
        }

        let expected = derive_room(&message.sender, &message.receiver)?;
        if expected != message.room {
            return Err(DealsError::InvalidParticipant(format!(
                "room {} does not belong to {} and {}",
                message.room, message.sender, message.receiver
            )));
        }

        let outcome = self.backend.send_message(message).await?;
        if let SendOutcome::Persisted(stored) = &outcome {
            debug!("Message {} persisted", stored.id);
        }
        Ok(outcome)
    }

    /// Full history of `room`, oldest first.
    ///
    /// A malformed room key yields an empty history without touching the
    /// backend. Duplicate ids and messages from other rooms are dropped.
    pub async fn history(&self, room: &str) -> Result<Vec<ChatMessage>> {
        let Some(room) = RoomId::parse(room) else {
            debug!("Skipping history fetch for malformed room key {:?}", room);
            return Ok(Vec::new());
        };

        let fetched = self.backend.chat_history(&room).await?;
        Ok(clean_history(&room, fetched))
    }
}

fn clean_history(room: &RoomId, fetched: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let total = fetched.len();
    let mut seen = HashSet::with_capacity(total);

    let mut messages: Vec<ChatMessage> = fetched
        .into_iter()
        .filter(|m| m.room == room.as_str())
        .filter(|m| seen.insert(m.id.clone()))
        .collect();

    if messages.len() != total {
        warn!(
            "Dropped {} foreign or duplicate messages from room {}",
            total - messages.len(),
            room
        );
    }

    // Stable, so same-second messages keep server order
    messages.sort_by_key(|m| m.timestamp);
    messages
}
