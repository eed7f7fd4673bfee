//! Chat session - keeps a local transcript equal to a recent server snapshot
//!
//! # Polling
//!
//! Opening a session fetches the room history at once and then every
//! `chat_poll_interval`. Each successful fetch replaces the transcript
//! wholesale; there is no incremental merge.
//!
//! # Stale responses
//!
//! Fetches can overlap (a scheduled tick and the refresh after a send). Each
//! fetch is stamped with the room epoch and a sequence number when it is
//! issued. A response is applied only if its epoch is still current, its
//! sequence is newer than the last applied one and the session is open.
//!
//! # Closing
//!
//! [`ChatSession::close`] is synchronous. It cancels the poller and marks the
//! transcript closed, so no fetch is issued and no response is applied
//! afterwards. A [`SessionCloser`] does the same from another task, which is
//! how a background deal refresh ends the chat of a deal that disappeared.
//! A closed session stays closed; open a new one to chat again.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat_store::ChatStore;
use crate::error::{DealsError, Result};
use crate::events::{DealEvent, EventSink};
use crate::models::{ChatMessage, OutgoingMessage, SendOutcome};
use crate::room::{derive_room, RoomId};
use crate::scheduler::Poller;

/// Observable state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, no fetch in flight
    Idle,
    /// Open, at least one fetch in flight
    Polling,
    /// Closed; nothing more is fetched or applied
    Closed,
}

#[derive(Debug)]
struct TranscriptState {
    room: RoomId,
    epoch: u64,
    next_seq: u64,
    applied_seq: u64,
    in_flight: u32,
    closed: bool,
    messages: Vec<ChatMessage>,
}

/// Ticket handed out when a fetch is issued
#[derive(Debug, Clone)]
struct FetchTicket {
    room: RoomId,
    epoch: u64,
    seq: u64,
}

#[derive(Debug)]
struct Transcript {
    state: Mutex<TranscriptState>,
    updates: watch::Sender<Vec<ChatMessage>>,
}

impl Transcript {
    fn new(room: RoomId) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            state: Mutex::new(TranscriptState {
                room,
                epoch: 0,
                next_seq: 1,
                applied_seq: 0,
                in_flight: 0,
                closed: false,
                messages: Vec::new(),
            }),
            updates,
        }
    }

    fn begin_fetch(&self) -> Option<FetchTicket> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.in_flight += 1;
        Some(FetchTicket {
            room: state.room.clone(),
            epoch: state.epoch,
            seq,
        })
    }

    fn end_fetch(&self, ticket: &FetchTicket) {
        let mut state = self.state.lock();
        if state.epoch == ticket.epoch {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }

    /// Replace the transcript if the ticket is still current
    fn apply(&self, ticket: &FetchTicket, messages: Vec<ChatMessage>) -> bool {
        let snapshot = {
            let mut state = self.state.lock();
            if state.epoch == ticket.epoch {
                state.in_flight = state.in_flight.saturating_sub(1);
            }
            if state.closed || state.epoch != ticket.epoch || ticket.seq <= state.applied_seq {
                debug!(
                    "Discarding stale history for {} (seq {}, applied {})",
                    ticket.room, ticket.seq, state.applied_seq
                );
                return false;
            }
            state.applied_seq = ticket.seq;
            state.messages = messages;
            state.messages.clone()
        };

        self.updates.send_replace(snapshot);
        true
    }

    /// Show a message the backend just persisted before the next fetch lands
    fn echo(&self, message: ChatMessage) {
        let snapshot = {
            let mut state = self.state.lock();
            if state.closed
                || message.room != state.room.as_str()
                || state.messages.iter().any(|m| m.id == message.id)
            {
                return;
            }
            state.messages.push(message);
            state.messages.clone()
        };

        self.updates.send_replace(snapshot);
    }

    /// Move to a new room: start a new epoch and clear the transcript
    fn rebind(&self, room: RoomId) {
        {
            let mut state = self.state.lock();
            state.room = room;
            state.epoch += 1;
            state.applied_seq = state.next_seq - 1;
            state.in_flight = 0;
            state.messages.clear();
        }
        self.updates.send_replace(Vec::new());
    }

    fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = !state.closed;
        state.closed = true;
        state.in_flight = 0;
        was_open
    }
}

/// Mark the transcript closed and announce it once
fn shut(transcript: &Transcript, events: &EventSink) {
    if transcript.close() {
        let room = transcript.state.lock().room.clone();
        info!("Chat session for room {} closed", room);
        events.emit(DealEvent::ChatClosed { room });
    }
}

/// Closes a [`ChatSession`] from outside its owner.
///
/// Cancelling stops the session's poller at its next suspension point and
/// marks the transcript closed, so late responses are discarded.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    shutdown: CancellationToken,
    transcript: Arc<Transcript>,
    events: EventSink,
}

impl SessionCloser {
    pub fn close(&self) {
        self.shutdown.cancel();
        shut(&self.transcript, &self.events);
    }

    pub fn is_closed(&self) -> bool {
        self.transcript.state.lock().closed
    }
}

/// Fetch history once and apply it if still current
async fn fetch_into(chat: &ChatStore, transcript: &Transcript, events: &EventSink) {
    let Some(ticket) = transcript.begin_fetch() else {
        return;
    };

    match chat.history(ticket.room.as_str()).await {
        Ok(messages) => {
            let count = messages.len();
            if transcript.apply(&ticket, messages) {
                events.emit(DealEvent::TranscriptUpdated {
                    room: ticket.room.clone(),
                    messages: count,
                });
            }
        }
        Err(e) => {
            transcript.end_fetch(&ticket);
            warn!("History fetch for {} failed: {}", ticket.room, e);
            events.error("chat history", &e);
        }
    }
}

/// Polling chat session bound to one room
pub struct ChatSession {
    chat: ChatStore,
    self_id: String,
    partner_id: String,
    interval: Duration,
    transcript: Arc<Transcript>,
    poller: Option<Poller>,
    shutdown: CancellationToken,
    events: EventSink,
}

impl ChatSession {
    /// Derive the room for `self_id` and `partner_id` and start polling it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        chat: ChatStore,
        self_id: &str,
        partner_id: &str,
        interval: Duration,
        events: EventSink,
    ) -> Result<Self> {
        let room = derive_room(self_id, partner_id)?;

        let mut session = Self {
            chat,
            self_id: self_id.trim().to_string(),
            partner_id: partner_id.trim().to_string(),
            interval,
            transcript: Arc::new(Transcript::new(room)),
            poller: None,
            shutdown: CancellationToken::new(),
            events,
        };
        session.start_polling();
        Ok(session)
    }

    fn start_polling(&mut self) {
        let room = self.room();
        let chat = self.chat.clone();
        let transcript = self.transcript.clone();
        let events = self.events.clone();

        self.poller = Some(Poller::spawn_with_token(
            format!("chat:{room}"),
            self.interval,
            self.shutdown.child_token(),
            move || {
                let chat = chat.clone();
                let transcript = transcript.clone();
                let events = events.clone();
                async move { fetch_into(&chat, &transcript, &events).await }
            },
        ));

        info!("Chat session polling room {}", room);
    }

    pub fn room(&self) -> RoomId {
        self.transcript.state.lock().room.clone()
    }

    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }

    pub fn state(&self) -> SessionState {
        let state = self.transcript.state.lock();
        if state.closed {
            SessionState::Closed
        } else if state.in_flight > 0 {
            SessionState::Polling
        } else {
            SessionState::Idle
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() != SessionState::Closed
    }

    /// Current transcript snapshot
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.state.lock().messages.clone()
    }

    /// Handle that closes this session from another task
    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            shutdown: self.shutdown.clone(),
            transcript: self.transcript.clone(),
            events: self.events.clone(),
        }
    }

    /// Receive every transcript replacement
    pub fn subscribe(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.transcript.updates.subscribe()
    }

    /// Fetch now, outside the schedule
    pub async fn refresh(&self) {
        fetch_into(&self.chat, &self.transcript, &self.events).await;
    }

    /// Send `text` to the partner, then refresh at once.
    ///
    /// Empty text fails with `Validation` and nothing is sent. A closed session
    /// refuses to send.
    pub async fn send_and_refresh(&self, text: &str) -> Result<SendOutcome> {
        if !self.is_open() {
            return Err(DealsError::Validation("chat session is closed".into()));
        }

        let room = self.room();
        let message = OutgoingMessage {
            sender: self.self_id.clone(),
            receiver: self.partner_id.clone(),
            text: text.to_string(),
            room,
        };

        let outcome = self.chat.send(&message).await?;
        if let SendOutcome::Persisted(stored) = &outcome {
            self.transcript.echo(stored.clone());
        }

        self.refresh().await;
        Ok(outcome)
    }

    /// Rebind to a new partner: the old cycle stops, the new one starts from
    /// an immediate fetch.
    ///
    /// If the new room cannot be derived the session is closed. A closed
    /// session cannot be switched.
    pub fn switch_partner(&mut self, partner_id: &str) -> Result<()> {
        if !self.is_open() {
            return Err(DealsError::Validation("chat session is closed".into()));
        }

        let room = match derive_room(&self.self_id, partner_id) {
            Ok(room) => room,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        self.stop_poller();
        let previous = self.room();
        self.transcript.rebind(room);
        self.partner_id = partner_id.trim().to_string();
        self.events.emit(DealEvent::ChatClosed { room: previous });
        self.start_polling();
        Ok(())
    }

    /// Stop polling. Idempotent; no backend call happens after this returns.
    pub fn close(&mut self) {
        self.stop_poller();
        self.shutdown.cancel();
        shut(&self.transcript, &self.events);
    }

    fn stop_poller(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}
