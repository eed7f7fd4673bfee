//! In-process backend with the service's semantics
//!
//! Used by tests and demos. Requests, notifications and chat messages live in
//! plain vectors behind one mutex, in insertion order, the way the service
//! keeps them.
//!
//! By default every write echoes the stored record. [`MemoryBackend::acknowledging`]
//! builds a backend that only acknowledges writes, which exercises the
//! re-fetch paths of the lifecycle and chat session.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::DealsBackend;
use crate::error::{DealsError, Result};
use crate::models::{
    ChatMessage, CreateOutcome, MessageId, NewTradeRequest, Notification, OutgoingMessage,
    RequestFilter, RequestId, RequestStatus, SellerRecord, SendOutcome, TradeRequest,
    TransitionOutcome,
};
use crate::room::RoomId;

#[derive(Debug, Default)]
struct MemoryState {
    requests: Vec<TradeRequest>,
    notifications: Vec<Notification>,
    messages: Vec<ChatMessage>,
    sellers: Vec<SellerRecord>,
    next_message_seq: u64,
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    acknowledge_only: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose writes answer with bare acknowledgements
    pub fn acknowledging() -> Self {
        Self {
            acknowledge_only: true,
            ..Self::default()
        }
    }

    /// Sellers returned by [`DealsBackend::recommend`], in the given order
    pub fn with_sellers(self, sellers: Vec<SellerRecord>) -> Self {
        self.state.lock().sellers = sellers;
        self
    }

    /// Insert a request as-is, bypassing validation
    pub fn seed_request(&self, request: TradeRequest) {
        self.state.lock().requests.push(request);
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    fn transition(&self, id: &RequestId, target: RequestStatus) -> Result<TransitionOutcome> {
        let mut state = self.state.lock();
        let request = state
            .requests
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| DealsError::InvalidTransition {
                id: id.clone(),
                from: None,
            })?;

        if !request.status.can_transition_to(target) {
            return Err(DealsError::InvalidTransition {
                id: id.clone(),
                from: Some(request.status),
            });
        }

        request.status = target;
        debug!("Request {} moved to {}", id, target);

        if self.acknowledge_only {
            Ok(TransitionOutcome::Acknowledged {
                tx_hash: request.tx_hash.clone(),
            })
        } else {
            Ok(TransitionOutcome::Updated(request.clone()))
        }
    }
}

fn require(fields: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DealsError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

#[async_trait]
impl DealsBackend for MemoryBackend {
    async fn create_request(&self, request: &NewTradeRequest) -> Result<CreateOutcome> {
        require(&[
            ("farmer_id", request.farmer_id.as_str()),
            ("farmer_name", request.farmer_name.as_str()),
            ("crop", request.crop.as_str()),
            ("region", request.region.as_str()),
            ("seller_id", request.seller_id.as_str()),
        ])?;

        let created = TradeRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            farmer_id: request.farmer_id.clone(),
            farmer_name: request.farmer_name.clone(),
            seller_id: request.seller_id.clone(),
            seller_name: request.seller_name.clone(),
            crop: request.crop.clone(),
            region: request.region.clone(),
            price: request.price,
            status: RequestStatus::Pending,
            timestamp: Utc::now(),
            tx_hash: None,
        };

        {
            let mut state = self.state.lock();
            state.requests.push(created.clone());
            state.notifications.push(Notification::for_request(request));
        }
        info!("Stored request {} for seller {}", created.id, created.seller_id);

        if self.acknowledge_only {
            Ok(CreateOutcome::Acknowledged {
                request_id: Some(created.id),
            })
        } else {
            Ok(CreateOutcome::Created(created))
        }
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<TradeRequest>> {
        Ok(self
            .state
            .lock()
            .requests
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn accept_request(&self, id: &RequestId) -> Result<TransitionOutcome> {
        self.transition(id, RequestStatus::Accepted)
    }

    async fn reject_request(&self, id: &RequestId) -> Result<TransitionOutcome> {
        self.transition(id, RequestStatus::Rejected)
    }

    async fn delete_request(&self, id: &RequestId) -> Result<()> {
        let mut state = self.state.lock();
        let before = state.requests.len();
        state.requests.retain(|r| &r.id != id);
        if state.requests.len() == before {
            debug!("Delete of unknown request {} treated as done", id);
        }
        Ok(())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SendOutcome> {
        require(&[
            ("sender", message.sender.as_str()),
            ("receiver", message.receiver.as_str()),
            ("text", message.text.as_str()),
            ("room", message.room.as_str()),
        ])?;

        let stored = {
            let mut state = self.state.lock();
            state.next_message_seq += 1;
            let stored = ChatMessage {
                id: MessageId(format!("m{:012}", state.next_message_seq)),
                room: message.room.to_string(),
                sender: message.sender.clone(),
                receiver: message.receiver.clone(),
                text: message.text.clone(),
                timestamp: Utc::now(),
            };
            state.messages.push(stored.clone());
            stored
        };

        if self.acknowledge_only {
            Ok(SendOutcome::Acknowledged)
        } else {
            Ok(SendOutcome::Persisted(stored))
        }
    }

    async fn chat_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>> {
        Ok(self
            .state
            .lock()
            .messages
            .iter()
            .filter(|m| m.room == room.as_str())
            .cloned()
            .collect())
    }

    async fn notifications(&self, seller_id: &str) -> Result<Vec<Notification>> {
        Ok(self
            .state
            .lock()
            .notifications
            .iter()
            .filter(|n| n.to == seller_id)
            .cloned()
            .collect())
    }

    async fn recommend(&self, _crop: &str, _region: &str) -> Result<Vec<SellerRecord>> {
        Ok(self.state.lock().sellers.clone())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}
