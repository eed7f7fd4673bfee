//! Narrow interface to the service that owns requests and chat history
//!
//! The backend is the sole source of truth. Nothing in this crate caches or
//! merges backend state beyond the latest snapshot it fetched.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ChatMessage, CreateOutcome, NewTradeRequest, Notification, OutgoingMessage, RequestFilter,
    RequestId, SellerRecord, SendOutcome, TradeRequest, TransitionOutcome,
};
use crate::room::RoomId;

/// Operations the deal core needs from its backend.
///
/// Implementations map their own failures onto [`crate::DealsError`]:
/// accepting or rejecting a request that is not pending is
/// `InvalidTransition`, everything network-shaped is `Transport`.
#[async_trait]
pub trait DealsBackend: Send + Sync {
    /// Store a new pending request. Not idempotent: two calls create two rows.
    async fn create_request(&self, request: &NewTradeRequest) -> Result<CreateOutcome>;

    /// Snapshot of the requests matching `filter`
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<TradeRequest>>;

    async fn accept_request(&self, id: &RequestId) -> Result<TransitionOutcome>;

    async fn reject_request(&self, id: &RequestId) -> Result<TransitionOutcome>;

    /// Remove a request in any state. Removing a missing id succeeds.
    async fn delete_request(&self, id: &RequestId) -> Result<()>;

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SendOutcome>;

    /// Messages of `room`, oldest first. Unknown rooms yield an empty list.
    async fn chat_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>>;

    /// Notifications queued for a seller
    async fn notifications(&self, seller_id: &str) -> Result<Vec<Notification>>;

    /// Sellers suggested for a crop and region, already ranked by the service
    async fn recommend(&self, crop: &str, region: &str) -> Result<Vec<SellerRecord>>;

    /// Liveness probe
    async fn health(&self) -> Result<()>;
}
