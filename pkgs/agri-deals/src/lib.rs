//! Agri Deals - trade request lifecycle and deal chat for AgriConnect
//!
//! Farmers raise trade requests to producer collectives (sellers). A seller
//! accepts or rejects each request, and every accepted request becomes a deal
//! with its own chat room. This crate owns the state and invariants of that
//! flow; storage lives behind the [`DealsBackend`] trait.
//!
//! # Architecture
//!
//! - **room**: canonical room key for two participant ids
//! - **RequestStore** / **ChatStore**: typed, validating client views of the backend
//! - **RequestLifecycle**: pending → accepted | rejected, delete from any state
//! - **ChatSession**: polling loop keeping a transcript equal to server history
//! - **DealBoard**: accepted deals for the local user, one chat session at a time
//! - **MemoryBackend**: in-process backend with the same semantics as the service
//!
//! # Consistency
//!
//! The backend is the only source of truth. Writes are confirmed by the next
//! read, transcripts are replaced wholesale on every fetch, and responses that
//! arrive out of order are discarded.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agri_deals::{DealBoard, DealsConfig, EventSink, Identity, MemoryBackend};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(MemoryBackend::new());
//! let (events, mut rx) = EventSink::channel();
//!
//! let mut board = DealBoard::new(
//!     backend,
//!     Identity::farmer("F001"),
//!     DealsConfig::default(),
//!     events,
//! )?;
//! board.start();
//!
//! for deal in board.refresh().await? {
//!     println!("{} • {}", deal.crop, deal.region);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod board;
pub mod chat_store;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod memory;
pub mod models;
pub mod request_store;
pub mod room;
pub mod scheduler;
pub mod session;

pub use backend::DealsBackend;
pub use board::{ActiveChat, DealBoard};
pub use chat_store::ChatStore;
pub use error::{DealsError, Result};
pub use events::{DealEvent, EventSink};
pub use lifecycle::RequestLifecycle;
pub use memory::MemoryBackend;
pub use models::{
    ChatMessage, CreateOutcome, Identity, MessageId, NewTradeRequest, Notification,
    OutgoingMessage, RequestFilter, RequestId, RequestStatus, Role, SellerRecord, SendOutcome,
    TradeRequest, TransitionOutcome,
};
pub use request_store::RequestStore;
pub use room::{derive_room, is_valid_room_key, RoomId};
pub use scheduler::Poller;
pub use session::{ChatSession, SessionCloser, SessionState};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest accepted-deal staleness the board tolerates
pub const MAX_DEAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for the deal core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealsConfig {
    /// Base URL of the backend API (default: http://127.0.0.1:5000/api)
    pub api_base_url: String,

    /// Interval between chat history fetches (default: 2s)
    pub chat_poll_interval: Duration,

    /// Interval between accepted-deal refreshes (default: 3s, at most 5s)
    pub deal_poll_interval: Duration,

    /// Timeout for a single backend call (default: 10s)
    pub request_timeout: Duration,
}

impl Default for DealsConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000/api".to_string(),
            chat_poll_interval: Duration::from_secs(2),
            deal_poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl DealsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(DealsError::Validation("api_base_url must not be empty".into()));
        }
        if self.chat_poll_interval.is_zero() || self.deal_poll_interval.is_zero() {
            return Err(DealsError::Validation("poll intervals must be non-zero".into()));
        }
        if self.deal_poll_interval > MAX_DEAL_POLL_INTERVAL {
            return Err(DealsError::Validation(format!(
                "deal_poll_interval {:?} exceeds {:?}",
                self.deal_poll_interval, MAX_DEAL_POLL_INTERVAL
            )));
        }
        Ok(())
    }
}
