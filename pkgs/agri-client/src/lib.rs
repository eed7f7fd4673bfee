//! Agri Client - HTTP backend for the AgriConnect deal core
//!
//! [`HttpBackend`] implements [`agri_deals::DealsBackend`] against the
//! AgriConnect REST service. Write endpoints on that service answer with
//! `{ok, ...}` acknowledgements rather than the stored record, so the deal core
//! confirms every write with a follow-up read.
//!
//! # Status mapping
//!
//! - `404` on accept or reject: the request is not pending (`InvalidTransition`)
//! - `404` on delete: already gone, treated as success
//! - any other non-2xx: `Transport`
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agri_client::HttpBackend;
//! use agri_deals::{DealBoard, DealsBackend, DealsConfig, EventSink, Identity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DealsConfig::default();
//! let backend = Arc::new(HttpBackend::new(&config)?);
//! backend.health().await?;
//!
//! let mut board = DealBoard::new(backend, Identity::seller("fpc-17"), config, EventSink::disabled())?;
//! let pending = board.pending_requests().await?;
//! if let Some(first) = pending.first() {
//!     board.accept(&first.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod http_backend;
pub mod wire;

pub use http_backend::HttpBackend;
