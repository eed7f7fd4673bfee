// Shared fixtures for agri-deals integration tests

#![allow(dead_code)]

use agri_deals::{
    ChatMessage, CreateOutcome, DealEvent, DealsBackend, DealsError, MemoryBackend, NewTradeRequest,
    Notification, OutgoingMessage, RequestFilter, RequestId, Result, RoomId, SellerRecord,
    SendOutcome, TradeRequest, TransitionOutcome,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Memory backend that counts calls per operation and can be told to fail
/// or stall history fetches.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryBackend,
    calls: Mutex<HashMap<&'static str, usize>>,
    history_delays: Mutex<VecDeque<Duration>>,
    fail_history: AtomicBool,
    fail_lists: AtomicBool,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledging() -> Self {
        Self {
            inner: MemoryBackend::acknowledging(),
            ..Self::default()
        }
    }

    pub fn with_sellers(mut self, sellers: Vec<SellerRecord>) -> Self {
        self.inner = self.inner.with_sellers(sellers);
        self
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    /// Total calls that reached the backend
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// The next history fetch reads its snapshot at once but answers after `delay`
    pub fn push_history_delay(&self, delay: Duration) {
        self.history_delays.lock().push_back(delay);
    }

    pub fn set_fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().entry(op).or_insert(0) += 1;
    }
}

#[async_trait]
impl DealsBackend for CountingBackend {
    async fn create_request(&self, request: &NewTradeRequest) -> Result<CreateOutcome> {
        self.record("create");
        self.inner.create_request(request).await
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<TradeRequest>> {
        self.record("list");
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(DealsError::Transport("connection refused".into()));
        }
        self.inner.list_requests(filter).await
    }

    async fn accept_request(&self, id: &RequestId) -> Result<TransitionOutcome> {
        self.record("accept");
        self.inner.accept_request(id).await
    }

    async fn reject_request(&self, id: &RequestId) -> Result<TransitionOutcome> {
        self.record("reject");
        self.inner.reject_request(id).await
    }

    async fn delete_request(&self, id: &RequestId) -> Result<()> {
        self.record("delete");
        self.inner.delete_request(id).await
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SendOutcome> {
        self.record("send");
        self.inner.send_message(message).await
    }

    async fn chat_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>> {
        self.record("history");
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(DealsError::Transport("timed out".into()));
        }

        let snapshot = self.inner.chat_history(room).await;
        let delay = self.history_delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        snapshot
    }

    async fn notifications(&self, seller_id: &str) -> Result<Vec<Notification>> {
        self.record("notifications");
        self.inner.notifications(seller_id).await
    }

    async fn recommend(&self, crop: &str, region: &str) -> Result<Vec<SellerRecord>> {
        self.record("recommend");
        self.inner.recommend(crop, region).await
    }

    async fn health(&self) -> Result<()> {
        self.record("health");
        self.inner.health().await
    }
}

pub fn seller(name: &str, seller_id: Option<&str>) -> SellerRecord {
    SellerRecord {
        name: name.to_string(),
        district: "Jalpaiguri".to_string(),
        commodities: "Rice, Jute".to_string(),
        email: String::new(),
        contact_phone: String::new(),
        match_score: 80.0,
        seller_id: seller_id.map(str::to_string),
    }
}

pub fn new_request(farmer_id: &str, seller_id: &str) -> NewTradeRequest {
    NewTradeRequest {
        farmer_id: farmer_id.to_string(),
        farmer_name: "Asha".to_string(),
        seller_id: seller_id.to_string(),
        seller_name: String::new(),
        crop: "Rice".to_string(),
        region: "West".to_string(),
        price: 2000,
    }
}

/// Route library logs to the test harness; set RUST_LOG to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let spawned pollers run until they block. Meant for paused-clock tests.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Drain every event emitted so far
pub fn drain(rx: &mut UnboundedReceiver<DealEvent>) -> Vec<DealEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
