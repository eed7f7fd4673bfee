//! Deal board - accepted deals of the local user and the chat bound to one
//!
//! The board refreshes `list(status = accepted, participant = self)` on its
//! own poller and keeps at most one [`ChatSession`] open, for the deal that is
//! currently selected. Selecting another deal, or none, closes the previous
//! session before anything else happens. Every refresh, manual or from the
//! poller, closes the open session when its deal is no longer listed.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::backend::DealsBackend;
use crate::chat_store::ChatStore;
use crate::error::{DealsError, Result};
use crate::events::{DealEvent, EventSink};
use crate::lifecycle::RequestLifecycle;
use crate::models::{
    Identity, RequestFilter, RequestId, RequestStatus, Role, SellerRecord, SendOutcome,
    TradeRequest,
};
use crate::request_store::RequestStore;
use crate::room::{normalize_participant, RoomId};
use crate::scheduler::Poller;
use crate::session::{ChatSession, SessionCloser};
use crate::DealsConfig;

/// The deal whose chat is open
pub struct ActiveChat {
    pub deal: TradeRequest,
    pub partner_id: String,
    pub session: ChatSession,
}

impl ActiveChat {
    pub fn room(&self) -> RoomId {
        self.session.room()
    }
}

/// Deal id and closer of the open chat, shared with the refresh task
type Selection = Mutex<Option<(RequestId, SessionCloser)>>;

/// Close the selected chat if its deal is not among `deals`
fn close_if_gone(selection: &Selection, deals: &[TradeRequest]) {
    let gone = {
        let mut selection = selection.lock();
        let listed = selection
            .as_ref()
            .map_or(true, |(id, _)| deals.iter().any(|d| &d.id == id));
        if listed {
            None
        } else {
            selection.take()
        }
    };

    if let Some((id, closer)) = gone {
        info!("Deal {} is gone, closing its chat", id);
        closer.close();
    }
}

/// Deal board for one local identity
pub struct DealBoard {
    identity: Identity,
    config: DealsConfig,
    lifecycle: RequestLifecycle,
    chat: ChatStore,
    deals: Arc<Mutex<Vec<TradeRequest>>>,
    poller: Option<Poller>,
    active: Option<ActiveChat>,
    selection: Arc<Selection>,
    events: EventSink,
}

impl DealBoard {
    /// Create a board for `identity`. Fails if the identity has no user id.
    pub fn new(
        backend: Arc<dyn DealsBackend>,
        identity: Identity,
        config: DealsConfig,
        events: EventSink,
    ) -> Result<Self> {
        if normalize_participant(&identity.user_id).is_none() {
            return Err(DealsError::InvalidParticipant(
                "local user id is empty".into(),
            ));
        }
        config.validate()?;

        Ok(Self {
            identity,
            config,
            lifecycle: RequestLifecycle::new(RequestStore::new(backend.clone())),
            chat: ChatStore::new(backend),
            deals: Arc::new(Mutex::new(Vec::new())),
            poller: None,
            active: None,
            selection: Arc::new(Mutex::new(None)),
            events,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn lifecycle(&self) -> &RequestLifecycle {
        &self.lifecycle
    }

    fn accepted_filter(&self) -> RequestFilter {
        RequestFilter::for_identity(&self.identity).with_status(RequestStatus::Accepted)
    }

    /// Start refreshing accepted deals in the background. Idempotent.
    ///
    /// A background refresh that no longer lists the selected deal closes its
    /// chat session and emits `ChatClosed`.
    pub fn start(&mut self) {
        if self.poller.is_some() {
            return;
        }

        let lifecycle = self.lifecycle.clone();
        let filter = self.accepted_filter();
        let deals = self.deals.clone();
        let selection = self.selection.clone();
        let events = self.events.clone();

        self.poller = Some(Poller::spawn(
            format!("deals:{}", self.identity.user_id),
            self.config.deal_poll_interval,
            move || {
                let lifecycle = lifecycle.clone();
                let filter = filter.clone();
                let deals = deals.clone();
                let selection = selection.clone();
                let events = events.clone();
                async move {
                    match lifecycle.list(&filter).await {
                        Ok(fresh) => {
                            let count = fresh.len();
                            close_if_gone(&selection, &fresh);
                            *deals.lock() = fresh;
                            events.emit(DealEvent::DealsUpdated { count });
                        }
                        Err(e) => {
                            warn!("Deal refresh failed: {}", e);
                            events.error("deal refresh", &e);
                        }
                    }
                }
            },
        ));
    }

    /// Stop background refresh and close the open chat
    pub fn stop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
        }
        self.close_chat();
    }

    /// Fetch accepted deals now and reconcile the selection
    pub async fn refresh(&mut self) -> Result<Vec<TradeRequest>> {
        let fresh = match self.lifecycle.list(&self.accepted_filter()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.events.error("deal refresh", &e);
                return Err(e);
            }
        };

        *self.deals.lock() = fresh.clone();
        self.events.emit(DealEvent::DealsUpdated { count: fresh.len() });
        self.reconcile();
        Ok(fresh)
    }

    /// Close the open chat if its deal is no longer among the accepted deals,
    /// and drop a chat the background refresh already closed
    pub fn reconcile(&mut self) {
        let deals = self.deals.lock().clone();
        close_if_gone(&self.selection, &deals);

        if self.active.as_ref().is_some_and(|a| !a.session.is_open()) {
            self.close_chat();
        }
    }

    /// Accepted deals from the latest snapshot, including malformed ones
    pub fn accepted_deals(&self) -> Vec<TradeRequest> {
        self.deals.lock().clone()
    }

    /// Accepted deals that carry both identity keys
    pub fn chat_eligible_deals(&self) -> Vec<TradeRequest> {
        self.deals
            .lock()
            .iter()
            .filter(|d| d.is_chat_eligible())
            .cloned()
            .collect()
    }

    /// The open chat. A chat closed by the background refresh is not returned.
    pub fn active_chat(&self) -> Option<&ActiveChat> {
        self.active.as_ref().filter(|a| a.session.is_open())
    }

    /// Open the chat for a deal from the current snapshot
    pub fn open_chat(&mut self, deal_id: &RequestId) -> Result<&ActiveChat> {
        let deal = self
            .deals
            .lock()
            .iter()
            .find(|d| &d.id == deal_id)
            .cloned();

        match deal {
            Some(deal) => self.open_chat_for(deal),
            None => {
                let err = DealsError::NotFound(format!("deal {deal_id}"));
                self.events.error("open chat", &err);
                Err(err)
            }
        }
    }

    /// Bind the chat session to `deal`, closing any previous one first.
    ///
    /// Fails with `InvalidParticipant` when either identity key is missing;
    /// the room is never derived from an empty id.
    #[instrument(skip(self, deal), fields(deal = %deal.id))]
    pub fn open_chat_for(&mut self, deal: TradeRequest) -> Result<&ActiveChat> {
        self.close_chat();

        if deal.status != RequestStatus::Accepted {
            let err = DealsError::Validation(format!(
                "deal {} is {}, only accepted deals have a chat",
                deal.id, deal.status
            ));
            self.events.error("open chat", &err);
            return Err(err);
        }

        let partner_id = deal.partner_id(self.identity.role).trim().to_string();
        let own_key = match self.identity.role {
            Role::Farmer => deal.farmer_id.as_str(),
            Role::Seller => deal.seller_id.as_str(),
        };

        if normalize_participant(own_key).is_none() || normalize_participant(&partner_id).is_none() {
            let err = DealsError::InvalidParticipant(format!(
                "deal {} is missing a participant id, cannot open chat",
                deal.id
            ));
            warn!("{}", err);
            self.events.error("open chat", &err);
            return Err(err);
        }

        let session = ChatSession::open(
            self.chat.clone(),
            &self.identity.user_id,
            &partner_id,
            self.config.chat_poll_interval,
            self.events.clone(),
        )
        .inspect_err(|e| self.events.error("open chat", e))?;

        let room = session.room();
        *self.selection.lock() = Some((deal.id.clone(), session.closer()));
        info!("Opened chat for deal {} in room {}", deal.id, room);
        self.events.emit(DealEvent::ChatOpened {
            deal_id: deal.id.clone(),
            room,
        });

        Ok(&*self.active.insert(ActiveChat {
            deal,
            partner_id,
            session,
        }))
    }

    /// Close the open chat, if any
    pub fn close_chat(&mut self) {
        self.selection.lock().take();
        if let Some(mut active) = self.active.take() {
            active.session.close();
        }
    }

    /// Send `text` in the open chat
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome> {
        let Some(active) = &self.active else {
            return Err(DealsError::Validation("no chat is open".into()));
        };

        active.session.send_and_refresh(text).await.inspect_err(|e| {
            if !e.is_local() {
                self.events.error("send message", e);
            }
        })
    }

    /// Delete a deal, closing its chat first if it is the open one
    pub async fn delete_deal(&mut self, id: &RequestId) -> Result<()> {
        if self.active.as_ref().is_some_and(|a| &a.deal.id == id) {
            self.close_chat();
        }

        if let Err(e) = self.lifecycle.delete(id).await {
            self.events.error("delete deal", &e);
            return Err(e);
        }

        self.refresh_after("delete deal").await;
        Ok(())
    }

    /// Pending requests addressed to this seller
    pub async fn pending_requests(&self) -> Result<Vec<TradeRequest>> {
        self.require_role(Role::Seller)?;
        let filter = RequestFilter::for_identity(&self.identity).with_status(RequestStatus::Pending);
        self.lifecycle.list(&filter).await
    }

    /// Accept a pending request addressed to this seller
    pub async fn accept(&mut self, id: &RequestId) -> Result<TradeRequest> {
        self.require_role(Role::Seller)?;
        let accepted = self.report("accept request", self.lifecycle.accept(id).await)?;
        self.refresh_after("accept request").await;
        Ok(accepted)
    }

    /// Reject a pending request addressed to this seller
    pub async fn reject(&mut self, id: &RequestId) -> Result<TradeRequest> {
        self.require_role(Role::Seller)?;
        let rejected = self.report("reject request", self.lifecycle.reject(id).await)?;
        self.refresh_after("reject request").await;
        Ok(rejected)
    }

    /// The write already happened, so a failed refresh only keeps the old
    /// snapshot; `refresh` has reported it as an `Error` event
    async fn refresh_after(&mut self, context: &str) {
        if let Err(e) = self.refresh().await {
            warn!("Refresh after {} failed, keeping previous deals: {}", context, e);
        }
    }

    /// Raise a request to a recommended seller
    pub async fn send_request(
        &self,
        farmer_name: &str,
        seller: &SellerRecord,
        crop: &str,
        region: &str,
        price: u64,
    ) -> Result<TradeRequest> {
        self.require_role(Role::Farmer)?;
        let created = self
            .lifecycle
            .request_from_seller(&self.identity.user_id, farmer_name, seller, crop, region, price)
            .await;
        self.report("send request", created)
    }

    fn require_role(&self, role: Role) -> Result<()> {
        if self.identity.role != role {
            return Err(DealsError::Validation(format!(
                "operation requires the {:?} role",
                role
            )));
        }
        Ok(())
    }

    fn report<T>(&self, context: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.events.error(context, e);
        }
        result
    }
}

impl Drop for DealBoard {
    fn drop(&mut self) {
        self.stop();
    }
}
