//! Request lifecycle - pending → accepted | rejected, any state → deleted
//!
//! Every mutation is confirmed by reading the backend again. When the backend
//! only acknowledges a write, the record returned to the caller is the one the
//! follow-up listing shows, never a locally patched copy.

use tracing::{info, instrument, warn};

use crate::error::{DealsError, Result};
use crate::models::{
    CreateOutcome, NewTradeRequest, Notification, RequestFilter, RequestId, RequestStatus,
    SellerRecord, TradeRequest, TransitionOutcome,
};
use crate::request_store::RequestStore;

/// Lifecycle operations on trade requests
#[derive(Clone)]
pub struct RequestLifecycle {
    store: RequestStore,
}

impl RequestLifecycle {
    pub fn new(store: RequestStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// Raise a new request; it starts out pending
    pub async fn create(
        &self,
        farmer_id: &str,
        farmer_name: &str,
        seller_id: &str,
        crop: &str,
        region: &str,
        price: u64,
    ) -> Result<TradeRequest> {
        self.create_request(NewTradeRequest {
            farmer_id: farmer_id.trim().to_string(),
            farmer_name: farmer_name.trim().to_string(),
            seller_id: seller_id.trim().to_string(),
            seller_name: String::new(),
            crop: crop.trim().to_string(),
            region: region.trim().to_string(),
            price,
        })
        .await
    }

    /// Raise a request to a seller picked from a recommendation result.
    ///
    /// Records without a seller id are refused before anything is sent.
    pub async fn request_from_seller(
        &self,
        farmer_id: &str,
        farmer_name: &str,
        seller: &SellerRecord,
        crop: &str,
        region: &str,
        price: u64,
    ) -> Result<TradeRequest> {
        let seller_id = seller.identity_key().ok_or_else(|| {
            DealsError::Validation(format!("seller record '{}' has no seller id", seller.name))
        })?;

        self.create_request(NewTradeRequest {
            farmer_id: farmer_id.trim().to_string(),
            farmer_name: farmer_name.trim().to_string(),
            seller_id: seller_id.to_string(),
            seller_name: seller.name.trim().to_lowercase(),
            crop: crop.trim().to_string(),
            region: region.trim().to_string(),
            price,
        })
        .await
    }

    #[instrument(skip(self, request), fields(farmer = %request.farmer_id, seller = %request.seller_id))]
    pub async fn create_request(&self, request: NewTradeRequest) -> Result<TradeRequest> {
        let created = match self.store.create(&request).await? {
            CreateOutcome::Created(created) => created,
            CreateOutcome::Acknowledged {
                request_id: Some(id),
            } => self.find(&id, &RequestFilter::for_farmer(&request.farmer_id)).await?,
            CreateOutcome::Acknowledged { request_id: None } => {
                self.find_latest_matching(&request).await?
            }
        };

        info!("Created request {} ({})", created.id, created.status);
        Ok(created)
    }

    /// Accept a pending request
    pub async fn accept(&self, id: &RequestId) -> Result<TradeRequest> {
        let outcome = self.store.accept(id).await?;
        self.confirm_transition(id, outcome, RequestStatus::Accepted)
            .await
    }

    /// Reject a pending request
    pub async fn reject(&self, id: &RequestId) -> Result<TradeRequest> {
        let outcome = self.store.reject(id).await?;
        self.confirm_transition(id, outcome, RequestStatus::Rejected)
            .await
    }

    /// Delete a request in any state. Already-deleted ids are not an error.
    pub async fn delete(&self, id: &RequestId) -> Result<()> {
        self.store.delete(id).await?;
        info!("Deleted request {}", id);
        Ok(())
    }

    /// Snapshot of the matching requests, oldest first
    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<TradeRequest>> {
        self.store.list(filter).await
    }

    pub async fn notifications(&self, seller_id: &str) -> Result<Vec<Notification>> {
        self.store.notifications(seller_id).await
    }

    /// Sellers the service suggests for a crop and region, in its ranking order
    pub async fn recommend(&self, crop: &str, region: &str) -> Result<Vec<SellerRecord>> {
        self.store.recommend(crop, region).await
    }

    async fn confirm_transition(
        &self,
        id: &RequestId,
        outcome: TransitionOutcome,
        target: RequestStatus,
    ) -> Result<TradeRequest> {
        let confirmed = match outcome {
            TransitionOutcome::Updated(updated) => updated,
            TransitionOutcome::Acknowledged { tx_hash } => {
                let mut seen = self.find(id, &RequestFilter::default()).await?;
                if seen.tx_hash.is_none() {
                    seen.tx_hash = tx_hash;
                }
                seen
            }
        };

        if confirmed.status != target {
            warn!(
                "Request {} is {} after moving it to {}",
                id, confirmed.status, target
            );
            return Err(DealsError::InvalidTransition {
                id: id.clone(),
                from: Some(confirmed.status),
            });
        }

        info!("Request {} is now {}", id, target);
        Ok(confirmed)
    }

    async fn find(&self, id: &RequestId, filter: &RequestFilter) -> Result<TradeRequest> {
        self.store
            .list(filter)
            .await?
            .into_iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| DealsError::NotFound(format!("request {id} not visible after write")))
    }

    /// Without an id the newest pending row with the same terms is ours
    async fn find_latest_matching(&self, request: &NewTradeRequest) -> Result<TradeRequest> {
        let filter = RequestFilter::for_farmer(&request.farmer_id).with_status(RequestStatus::Pending);
        self.store
            .list(&filter)
            .await?
            .into_iter()
            .rev()
            .find(|r| {
                filter.matches(r)
                    && RequestFilter::for_seller(&request.seller_id).matches(r)
                    && r.crop == request.crop
                    && r.region == request.region
            })
            .ok_or_else(|| DealsError::NotFound("created request not visible after write".into()))
    }
}
