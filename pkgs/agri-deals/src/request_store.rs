//! Request store - typed client view over the backend's request operations

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::backend::DealsBackend;
use crate::error::{DealsError, Result};
use crate::models::{
    CreateOutcome, NewTradeRequest, Notification, RequestFilter, RequestId, SellerRecord,
    TradeRequest, TransitionOutcome,
};
use crate::room::normalize_participant;

/// Request store
///
/// Validates input locally, forwards to the backend and normalizes what comes
/// back. Holds no state of its own.
#[derive(Clone)]
pub struct RequestStore {
    backend: Arc<dyn DealsBackend>,
}

impl RequestStore {
    pub fn new(backend: Arc<dyn DealsBackend>) -> Self {
        Self { backend }
    }

    /// Create a request; fails before the network call if a field is empty
    #[instrument(skip(self, request), fields(farmer = %request.farmer_id, seller = %request.seller_id))]
    pub async fn create(&self, request: &NewTradeRequest) -> Result<CreateOutcome> {
        request.validate()?;
        self.backend.create_request(request).await
    }

    /// List requests matching `filter`, oldest first.
    ///
    /// The filter is re-applied locally because backends differ in which
    /// parameters they honour.
    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<TradeRequest>> {
        let mut requests: Vec<TradeRequest> = self
            .backend
            .list_requests(filter)
            .await?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();

        // Stable, so rows with equal timestamps keep the backend's order
        requests.sort_by_key(|r| r.timestamp);

        debug!("Listed {} requests", requests.len());
        Ok(requests)
    }

    pub async fn accept(&self, id: &RequestId) -> Result<TransitionOutcome> {
        check_id(id)?;
        self.backend.accept_request(id).await
    }

    pub async fn reject(&self, id: &RequestId) -> Result<TransitionOutcome> {
        check_id(id)?;
        self.backend.reject_request(id).await
    }

    pub async fn delete(&self, id: &RequestId) -> Result<()> {
        check_id(id)?;
        self.backend.delete_request(id).await
    }

    pub async fn notifications(&self, seller_id: &str) -> Result<Vec<Notification>> {
        let seller_id = normalize_participant(seller_id)
            .map(|_| seller_id.trim())
            .ok_or_else(|| DealsError::InvalidParticipant("seller id is empty".into()))?;
        self.backend.notifications(seller_id).await
    }

    pub async fn recommend(&self, crop: &str, region: &str) -> Result<Vec<SellerRecord>> {
        self.backend.recommend(crop.trim(), region.trim()).await
    }
}

fn check_id(id: &RequestId) -> Result<()> {
    if id.0.trim().is_empty() {
        return Err(DealsError::Validation("request id must not be empty".into()));
    }
    Ok(())
}
