//! [`DealsBackend`] over the AgriConnect HTTP API

use agri_deals::{
    ChatMessage, CreateOutcome, DealsBackend, DealsConfig, DealsError, NewTradeRequest,
    Notification, OutgoingMessage, RequestFilter, RequestId, Result, RoomId, SellerRecord,
    SendOutcome, TradeRequest, TransitionOutcome,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::wire::{self, CreateBody, ListScope, RecommendBody};

fn transport(e: reqwest::Error) -> DealsError {
    DealsError::Transport(e.to_string())
}

/// HTTP backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    list_scope: ListScope,
}

impl HttpBackend {
    /// Build a backend for `config.api_base_url` with `config.request_timeout`
    /// applied to every call.
    pub fn new(config: &DealsConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport)?;

        Ok(Self::with_client(client, &config.api_base_url))
    }

    /// Use an existing client, e.g. one shared with other services
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: wire::endpoint_url(base_url, ""),
            list_scope: ListScope::default(),
        }
    }

    /// Choose how request listings are narrowed. Use [`ListScope::All`] when
    /// participant ids may be stored with a different case than they are asked for.
    pub fn with_list_scope(mut self, scope: ListScope) -> Self {
        self.list_scope = scope;
        self
    }

    pub fn list_scope(&self) -> ListScope {
        self.list_scope
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        wire::endpoint_url(&self.base_url, path)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn post(&self, path: &str) -> Result<Response> {
        self.client
            .post(self.url(path))
            .send()
            .await
            .map_err(transport)
    }

    async fn transition(&self, action: &str, id: &RequestId) -> Result<TransitionOutcome> {
        let response = self.post(&format!("{action}/{id}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{} of {} answered 404", action, id);
            return Err(DealsError::InvalidTransition {
                id: id.clone(),
                from: None,
            });
        }
        wire::transition_outcome(read_json(response).await?)
    }
}

/// Fail on non-2xx, otherwise decode the body as JSON
async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    if !status.is_success() {
        return Err(DealsError::Transport(format!(
            "HTTP {}: {}",
            status.as_u16(),
            wire::error_detail(&body)
        )));
    }

    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl DealsBackend for HttpBackend {
    #[instrument(skip(self, request), fields(seller = %request.seller_id))]
    async fn create_request(&self, request: &NewTradeRequest) -> Result<CreateOutcome> {
        let response = self
            .client
            .post(self.url("request"))
            .json(&CreateBody::from(request))
            .send()
            .await
            .map_err(transport)?;
        wire::create_outcome(read_json(response).await?)
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<TradeRequest>> {
        let value = self
            .get_json("requests", &wire::list_query(filter, self.list_scope))
            .await?;
        wire::parse_rows(value, "request")
    }

    async fn accept_request(&self, id: &RequestId) -> Result<TransitionOutcome> {
        self.transition("accept", id).await
    }

    async fn reject_request(&self, id: &RequestId) -> Result<TransitionOutcome> {
        self.transition("reject", id).await
    }

    async fn delete_request(&self, id: &RequestId) -> Result<()> {
        let response = self.post(&format!("request/delete/{id}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Request {} already gone", id);
            return Ok(());
        }
        read_json(response).await.map(|_| ())
    }

    #[instrument(skip(self, message), fields(room = %message.room))]
    async fn send_message(&self, message: &OutgoingMessage) -> Result<SendOutcome> {
        let response = self
            .client
            .post(self.url("chat/send"))
            .json(message)
            .send()
            .await
            .map_err(transport)?;
        wire::send_outcome(read_json(response).await?)
    }

    async fn chat_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>> {
        let value = self
            .get_json("chat/history", &[("room", room.to_string())])
            .await?;
        wire::parse_rows(value, "chat message")
    }

    async fn notifications(&self, seller_id: &str) -> Result<Vec<Notification>> {
        let value = self
            .get_json("notifications", &[("seller", seller_id.to_string())])
            .await?;
        wire::parse_rows(value, "notification")
    }

    async fn recommend(&self, crop: &str, region: &str) -> Result<Vec<SellerRecord>> {
        let response = self
            .client
            .post(self.url("recommend"))
            .json(&RecommendBody { crop, region })
            .send()
            .await
            .map_err(transport)?;
        wire::parse_recommend(read_json(response).await?)
    }

    async fn health(&self) -> Result<()> {
        self.get_json("health", &[]).await.map(|_| ())
    }
}
