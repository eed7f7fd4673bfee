//! JSON shapes of the AgriConnect HTTP API and how they map onto backend outcomes

use agri_deals::{
    ChatMessage, CreateOutcome, DealsError, NewTradeRequest, RequestFilter, RequestId, Result,
    SellerRecord, SendOutcome, TradeRequest, TransitionOutcome,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Longest slice of an error body kept in a `Transport` message
const MAX_ERROR_BODY: usize = 300;

/// Join `base` and `path`, collapsing duplicate slashes.
///
/// Base URLs like `http://127.0.0.1:5000//api` are common in client configs and
/// must hit the same routes as `http://127.0.0.1:5000/api`.
pub fn endpoint_url(base: &str, path: &str) -> String {
    let base = base.trim();
    let (scheme, rest) = match base.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, base),
    };

    let segments: Vec<&str> = rest
        .split('/')
        .chain(path.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    let joined = segments.join("/");

    match scheme {
        Some(scheme) => format!("{scheme}://{joined}"),
        None => joined,
    }
}

/// Generic `{ok, ...}` acknowledgement returned by write endpoints
#[derive(Debug, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub msg: Option<ChatMessage>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Ack {
    fn into_ok(self, context: &str) -> Result<Self> {
        if self.ok {
            return Ok(self);
        }
        Err(DealsError::Transport(format!(
            "{context} not acknowledged: {}",
            self.error.as_deref().unwrap_or("no reason given")
        )))
    }
}

/// Body of `POST /request`
#[derive(Debug, Serialize)]
pub struct CreateBody<'a> {
    pub farmer_id: &'a str,
    pub farmer_name: &'a str,
    pub crop: &'a str,
    pub region: &'a str,
    pub price: u64,
    pub seller_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub seller_name: &'a str,
}

impl<'a> From<&'a NewTradeRequest> for CreateBody<'a> {
    fn from(request: &'a NewTradeRequest) -> Self {
        Self {
            farmer_id: &request.farmer_id,
            farmer_name: &request.farmer_name,
            crop: &request.crop,
            region: &request.region,
            price: request.price,
            seller_id: &request.seller_id,
            seller_name: &request.seller_name,
        }
    }
}

/// Body of `POST /recommend`
#[derive(Debug, Serialize)]
pub struct RecommendBody<'a> {
    pub crop: &'a str,
    pub region: &'a str,
}

/// How `GET /requests` narrows its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListScope {
    /// Send the participant id. The service compares it case-sensitively, so
    /// rows stored as `s001` are missed when asking for `S001`.
    #[default]
    Participant,
    /// Fetch every row and leave matching to the case-insensitive local filter
    All,
}

/// Query pairs for `GET /requests`. The service filters by participant only.
pub fn list_query(filter: &RequestFilter, scope: ListScope) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if scope == ListScope::All {
        return query;
    }
    if let Some(farmer_id) = filter.farmer_id.as_deref().map(str::trim) {
        query.push(("farmer_id", farmer_id.to_string()));
    }
    if let Some(seller_id) = filter.seller_id.as_deref().map(str::trim) {
        query.push(("seller_id", seller_id.to_string()));
    }
    query
}

/// A create response is either the stored record or an acknowledgement
pub fn create_outcome(value: Value) -> Result<CreateOutcome> {
    if value.get("id").is_some() && value.get("status").is_some() {
        let created: TradeRequest = serde_json::from_value(value)?;
        return Ok(CreateOutcome::Created(created));
    }

    let ack: Ack = serde_json::from_value(value)?;
    let ack = ack.into_ok("create request")?;
    Ok(CreateOutcome::Acknowledged {
        request_id: ack
            .request_id
            .filter(|id| !id.trim().is_empty())
            .map(RequestId),
    })
}

pub fn transition_outcome(value: Value) -> Result<TransitionOutcome> {
    if value.get("id").is_some() && value.get("status").is_some() {
        let updated: TradeRequest = serde_json::from_value(value)?;
        return Ok(TransitionOutcome::Updated(updated));
    }

    let ack: Ack = serde_json::from_value(value)?;
    let ack = ack.into_ok("status change")?;
    Ok(TransitionOutcome::Acknowledged {
        tx_hash: ack.tx_hash,
    })
}

pub fn send_outcome(value: Value) -> Result<SendOutcome> {
    let ack: Ack = serde_json::from_value(value)?;
    let ack = ack.into_ok("send message")?;
    Ok(match ack.msg {
        Some(msg) => SendOutcome::Persisted(msg),
        None => SendOutcome::Acknowledged,
    })
}

/// Recommendation results arrive either as an array or as a JSON string
/// holding that array.
pub fn parse_recommend(value: Value) -> Result<Vec<SellerRecord>> {
    let rows = match value {
        Value::String(encoded) => serde_json::from_str(&encoded)?,
        Value::Null => return Ok(Vec::new()),
        other => other,
    };
    parse_rows(rows, "seller record")
}

/// Decode a JSON array row by row, skipping rows that do not fit `T`
pub fn parse_rows<T: DeserializeOwned>(value: Value, what: &str) -> Result<Vec<T>> {
    let Value::Array(rows) = value else {
        return Err(DealsError::Transport(format!("expected a list of {what}s")));
    };

    let total = rows.len();
    let parsed: Vec<T> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Skipping malformed {}: {}", what, e);
                None
            }
        })
        .collect();

    if parsed.len() != total {
        warn!("Kept {} of {} {}s", parsed.len(), total, what);
    }
    Ok(parsed)
}

/// Short description of a failed response body
pub fn error_detail(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(Value::String(error)) = map.get("error") {
            return error.clone();
        }
    }

    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
