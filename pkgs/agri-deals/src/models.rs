//! Trade request, chat message and participant types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DealsError, Result};
use crate::room::{normalize_participant, RoomId};

/// Server-assigned trade request identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Server-assigned chat message identifier, used as the dedup key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a trade request.
///
/// Deleted requests are removed outright, so there is no `Deleted` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Returns true if transitioning from self to `next` is valid.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Accepted)
                | (RequestStatus::Pending, RequestStatus::Rejected)
        )
    }

    /// Accepted and rejected requests only leave by deletion.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a trade the local user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Buyer raising trade requests
    Farmer,
    /// Producer collective (FPC) answering them
    Seller,
}

/// The viewer's own identity, read once at startup and never rotated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn farmer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Farmer,
        }
    }

    pub fn seller(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Seller,
        }
    }
}

/// A trade request between a farmer and a seller
///
/// Rows may name the seller as `seller_id`/`seller_name`, as the older
/// `fpc_id`/`fpc_name`, or carry both; the non-empty value wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TradeRequestRow")]
pub struct TradeRequest {
    pub id: RequestId,
    pub farmer_id: String,
    pub farmer_name: String,
    pub seller_id: String,
    pub seller_name: String,
    pub crop: String,
    pub region: String,
    pub price: u64,
    pub status: RequestStatus,
    #[serde(serialize_with = "wire::timestamp::serialize")]
    pub timestamp: DateTime<Utc>,
    /// Opaque deal reference some backends attach on accept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Request row as the backend sends it
#[derive(Deserialize)]
struct TradeRequestRow {
    id: RequestId,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    farmer_id: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    farmer_name: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    seller_id: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    fpc_id: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    seller_name: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    fpc_name: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    crop: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    region: String,
    #[serde(default, deserialize_with = "wire::lenient_price")]
    price: u64,
    status: RequestStatus,
    #[serde(deserialize_with = "wire::timestamp::deserialize")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    tx_hash: Option<String>,
}

impl From<TradeRequestRow> for TradeRequest {
    fn from(row: TradeRequestRow) -> Self {
        fn either(primary: String, legacy: String) -> String {
            if primary.trim().is_empty() {
                legacy
            } else {
                primary
            }
        }

        Self {
            id: row.id,
            farmer_id: row.farmer_id,
            farmer_name: row.farmer_name,
            seller_id: either(row.seller_id, row.fpc_id),
            seller_name: either(row.seller_name, row.fpc_name),
            crop: row.crop,
            region: row.region,
            price: row.price,
            status: row.status,
            timestamp: row.timestamp,
            tx_hash: row.tx_hash,
        }
    }
}

impl TradeRequest {
    /// Both identity keys are present
    pub fn has_participants(&self) -> bool {
        normalize_participant(&self.farmer_id).is_some()
            && normalize_participant(&self.seller_id).is_some()
    }

    /// Accepted with both identity keys present
    pub fn is_chat_eligible(&self) -> bool {
        self.status == RequestStatus::Accepted && self.has_participants()
    }

    /// Identity key of the counterpart of `role`
    pub fn partner_id(&self, role: Role) -> &str {
        match role {
            Role::Farmer => &self.seller_id,
            Role::Seller => &self.farmer_id,
        }
    }

    /// Display name of the counterpart of `role`
    pub fn partner_name(&self, role: Role) -> &str {
        match role {
            Role::Farmer => &self.seller_name,
            Role::Seller => &self.farmer_name,
        }
    }
}

/// Fields of a trade request before the server assigns id, status and time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTradeRequest {
    pub farmer_id: String,
    pub farmer_name: String,
    pub seller_id: String,
    #[serde(default)]
    pub seller_name: String,
    pub crop: String,
    pub region: String,
    pub price: u64,
}

impl NewTradeRequest {
    /// Reject empty identity fields and trade terms before any network call
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("farmer_id", &self.farmer_id),
            ("farmer_name", &self.farmer_name),
            ("seller_id", &self.seller_id),
            ("crop", &self.crop),
            ("region", &self.region),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(DealsError::Validation(format!("{field} must not be empty")));
            }
        }

        Ok(())
    }
}

/// Snapshot filter for listing requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub farmer_id: Option<String>,
    pub seller_id: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn for_farmer(farmer_id: impl Into<String>) -> Self {
        Self {
            farmer_id: Some(farmer_id.into()),
            ..Default::default()
        }
    }

    pub fn for_seller(seller_id: impl Into<String>) -> Self {
        Self {
            seller_id: Some(seller_id.into()),
            ..Default::default()
        }
    }

    /// Requests where `identity` is the participant on its own side
    pub fn for_identity(identity: &Identity) -> Self {
        match identity.role {
            Role::Farmer => Self::for_farmer(identity.user_id.clone()),
            Role::Seller => Self::for_seller(identity.user_id.clone()),
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Participant ids compare trimmed and case-insensitively
    pub fn matches(&self, request: &TradeRequest) -> bool {
        let same = |wanted: &Option<String>, actual: &str| match wanted {
            Some(wanted) => normalize_participant(wanted) == normalize_participant(actual),
            None => true,
        };

        same(&self.farmer_id, &request.farmer_id)
            && same(&self.seller_id, &request.seller_id)
            && self.status.map_or(true, |s| s == request.status)
    }
}

/// Backend answer to a create call
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(TradeRequest),
    Acknowledged { request_id: Option<RequestId> },
}

/// Backend answer to an accept or reject call
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Updated(TradeRequest),
    Acknowledged { tx_hash: Option<String> },
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room: String,
    pub sender: String,
    pub receiver: String,
    pub text: String,
    #[serde(with = "wire::timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// A message on its way to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub sender: String,
    pub receiver: String,
    pub text: String,
    pub room: RoomId,
}

/// Backend answer to a send call.
///
/// Some backends echo the stored message, others only acknowledge; callers
/// refresh history in the second case.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Persisted(ChatMessage),
    Acknowledged,
}

impl SendOutcome {
    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            SendOutcome::Persisted(message) => Some(message),
            SendOutcome::Acknowledged => None,
        }
    }
}

/// Notice queued for a seller when a farmer raises a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub msg: String,
}

impl Notification {
    pub fn for_request(request: &NewTradeRequest) -> Self {
        Self {
            to: request.seller_id.clone(),
            msg: format!(
                "Farmer {} wants to connect for {} in {}",
                request.farmer_name, request.crop, request.region
            ),
        }
    }
}

/// One row of a recommendation result.
///
/// Ranking happens elsewhere; the core only reads the record to raise a
/// request. Field names follow the recommendation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerRecord {
    #[serde(rename = "FPC_Name", alias = "fpc_name", default, deserialize_with = "wire::lenient_string")]
    pub name: String,
    #[serde(rename = "District", default, deserialize_with = "wire::lenient_string")]
    pub district: String,
    #[serde(rename = "Commodities", default, deserialize_with = "wire::lenient_string")]
    pub commodities: String,
    #[serde(rename = "Email", default, deserialize_with = "wire::lenient_string")]
    pub email: String,
    #[serde(rename = "Contact_Phone", default, deserialize_with = "wire::lenient_string")]
    pub contact_phone: String,
    #[serde(default)]
    pub match_score: f64,
    #[serde(
        default,
        alias = "fpc_id",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "wire::lenient_opt_string"
    )]
    pub seller_id: Option<String>,
}

impl SellerRecord {
    /// Seller identity key, if the record carries a usable one
    pub fn identity_key(&self) -> Option<&str> {
        self.seller_id
            .as_deref()
            .map(str::trim)
            .filter(|id| normalize_participant(id).is_some())
    }
}

/// Serde helpers for the loosely typed backend payloads
pub mod wire {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accept a string, a number or null; null becomes the empty string
    pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = lenient_string(deserializer)?;
        Ok((!value.trim().is_empty()).then_some(value))
    }

    /// Prices arrive as numbers or numeric strings; anything else is 0
    pub fn lenient_price<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        })
    }

    /// Timestamps as RFC 3339, or the `YYYY-MM-DD HH:MM:SS` form taken as UTC
    pub mod timestamp {
        use chrono::{DateTime, NaiveDateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

        pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&value.to_rfc3339())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = String::deserialize(deserializer)?;
            parse(&raw).map_err(serde::de::Error::custom)
        }

        pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
            let raw = raw.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Ok(dt.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
                .map(|naive| naive.and_utc())
                .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
        }
    }
}
