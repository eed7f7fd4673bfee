//! Canonical chat room keys
//!
//! A room is not stored anywhere; it is derived from the two participant ids.
//! Both the send path and the history path go through [`derive_room`], so a
//! farmer and a seller always land in the same room no matter who computes it.
//!
//! # Normalization
//!
//! 1. Trim surrounding whitespace
//! 2. Lower-case
//! 3. Order the pair lexicographically
//! 4. Join with [`ROOM_SEPARATOR`]

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DealsError, Result};

/// Separator between the two participant ids in a room key
pub const ROOM_SEPARATOR: char = '_';

/// Placeholders that leak into room keys when an id was never initialized
pub const ROOM_SENTINELS: [&str; 2] = ["undefined", "null"];

/// Canonical room key for a pair of participants
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Accept an externally supplied room key if it is syntactically valid
    pub fn parse(key: &str) -> Option<Self> {
        is_valid_room_key(key).then(|| Self(key.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a participant id: trimmed and lower-cased.
///
/// Returns `None` when nothing is left after trimming, or when the id is one of
/// the [`ROOM_SENTINELS`] an unset identity stringifies to.
pub fn normalize_participant(id: &str) -> Option<String> {
    let normalized = id.trim().to_lowercase();
    if normalized.is_empty() || ROOM_SENTINELS.contains(&normalized.as_str()) {
        None
    } else {
        Some(normalized)
    }
}

/// Derive the canonical room for two participants.
///
/// `derive_room(a, b) == derive_room(b, a)` for every pair of non-empty ids.
pub fn derive_room(a: &str, b: &str) -> Result<RoomId> {
    let a = normalize_participant(a)
        .ok_or_else(|| DealsError::InvalidParticipant("first participant id is empty".into()))?;
    let b = normalize_participant(b)
        .ok_or_else(|| DealsError::InvalidParticipant("second participant id is empty".into()))?;

    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    Ok(RoomId(format!("{low}{ROOM_SEPARATOR}{high}")))
}

/// Check that a room key has the canonical shape.
///
/// Rejects keys without the separator, keys with an empty side and keys that
/// carry a placeholder such as `undefined`.
pub fn is_valid_room_key(key: &str) -> bool {
    let key = key.trim();
    if key.is_empty() || !key.contains(ROOM_SEPARATOR) {
        return false;
    }

    let lowered = key.to_lowercase();
    let has_sentinel = lowered
        .split(ROOM_SEPARATOR)
        .any(|part| ROOM_SENTINELS.contains(&part));
    if has_sentinel {
        return false;
    }

    match key.split_once(ROOM_SEPARATOR) {
        Some((left, right)) => !left.is_empty() && !right.is_empty(),
        None => false,
    }
}
