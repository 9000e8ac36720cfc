//! Links

use serde::Deserialize;
use serde::Serialize;

/// A shortened link
///
/// The serialized form is the snapshot record, field names are part of the file format
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Link {
    /// The original long URL
    #[serde(rename = "url")]
    #[sqlx(rename = "url")]
    pub full_url: String,

    /// External identifier used in the short URL
    pub shortcut: String,

    /// Opaque ID of whoever created the link, empty for anonymous records
    #[serde(rename = "userID", default)]
    pub owner_id: String,

    /// Soft-delete marker, a deleted shortcut is never reused
    #[serde(rename = "isDeleted", default)]
    pub is_deleted: bool,
}

impl Link {
    /// Summary of the link as shown to its owner
    pub fn summary(&self) -> LinkSummary {
        LinkSummary {
            shortcut: self.shortcut.clone(),
            full_url: self.full_url.clone(),
        }
    }
}

/// A link as listed for its owner
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct LinkSummary {
    /// The shortcut of the link
    pub shortcut: String,

    /// The original long URL
    #[sqlx(rename = "url")]
    pub full_url: String,
}

/// Candidate for a new link, before the store has accepted it
#[derive(Clone, Debug)]
pub struct NewLink<'a> {
    /// The original long URL
    pub full_url: &'a str,

    /// The shortcut to try
    pub shortcut: &'a str,

    /// Owner of the new link
    pub owner_id: &'a str,
}

/// A single entry of a batch create request
#[derive(Clone, Debug, Deserialize)]
pub struct BatchItem {
    /// Caller chosen ID, echoed back in the response
    pub correlation_id: String,

    /// URL to shorten
    #[serde(rename = "original_url")]
    pub full_url: String,
}

/// Result of a single entry of a batch create request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// The correlation ID of the matching [`BatchItem`]
    pub correlation_id: String,

    /// The shortcut assigned to the URL
    #[serde(skip)]
    pub shortcut: String,

    /// The full short URL
    pub short_url: String,
}
