use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for enrichment fields with no reference data.
pub const NOT_AVAILABLE: &str = "N/A";

/// Descriptive fields copied from the reference dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub item_code: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub owner: String,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            item_code: NOT_AVAILABLE.into(),
            description: NOT_AVAILABLE.into(),
            category: NOT_AVAILABLE.into(),
            location: NOT_AVAILABLE.into(),
            owner: NOT_AVAILABLE.into(),
        }
    }
}

impl Enrichment {
    /// Whether any field carries real reference data.
    pub fn is_available(&self) -> bool {
        [
            &self.item_code,
            &self.description,
            &self.category,
            &self.location,
            &self.owner,
        ]
        .iter()
        .any(|f| f.as_str() != NOT_AVAILABLE)
    }
}

/// One row of the reference dataset, keyed by normalized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    pub key: String,
    pub enrichment: Enrichment,
}

/// A tag as known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Secondary identifier when the reader reported one, else the primary.
    pub identity_key: String,
    pub raw_hex: String,
    pub decoded_text: String,
    pub antenna: u16,
    pub signal_strength: Option<i16>,
    pub source_reader: String,
    pub seen_count: u64,
    /// Fixed at first sighting.
    pub zone: String,
    /// Fixed at first sighting.
    pub enrichment: Enrichment,
    pub scan_order: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}
