use std::sync::Arc;

use serde::Serialize;

use super::{HealthRecord, Tag};

/// Message pushed to observers, serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ObserverEvent {
    /// Full store contents, sent first to every new observer.
    TagSnapshot(Vec<Arc<Tag>>),
    TagAdded(Arc<Tag>),
    TagUpdated(Arc<Tag>),
    #[serde(rename_all = "camelCase")]
    TagsCleared {
        zone: Option<String>,
        removed: usize,
    },
    HealthSnapshot(Arc<Vec<HealthRecord>>),
}

impl ObserverEvent {
    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TagSnapshot(_) => "tagSnapshot",
            Self::TagAdded(_) => "tagAdded",
            Self::TagUpdated(_) => "tagUpdated",
            Self::TagsCleared { .. } => "tagsCleared",
            Self::HealthSnapshot(_) => "healthSnapshot",
        }
    }
}
