// ── Control surface ──
//
// Typed control requests executed by `TagService::execute`. Each returns
// a success flag, a human-readable message and an optional JSON detail.

use serde::{Deserialize, Serialize};

use crate::model::ScanMode;

/// A control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    StartAll { mode: ScanMode },
    StopAll { mode: ScanMode },
    /// Remove tags in `zone`, or every tag when `zone` is absent.
    Clear {
        #[serde(default)]
        zone: Option<String>,
    },
    Snapshot,
    Health,
    ForceRefreshCache,
}

/// Outcome of a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
            detail: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(true, message)
    }

    /// Attach a serialized detail payload. Unserializable details are dropped.
    pub fn with_detail(mut self, detail: &impl Serialize) -> Self {
        self.detail = serde_json::to_value(detail).ok();
        self
    }
}
