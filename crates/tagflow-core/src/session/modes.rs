// ── Aggregate scan modes ──
//
// Two named flags shared by every reader. Readers scan while either is
// set; ingestion drops reads while neither is.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::model::ScanMode;

/// Snapshot of both flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveModes {
    pub standard: bool,
    pub directed_search: bool,
}

impl ActiveModes {
    pub fn any(self) -> bool {
        self.standard || self.directed_search
    }
}

/// The aggregate scan-mode flags.
#[derive(Debug, Default)]
pub struct ScanModes {
    standard: AtomicBool,
    directed_search: AtomicBool,
}

impl ScanModes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `mode`. Returns whether it was already set.
    pub fn activate(&self, mode: ScanMode) -> bool {
        self.flag(mode).swap(true, Ordering::AcqRel)
    }

    /// Clear `mode`. Returns whether it was set.
    pub fn deactivate(&self, mode: ScanMode) -> bool {
        self.flag(mode).swap(false, Ordering::AcqRel)
    }

    pub fn deactivate_all(&self) {
        self.standard.store(false, Ordering::Release);
        self.directed_search.store(false, Ordering::Release);
    }

    pub fn is_active(&self, mode: ScanMode) -> bool {
        self.flag(mode).load(Ordering::Acquire)
    }

    pub fn any_active(&self) -> bool {
        self.snapshot().any()
    }

    pub fn snapshot(&self) -> ActiveModes {
        ActiveModes {
            standard: self.standard.load(Ordering::Acquire),
            directed_search: self.directed_search.load(Ordering::Acquire),
        }
    }

    fn flag(&self, mode: ScanMode) -> &AtomicBool {
        match mode {
            ScanMode::Standard => &self.standard,
            ScanMode::DirectedSearch => &self.directed_search,
        }
    }
}
