// ── Domain model ──
//
// Plain data types shared by the services. Serialized in camelCase for
// observers.

mod event;
mod health;
mod session;
mod tag;

pub use event::ObserverEvent;
pub use health::HealthRecord;
pub use session::{
    AggregateOutcome, EndpointOutcome, ScanMode, SessionState, StartOutcome, StopOutcome,
};
pub use tag::{Enrichment, NOT_AVAILABLE, ReferenceEntry, Tag};
