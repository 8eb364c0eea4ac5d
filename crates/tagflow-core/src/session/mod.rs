// ── Reader sessions ──
//
// One `SessionController` per reader endpoint, grouped in a `ReaderFleet`
// that applies aggregate scan modes across all of them.

mod controller;
mod fleet;
mod modes;

pub use controller::SessionController;
pub use fleet::ReaderFleet;
pub use modes::{ActiveModes, ScanModes};
