// ── Tag storage ──

mod tag_store;

pub use tag_store::{TagStore, Upserted};
