//! Async transport layer for RFID reader endpoints.
//!
//! - **[`ReaderTransport`]**: the lifecycle capability every reader backend
//!   implements (authenticate / start / stop). Two backends ship:
//!   [`HttpReader`] for readers exposing a local REST API and
//!   [`CallbackReader`] for readers driven through a vendor SDK.
//!   [`ReaderBackend`] dispatches over both.
//!
//! - **[`ReadSink`]**: the channel raw [`RawReadEvent`]s travel through on
//!   their way to ingestion. Pushed payloads are parsed with
//!   [`parse_push_payload`].
//!
//! - **[`ReferenceSource`]**: bulk fetch of the enrichment dataset, served
//!   over HTTP ([`HttpReferenceSource`]) or from disk
//!   ([`FileReferenceSource`]).

pub mod auth;
pub mod error;
pub mod reader;
pub mod reference;
pub mod transport;

pub use auth::{Credentials, SessionToken};
pub use error::Error;
pub use reader::{
    CallbackReader, HttpReader, RawReadEvent, ReadSink, ReaderBackend, ReaderTransport,
    parse_push_payload,
};
pub use reference::{
    FileReferenceSource, HttpReferenceSource, ReferenceBackend, ReferenceSource, ReferenceTable,
};
pub use transport::{TlsMode, TransportConfig};
