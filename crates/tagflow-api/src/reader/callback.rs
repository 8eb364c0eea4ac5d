// SDK-callback reader
//
// Readers driven through a vendor SDK deliver tag reads through a
// callback instead of an HTTP push. The SDK shim calls
// [`CallbackReader::deliver`]; reads are forwarded to the ingestion sink
// only while inventory is running. Authentication probes the SDK port and
// mints a local session token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::{RawReadEvent, ReadSink, ReaderTransport};
use crate::auth::{Credentials, SessionToken};
use crate::error::Error;

/// Reader whose reads arrive through SDK callbacks.
#[derive(Debug)]
pub struct CallbackReader {
    name: String,
    /// SDK endpoint, `host:port`.
    address: String,
    connect_timeout: Duration,
    sink: ReadSink,
    session: ArcSwapOption<String>,
    running: AtomicBool,
}

impl CallbackReader {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        connect_timeout: Duration,
        sink: ReadSink,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            connect_timeout,
            sink,
            session: ArcSwapOption::empty(),
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether inventory is currently running on this reader.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// SDK callback entry point.
    ///
    /// Returns `true` if the read was forwarded. Reads arriving while the
    /// inventory is stopped are dropped, as the device would not report them.
    pub fn deliver(&self, mut event: RawReadEvent) -> bool {
        if !self.is_running() {
            trace!(reader = %self.name, "read outside inventory window dropped");
            return false;
        }
        if event.source_reader.is_empty() {
            event.source_reader.clone_from(&self.name);
        }
        self.sink.deliver(event)
    }

    fn check_token(&self, token: &SessionToken) -> Result<(), Error> {
        let current = self.session.load();
        match current.as_deref() {
            Some(active) if active.as_str() == token.expose() => Ok(()),
            _ => Err(Error::Unauthorized),
        }
    }
}

impl ReaderTransport for CallbackReader {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<SessionToken, Error> {
        debug!(reader = %self.name, address = %self.address, "probing SDK endpoint");

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => {}
            Ok(Err(e)) => {
                return Err(Error::Unreachable {
                    message: format!("{}: {e}", self.address),
                });
            }
            Err(_) => {
                return Err(Error::Unreachable {
                    message: format!(
                        "{}: connect timed out after {}ms",
                        self.address,
                        self.connect_timeout.as_millis()
                    ),
                });
            }
        }

        let token = uuid::Uuid::new_v4().to_string();
        self.session.store(Some(Arc::new(token.clone())));
        Ok(SessionToken::new(token))
    }

    async fn start(&self, token: &SessionToken) -> Result<(), Error> {
        self.check_token(token)?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::Conflict {
                message: "inventory already running".into(),
            });
        }
        debug!(reader = %self.name, "inventory started");
        Ok(())
    }

    async fn stop(&self, token: &SessionToken) -> Result<(), Error> {
        self.check_token(token)?;
        self.running.store(false, Ordering::Release);
        debug!(reader = %self.name, "inventory stopped");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listening_reader() -> (TcpListener, CallbackReader, tokio::sync::mpsc::Receiver<RawReadEvent>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (sink, rx) = ReadSink::channel(16);
        let reader = CallbackReader::new("handheld-1", addr, Duration::from_secs(1), sink);
        (listener, reader, rx)
    }

    #[tokio::test]
    async fn deliver_forwards_only_while_running() {
        let (_listener, reader, mut rx) = listening_reader().await;
        let token = reader.authenticate(&Credentials::new("", "")).await.unwrap();

        assert!(!reader.deliver(RawReadEvent::new("", "4646", 1)));

        reader.start(&token).await.unwrap();
        assert!(reader.deliver(RawReadEvent::new("", "4646", 1)));
        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.source_reader, "handheld-1");

        reader.stop(&token).await.unwrap();
        assert!(!reader.deliver(RawReadEvent::new("", "4646", 1)));
    }

    #[tokio::test]
    async fn second_start_reports_conflict() {
        let (_listener, reader, _rx) = listening_reader().await;
        let token = reader.authenticate(&Credentials::new("", "")).await.unwrap();
        reader.start(&token).await.unwrap();
        assert!(reader.start(&token).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn stale_token_is_unauthorized() {
        let (_listener, reader, _rx) = listening_reader().await;
        let old = reader.authenticate(&Credentials::new("", "")).await.unwrap();
        let _fresh = reader.authenticate(&Credentials::new("", "")).await.unwrap();
        assert!(reader.start(&old).await.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let (sink, _rx) = ReadSink::channel(16);
        let reader = CallbackReader::new("handheld-2", addr, Duration::from_secs(1), sink);
        let err = reader.authenticate(&Credentials::new("", "")).await.unwrap_err();
        assert!(matches!(err, Error::Unreachable { .. }));
    }
}
