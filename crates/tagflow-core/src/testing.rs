// Test doubles shared by the unit test modules.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tagflow_api::{Credentials, Error, ReaderTransport, ReferenceSource, ReferenceTable, SessionToken};

// ── Reference source ─────────────────────────────────────────────────

pub(crate) struct MockSource {
    table: ReferenceTable,
    delay: Option<Duration>,
    fetches: AtomicU64,
    failures_left: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new(table: ReferenceTable) -> Self {
        Self {
            table,
            delay: None,
            fetches: AtomicU64::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ReferenceSource for MockSource {
    async fn fetch_all(&self) -> Result<ReferenceTable, Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::SourceUnavailable {
                message: "sheet offline".into(),
            });
        }
        Ok(self.table.clone())
    }
}

// ── Reader transport ─────────────────────────────────────────────────

/// Scripted failure for one transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fail {
    Unreachable,
    Rejected,
    Unauthorized,
    Conflict,
}

impl Fail {
    fn into_error(self) -> Error {
        match self {
            Self::Unreachable => Error::Unreachable {
                message: "connection refused".into(),
            },
            Self::Rejected => Error::Rejected {
                message: "bad password".into(),
            },
            Self::Unauthorized => Error::Unauthorized,
            Self::Conflict => Error::Conflict {
                message: "inventory already running".into(),
            },
        }
    }
}

/// Reader transport that records calls and replays scripted failures.
///
/// Calls with nothing scripted succeed.
#[derive(Default)]
pub(crate) struct MockTransport {
    calls: Mutex<Vec<&'static str>>,
    auth: Mutex<VecDeque<Fail>>,
    start: Mutex<VecDeque<Fail>>,
    stop: Mutex<VecDeque<Fail>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn fail_auth(self, fail: Fail) -> Self {
        self.auth.lock().unwrap().push_back(fail);
        self
    }

    pub(crate) fn fail_start(self, fail: Fail) -> Self {
        self.start.lock().unwrap().push_back(fail);
        self
    }

    pub(crate) fn fail_stop(self, fail: Fail) -> Self {
        self.stop.lock().unwrap().push_back(fail);
        self
    }

    /// Queue more auth failures after construction.
    pub(crate) fn script_auth(&self, fails: &[Fail]) {
        self.auth.lock().unwrap().extend(fails.iter().copied());
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    async fn answer(&self, call: &'static str, script: &Mutex<VecDeque<Fail>>) -> Result<(), Error> {
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = script.lock().unwrap().pop_front();
        match next {
            Some(fail) => Err(fail.into_error()),
            None => Ok(()),
        }
    }
}

impl ReaderTransport for MockTransport {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<SessionToken, Error> {
        self.answer("authenticate", &self.auth).await?;
        Ok(SessionToken::new("token"))
    }

    async fn start(&self, _token: &SessionToken) -> Result<(), Error> {
        self.answer("start", &self.start).await
    }

    async fn stop(&self, _token: &SessionToken) -> Result<(), Error> {
        self.answer("stop", &self.stop).await
    }
}
