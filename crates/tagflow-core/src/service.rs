// ── Tag service facade ──
//
// Owns every component and the background tasks: the health monitor and
// the ingestion pump. Cheaply cloneable via `Arc<ServiceInner>`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tagflow_api::{
    CallbackReader, FileReferenceSource, HttpReader, HttpReferenceSource, RawReadEvent, ReadSink,
    ReaderBackend, ReaderTransport, ReferenceBackend, ReferenceSource, ReferenceTable,
    parse_push_payload,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastGateway, Subscription};
use crate::cache::ReferenceCache;
use crate::command::{Command, CommandResult};
use crate::config::{EndpointAddress, HealthConfig, ReferenceSourceConfig, ServiceConfig};
use crate::error::CoreError;
use crate::health::{CycleReport, HealthMonitor};
use crate::ingest::{IngestOutcome, IngestSummary, IngestionEngine};
use crate::model::{AggregateOutcome, HealthRecord, ObserverEvent, ScanMode, Tag};
use crate::session::{ActiveModes, ReaderFleet, ScanModes, SessionController};
use crate::store::TagStore;
use crate::zone::ZoneClassifier;

/// The assembled ingestion, session and broadcast service.
pub struct TagService<T = ReaderBackend, S = ReferenceBackend> {
    inner: Arc<ServiceInner<T, S>>,
}

impl<T, S> Clone for TagService<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ServiceInner<T, S> {
    fleet: Arc<ReaderFleet<T>>,
    store: Arc<TagStore>,
    cache: Arc<ReferenceCache<S>>,
    gateway: Arc<BroadcastGateway>,
    engine: Arc<IngestionEngine<T, S>>,
    health: HealthConfig,
    sink: ReadSink,
    sink_rx: Mutex<Option<mpsc::Receiver<RawReadEvent>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

// ── Construction from configuration ──────────────────────────────────

impl TagService {
    /// Build the concrete reader and reference backends named in `config`.
    pub fn from_config(config: ServiceConfig) -> Result<Self, CoreError> {
        let (sink, rx) = ReadSink::channel(config.read_capacity);

        let mut transports = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let backend = match &endpoint.address {
                EndpointAddress::Http(url) => {
                    ReaderBackend::Http(HttpReader::new(url.clone(), &config.transport)?)
                }
                EndpointAddress::Callback(address) => ReaderBackend::Callback(CallbackReader::new(
                    &endpoint.name,
                    address,
                    config.transport.timeout,
                    sink.clone(),
                )),
            };
            transports.push(backend);
        }

        let source = match &config.reference.source {
            ReferenceSourceConfig::Http { url, bearer } => ReferenceBackend::Http(
                HttpReferenceSource::new(url.clone(), bearer.clone(), &config.transport)?,
            ),
            ReferenceSourceConfig::File(path) => {
                ReferenceBackend::File(FileReferenceSource::new(path))
            }
            ReferenceSourceConfig::None => ReferenceBackend::Static(ReferenceTable {
                columns: vec![config.reference.columns.key.clone()],
                rows: Vec::new(),
            }),
        };

        Self::with_sink(config, transports, source, sink, rx)
    }

    /// The SDK-callback reader behind `endpoint`, if it is one.
    pub fn callback_reader(&self, endpoint: &str) -> Option<&CallbackReader> {
        match self.inner.fleet.get(endpoint)?.transport() {
            ReaderBackend::Callback(reader) => Some(reader),
            ReaderBackend::Http(_) => None,
        }
    }

    /// Route one pushed read payload into ingestion. Reads naming an
    /// SDK-callback reader go through that reader, so they are only
    /// forwarded while it runs; the rest go straight to the sink.
    ///
    /// Returns how many reads were forwarded.
    pub fn route_push(&self, default_reader: &str, payload: &[u8]) -> Result<usize, CoreError> {
        let events = parse_push_payload(default_reader, payload).map_err(|e| CoreError::MalformedEvent {
            message: e.to_string(),
        })?;
        let total = events.len();
        let forwarded = events
            .into_iter()
            .map(|event| match self.callback_reader(&event.source_reader) {
                Some(reader) => reader.deliver(event),
                None => self.inner.sink.deliver(event),
            })
            .filter(|delivered| *delivered)
            .count();
        debug!(total, forwarded, "pushed reads routed");
        Ok(forwarded)
    }
}

impl<T: ReaderTransport, S: ReferenceSource> TagService<T, S> {
    /// Assemble the service over caller-supplied transports, one per
    /// configured endpoint, in order.
    pub fn new(config: ServiceConfig, transports: Vec<T>, source: S) -> Result<Self, CoreError> {
        let (sink, rx) = ReadSink::channel(config.read_capacity);
        Self::with_sink(config, transports, source, sink, rx)
    }

    /// Like [`new`](Self::new), with a read channel the transports already share.
    pub fn with_sink(
        config: ServiceConfig,
        transports: Vec<T>,
        source: S,
        sink: ReadSink,
        sink_rx: mpsc::Receiver<RawReadEvent>,
    ) -> Result<Self, CoreError> {
        if transports.len() != config.endpoints.len() {
            return Err(CoreError::Config {
                message: format!(
                    "{} transports supplied for {} endpoints",
                    transports.len(),
                    config.endpoints.len()
                ),
            });
        }

        let controllers = config
            .endpoints
            .iter()
            .zip(transports)
            .map(|(endpoint, transport)| SessionController::new(endpoint, transport, config.session))
            .collect();
        let fleet = Arc::new(ReaderFleet::new(controllers, Arc::new(ScanModes::new())));
        let store = Arc::new(TagStore::new());
        let gateway = Arc::new(BroadcastGateway::new(
            Arc::clone(&store),
            config.observer_capacity,
        ));
        let cache = Arc::new(ReferenceCache::new(source, &config.reference));
        let engine = Arc::new(IngestionEngine::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            ZoneClassifier::new(config.zones.clone()),
            Arc::clone(&fleet),
            Arc::clone(&gateway),
            &config.ingest,
        ));
        gateway.publish_health(fleet.health_snapshot());

        Ok(Self {
            inner: Arc::new(ServiceInner {
                fleet,
                store,
                cache,
                gateway,
                engine,
                health: config.health,
                sink,
                sink_rx: Mutex::new(Some(sink_rx)),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                shutdown_grace: config.shutdown_grace,
            }),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the health monitor and the ingestion pump. Calling it again
    /// is a no-op.
    pub async fn spawn_background(&self) {
        let Some(rx) = self.inner.sink_rx.lock().await.take() else {
            debug!("background tasks already running");
            return;
        };

        let monitor = HealthMonitor::new(
            Arc::clone(&self.inner.fleet),
            Arc::clone(&self.inner.gateway),
            self.inner.health,
        );
        let pump = Arc::clone(&self.inner.engine);
        let mut tasks = self.inner.tasks.lock().await;
        tasks.push(tokio::spawn(monitor.run(self.inner.cancel.child_token())));
        tasks.push(tokio::spawn(pump.run(rx, self.inner.cancel.child_token())));
        info!(endpoints = self.inner.fleet.controllers().len(), "background tasks started");
    }

    /// Stop the readers, cancel background tasks and wait for them, each
    /// bounded by the shutdown grace period.
    pub async fn shutdown(&self) {
        let grace = self.inner.shutdown_grace;
        if tokio::time::timeout(grace, self.inner.fleet.stop_everything())
            .await
            .is_err()
        {
            warn!(grace_secs = grace.as_secs(), "readers did not stop within the grace period");
        }

        self.inner.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.inner.tasks.lock().await.drain(..).collect();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(grace, join_all(handles)).await.is_err() {
            warn!("background tasks did not finish within the grace period, aborting");
            for handle in aborts {
                handle.abort();
            }
        }
        info!("service stopped");
    }

    // ── Scan control ─────────────────────────────────────────────────

    pub async fn start_all(&self, mode: ScanMode) -> AggregateOutcome {
        let outcome = self.inner.fleet.start_all(mode).await;
        self.publish_health();
        outcome
    }

    pub async fn stop_all(&self, mode: ScanMode) -> AggregateOutcome {
        let outcome = self.inner.fleet.stop_all(mode).await;
        self.publish_health();
        outcome
    }

    /// Force every reader to stop, whatever state this process believes
    /// it is in.
    pub async fn reset_all(&self) -> AggregateOutcome {
        let outcome = self.inner.fleet.reset_all().await;
        self.publish_health();
        outcome
    }

    /// Remove tags in `zone`, or all tags. Returns how many were removed.
    pub fn clear(&self, zone: Option<&str>) -> usize {
        let removed = match zone {
            Some(zone) => self.inner.store.clear_zone(zone),
            None => self.inner.store.clear_all(),
        };
        info!(zone = zone.unwrap_or("*"), removed, "tags cleared");
        self.inner.gateway.publish(ObserverEvent::TagsCleared {
            zone: zone.map(str::to_owned),
            removed,
        });
        removed
    }

    pub fn active_modes(&self) -> ActiveModes {
        self.inner.fleet.modes().snapshot()
    }

    // ── Ingestion ────────────────────────────────────────────────────

    pub async fn ingest(&self, event: RawReadEvent) -> IngestOutcome {
        self.inner.engine.ingest(event).await
    }

    pub async fn ingest_batch(&self, events: impl IntoIterator<Item = RawReadEvent>) -> IngestSummary {
        self.inner.engine.ingest_batch(events).await
    }

    /// Producer handle for reads that arrive on their own schedule.
    pub fn sink(&self) -> ReadSink {
        self.inner.sink.clone()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Vec<Arc<Tag>> {
        self.inner.store.snapshot()
    }

    pub fn health(&self) -> Vec<HealthRecord> {
        self.inner.fleet.health_snapshot()
    }

    /// Health of one reader, matched by name ignoring case.
    pub fn endpoint_health(&self, name: &str) -> Result<HealthRecord, CoreError> {
        self.inner
            .fleet
            .get(name)
            .map(|controller| controller.health())
            .ok_or_else(|| CoreError::EndpointNotFound { name: name.to_owned() })
    }

    /// Run one health cycle now, outside the background schedule.
    pub async fn poll_health(&self) -> CycleReport {
        HealthMonitor::new(
            Arc::clone(&self.inner.fleet),
            Arc::clone(&self.inner.gateway),
            self.inner.health,
        )
        .poll_cycle()
        .await
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.gateway.subscribe()
    }

    pub fn fleet(&self) -> &Arc<ReaderFleet<T>> {
        &self.inner.fleet
    }

    pub fn store(&self) -> &Arc<TagStore> {
        &self.inner.store
    }

    // ── Reference data ───────────────────────────────────────────────

    pub fn force_refresh_cache(&self) {
        self.inner.cache.force_refresh();
    }

    pub async fn reload_cache(&self) -> Result<usize, CoreError> {
        self.inner.cache.reload().await
    }

    // ── Command execution ────────────────────────────────────────────

    /// Execute a control request.
    pub async fn execute(&self, command: Command) -> CommandResult {
        match command {
            Command::StartAll { mode } => {
                let outcome = self.start_all(mode).await;
                let message = aggregate_message("started", mode, &outcome);
                CommandResult::new(outcome.success, message).with_detail(&outcome)
            }
            Command::StopAll { mode } => {
                let outcome = self.stop_all(mode).await;
                let message = aggregate_message("stopped", mode, &outcome);
                CommandResult::new(outcome.success, message).with_detail(&outcome)
            }
            Command::Clear { zone } => {
                let removed = self.clear(zone.as_deref());
                let scope = zone.map_or_else(|| "all zones".to_owned(), |z| format!("zone '{z}'"));
                CommandResult::ok(format!("Removed {removed} tag(s) from {scope}"))
            }
            Command::Snapshot => {
                let tags = self.snapshot();
                CommandResult::ok(format!("{} tag(s) known", tags.len())).with_detail(&tags)
            }
            Command::Health => {
                let records = self.health();
                let reachable = records.iter().filter(|r| r.reachable).count();
                CommandResult::ok(format!("{reachable}/{} reader(s) reachable", records.len()))
                    .with_detail(&records)
            }
            Command::ForceRefreshCache => {
                self.force_refresh_cache();
                CommandResult::ok("Reference cache cleared; the next lookup reloads it")
            }
        }
    }

    fn publish_health(&self) {
        self.inner.gateway.publish_health(self.inner.fleet.health_snapshot());
    }
}

fn aggregate_message(verb: &str, mode: ScanMode, outcome: &AggregateOutcome) -> String {
    let total = outcome.endpoints.len();
    let failed = outcome.failed().count();
    if failed == 0 {
        format!("{mode} scan {verb} on {total} reader(s)")
    } else {
        format!("{mode} scan {verb} on {}/{total} reader(s), {failed} failed", total - failed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tagflow_api::Credentials;

    use super::*;
    use crate::config::{EndpointConfig, ZoneRule};
    use crate::error::ErrorKind;
    use crate::model::SessionState;
    use crate::testing::{Fail, MockSource, MockTransport};

    fn endpoint(name: &str) -> EndpointConfig {
        EndpointConfig {
            name: name.into(),
            address: EndpointAddress::Callback("127.0.0.1:5084".into()),
            credentials: Credentials::new("admin", "secret"),
        }
    }

    fn source() -> MockSource {
        MockSource::new(ReferenceTable {
            columns: vec!["Tag ID".into()],
            rows: Vec::new(),
        })
    }

    fn service(transports: Vec<MockTransport>) -> TagService<MockTransport, MockSource> {
        let config = ServiceConfig {
            endpoints: (0..transports.len()).map(|i| endpoint(&format!("dock-{i}"))).collect(),
            zones: vec![ZoneRule::new("dock-0", 1..=4, "inbound")],
            ..ServiceConfig::default()
        };
        TagService::new(config, transports, source()).unwrap()
    }

    #[test]
    fn transport_count_must_match_endpoints() {
        let config = ServiceConfig {
            endpoints: vec![endpoint("dock-0")],
            ..ServiceConfig::default()
        };
        let err = TagService::new(config, Vec::<MockTransport>::new(), source())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_commands_report_per_endpoint() {
        let svc = service(vec![
            MockTransport::new(),
            MockTransport::new().fail_start(Fail::Conflict),
        ]);

        let result = svc.execute(Command::StartAll { mode: ScanMode::Standard }).await;
        assert!(result.success);
        assert_eq!(result.message, "standard scan started on 2 reader(s)");
        let detail = result.detail.unwrap();
        assert_eq!(detail["endpoints"][1]["detail"], "recoveredFromConflict");

        let result = svc.execute(Command::StopAll { mode: ScanMode::Standard }).await;
        assert!(result.success);
        assert!(svc.fleet().controllers().iter().all(|c| c.state() == SessionState::Idle));
        assert!(!svc.active_modes().any());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_by_zone_publishes_and_reports() {
        let svc = service(vec![MockTransport::new()]);
        svc.start_all(ScanMode::Standard).await;
        svc.ingest(RawReadEvent::new("dock-0", "464631", 2)).await;
        svc.ingest(RawReadEvent::new("dock-0", "464632", 9)).await;

        let mut sub = svc.subscribe();
        sub.recv().await.unwrap();
        sub.recv().await.unwrap();

        let result = svc.execute(Command::Clear { zone: Some("inbound".into()) }).await;
        assert_eq!(result.message, "Removed 1 tag(s) from zone 'inbound'");
        assert_eq!(svc.snapshot().len(), 1);
        assert_eq!(sub.recv().await.unwrap().kind(), "tagsCleared");
    }

    #[tokio::test(start_paused = true)]
    async fn health_command_counts_reachable_readers() {
        let svc = service(vec![
            MockTransport::new(),
            MockTransport::new().fail_auth(Fail::Unreachable),
        ]);
        svc.poll_health().await;
        let result = svc.execute(Command::Health).await;
        assert_eq!(result.message, "1/2 reader(s) reachable");
    }

    #[tokio::test(start_paused = true)]
    async fn background_pump_ingests_and_shutdown_stops_readers() {
        let svc = service(vec![MockTransport::new()]);
        svc.spawn_background().await;
        svc.spawn_background().await;
        svc.start_all(ScanMode::Standard).await;

        svc.sink().deliver(RawReadEvent::new("dock-0", "464631", 1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(svc.snapshot().len(), 1);

        svc.shutdown().await;
        let controller = &svc.fleet().controllers()[0];
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.transport().count("stop"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_health_is_looked_up_by_name() {
        let svc = service(vec![MockTransport::new(), MockTransport::new()]);
        svc.poll_health().await;

        let record = svc.endpoint_health("DOCK-1").unwrap();
        assert_eq!(record.endpoint, "dock-1");
        assert!(record.reachable);

        let err = svc.endpoint_health("dock-9").unwrap_err();
        assert!(matches!(err, CoreError::EndpointNotFound { ref name } if name == "dock-9"));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn pushed_payloads_reach_the_sink_or_are_malformed() {
        let svc = TagService::from_config(ServiceConfig::default()).unwrap();
        let forwarded = svc
            .route_push("push", br#"[{"data":{"idHex":"4646","antenna":1}},{"data":{"idHex":"4647","antenna":2}}]"#)
            .unwrap();
        assert_eq!(forwarded, 2);

        let mut rx = svc.inner.sink_rx.lock().await.take().unwrap();
        assert_eq!(rx.try_recv().unwrap().raw_hex, "4646");
        assert_eq!(rx.try_recv().unwrap().raw_hex, "4647");

        let err = svc.route_push("push", b"not json at all").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEvent);
    }
}
