// ── Tag ingestion engine ──
//
// Turns raw read events into tag store updates:
// decode, scan gate, prefix filter, identity, then insert-or-update.
// A first sighting is enriched and zoned exactly once; later sightings
// only bump the counters and the latest-read fields.

use std::sync::Arc;

use serde::Serialize;
use tagflow_api::{RawReadEvent, ReaderTransport, ReferenceSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broadcast::BroadcastGateway;
use crate::cache::ReferenceCache;
use crate::config::IngestConfig;
use crate::decode::decode_identifier;
use crate::error::ErrorKind;
use crate::model::Tag;
use crate::session::{ReaderFleet, ScanModes};
use crate::store::{TagStore, Upserted};
use crate::zone::ZoneClassifier;

/// Why an event was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DropReason {
    /// No scan mode active.
    NotScanning,
    /// Decoded text matches no allow-listed prefix.
    PrefixRejected,
    /// Identifier was not valid hex.
    Malformed,
}

/// Result of ingesting one event.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Added(Arc<Tag>),
    Updated(Arc<Tag>),
    Dropped(DropReason),
}

/// Counts over a batch of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub added: usize,
    pub updated: usize,
    pub dropped: usize,
}

impl IngestSummary {
    fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Added(_) => self.added += 1,
            IngestOutcome::Updated(_) => self.updated += 1,
            IngestOutcome::Dropped(_) => self.dropped += 1,
        }
    }
}

/// Identity of a read: the secondary identifier when present, else the
/// primary, trimmed and uppercased.
pub fn identity_key(event: &RawReadEvent) -> String {
    event
        .secondary_hex
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| event.raw_hex.trim())
        .to_ascii_uppercase()
}

/// Validates, deduplicates, enriches and zones read events.
pub struct IngestionEngine<T, S> {
    store: Arc<TagStore>,
    cache: Arc<ReferenceCache<S>>,
    zones: ZoneClassifier,
    fleet: Arc<ReaderFleet<T>>,
    gateway: Arc<BroadcastGateway>,
    prefixes: Vec<String>,
}

impl<T: ReaderTransport, S: ReferenceSource> IngestionEngine<T, S> {
    pub fn new(
        store: Arc<TagStore>,
        cache: Arc<ReferenceCache<S>>,
        zones: ZoneClassifier,
        fleet: Arc<ReaderFleet<T>>,
        gateway: Arc<BroadcastGateway>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            store,
            cache,
            zones,
            fleet,
            gateway,
            prefixes: config.prefixes.clone(),
        }
    }

    fn modes(&self) -> &ScanModes {
        self.fleet.modes()
    }

    /// Process one event.
    pub async fn ingest(&self, event: RawReadEvent) -> IngestOutcome {
        let decoded = decode_identifier(&event.raw_hex);
        self.fleet.note_tag_seen(&event.source_reader, event.observed_at);

        if !self.modes().any_active() {
            return IngestOutcome::Dropped(DropReason::NotScanning);
        }

        if decoded.is_malformed() {
            debug!(
                reader = %event.source_reader,
                raw = %event.raw_hex,
                kind = %ErrorKind::MalformedEvent,
                "dropping undecodable identifier"
            );
            return IngestOutcome::Dropped(DropReason::Malformed);
        }

        let text = decoded.text();
        if !self.accepts(text) {
            debug!(reader = %event.source_reader, text, "prefix rejected");
            return IngestOutcome::Dropped(DropReason::PrefixRejected);
        }

        // Notifications are published under the key's shard lock, so
        // observers see a tag's events in the order the store applied them.
        let key = identity_key(&event);
        let known = self.store.update_and_then(
            &key,
            |tag| record_sighting(tag, &event),
            |tag| {
                self.gateway.publish_tag_updated(Arc::clone(tag));
            },
        );
        if let Some(tag) = known {
            return IngestOutcome::Updated(tag);
        }

        // First sighting as far as we know. Enrichment may await a reload,
        // so it happens outside the store; the upsert settles any race.
        let enrichment = self
            .cache
            .lookup(text)
            .await
            .map(|entry| entry.enrichment.clone())
            .unwrap_or_default();
        let zone = self.zones.classify(&event.source_reader, event.antenna).to_owned();

        let upserted = self.store.upsert_and_then(
            &key,
            |scan_order| Tag {
                identity_key: key.clone(),
                raw_hex: event.raw_hex.trim().to_owned(),
                decoded_text: text.to_owned(),
                antenna: event.antenna,
                signal_strength: event.signal_strength,
                source_reader: event.source_reader.clone(),
                seen_count: 1,
                zone,
                enrichment,
                scan_order,
                first_seen_at: event.observed_at,
                last_seen_at: event.observed_at,
            },
            |tag| record_sighting(tag, &event),
            |upserted| match upserted {
                Upserted::Added(tag) => {
                    self.gateway.publish_tag_added(Arc::clone(tag));
                }
                Upserted::Updated(tag) => {
                    self.gateway.publish_tag_updated(Arc::clone(tag));
                }
            },
        );

        match upserted {
            Upserted::Added(tag) => {
                debug!(key = %key, zone = %tag.zone, order = tag.scan_order, "new tag");
                IngestOutcome::Added(tag)
            }
            Upserted::Updated(tag) => IngestOutcome::Updated(tag),
        }
    }

    /// Process events in order.
    pub async fn ingest_batch(&self, events: impl IntoIterator<Item = RawReadEvent>) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for event in events {
            let outcome = self.ingest(event).await;
            summary.record(&outcome);
        }
        summary
    }

    /// Drain the read channel until cancelled or every sender is gone.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<RawReadEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    self.ingest(event).await;
                }
            }
        }
        debug!("ingestion pump stopped");
    }

    fn accepts(&self, text: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| text.starts_with(p.as_str()))
    }
}

/// Latest-read fields move; zone and enrichment stay as first seen.
fn record_sighting(tag: &mut Tag, event: &RawReadEvent) {
    tag.seen_count += 1;
    tag.signal_strength = event.signal_strength;
    tag.source_reader.clone_from(&event.source_reader);
    tag.antenna = event.antenna;
    if event.observed_at > tag.last_seen_at {
        tag.last_seen_at = event.observed_at;
    }
}
