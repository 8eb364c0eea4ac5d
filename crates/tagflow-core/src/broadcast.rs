// ── Broadcast gateway ──
//
// Fans out tag and health events to observers over a `broadcast`
// channel. Publishing never blocks: an observer that falls more than the
// channel capacity behind skips the missed events and carries on.
// Delivery is at-least-once for observers that keep up.

use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::{Stream, StreamExt, stream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{trace, warn};

use crate::model::{HealthRecord, ObserverEvent, Tag};
use crate::store::TagStore;

/// Publisher side of the observer channel.
pub struct BroadcastGateway {
    tx: broadcast::Sender<Arc<ObserverEvent>>,
    store: Arc<TagStore>,
    health: ArcSwap<Vec<HealthRecord>>,
}

impl BroadcastGateway {
    pub fn new(store: Arc<TagStore>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            store,
            health: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Push `event` to every connected observer. Returns how many received it.
    pub fn publish(&self, event: ObserverEvent) -> usize {
        trace!(kind = event.kind(), "publishing");
        // Sending with no observers is not an error.
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn publish_tag_added(&self, tag: Arc<Tag>) -> usize {
        self.publish(ObserverEvent::TagAdded(tag))
    }

    pub fn publish_tag_updated(&self, tag: Arc<Tag>) -> usize {
        self.publish(ObserverEvent::TagUpdated(tag))
    }

    /// Remember `records` as the current health and publish them.
    pub fn publish_health(&self, records: Vec<HealthRecord>) -> usize {
        let records = Arc::new(records);
        self.health.store(Arc::clone(&records));
        self.publish(ObserverEvent::HealthSnapshot(records))
    }

    /// The last published health snapshot.
    pub fn current_health(&self) -> Arc<Vec<HealthRecord>> {
        self.health.load_full()
    }

    /// Connect a new observer.
    ///
    /// The observer first receives the full tag snapshot and the current
    /// health snapshot, then incremental events. It is subscribed before
    /// the snapshot is taken, so an event racing the snapshot may arrive
    /// twice but is never lost.
    pub fn subscribe(&self) -> Subscription {
        let rx = self.tx.subscribe();
        let backlog = VecDeque::from([
            Arc::new(ObserverEvent::TagSnapshot(self.store.snapshot())),
            Arc::new(ObserverEvent::HealthSnapshot(self.current_health())),
        ]);
        Subscription { backlog, rx }
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One observer's view of the event stream. Dropping it unsubscribes.
pub struct Subscription {
    backlog: VecDeque<Arc<ObserverEvent>>,
    rx: broadcast::Receiver<Arc<ObserverEvent>>,
}

impl Subscription {
    /// Next event, skipping anything lost to lag. `None` once the gateway is gone.
    pub async fn recv(&mut self) -> Option<Arc<ObserverEvent>> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer lagging, events skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is ready right now.
    pub fn try_recv(&mut self) -> Option<Arc<ObserverEvent>> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer lagging, events skipped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream`, dropping lag errors.
    pub fn into_stream(self) -> impl Stream<Item = Arc<ObserverEvent>> + Send + 'static {
        let live = BroadcastStream::new(self.rx)
            .filter_map(|item| futures_util::future::ready(item.ok()));
        stream::iter(self.backlog).chain(live)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::Enrichment;

    fn tag(key: &str, order: u64) -> Tag {
        let now = Utc::now();
        Tag {
            identity_key: key.into(),
            raw_hex: key.into(),
            decoded_text: key.into(),
            antenna: 1,
            signal_strength: Some(-60),
            source_reader: "dock-1".into(),
            seen_count: 1,
            zone: "dock".into(),
            enrichment: Enrichment::default(),
            scan_order: order,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    #[tokio::test]
    async fn new_observer_gets_snapshots_before_increments() {
        let store = Arc::new(TagStore::new());
        store.upsert("a", |o| tag("a", o), |_| {});
        let gateway = BroadcastGateway::new(Arc::clone(&store), 8);
        gateway.publish_health(vec![HealthRecord::new("dock-1")]);

        let mut sub = gateway.subscribe();
        gateway.publish_tag_added(Arc::new(tag("b", 2)));

        let kinds: Vec<_> = [
            sub.recv().await.unwrap(),
            sub.recv().await.unwrap(),
            sub.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.kind())
        .collect();
        assert_eq!(kinds, vec!["tagSnapshot", "healthSnapshot", "tagAdded"]);
    }

    #[tokio::test]
    async fn publishing_without_observers_is_fine() {
        let gateway = BroadcastGateway::new(Arc::new(TagStore::new()), 8);
        assert_eq!(gateway.publish_tag_added(Arc::new(tag("a", 1))), 0);
        assert_eq!(gateway.observer_count(), 0);
    }

    #[tokio::test]
    async fn lagging_observer_skips_and_continues() {
        let gateway = BroadcastGateway::new(Arc::new(TagStore::new()), 2);
        let mut sub = gateway.subscribe();
        sub.recv().await.unwrap();
        sub.recv().await.unwrap();

        for order in 1..=5 {
            gateway.publish_tag_added(Arc::new(tag(&format!("t{order}"), order)));
        }
        let first = sub.recv().await.unwrap();
        let ObserverEvent::TagAdded(tag) = first.as_ref() else {
            panic!("expected tagAdded");
        };
        assert_eq!(tag.scan_order, 4);
    }

    #[tokio::test]
    async fn stream_yields_backlog_then_live_events() {
        let gateway = BroadcastGateway::new(Arc::new(TagStore::new()), 8);
        let stream = gateway.subscribe().into_stream();
        gateway.publish_tag_added(Arc::new(tag("a", 1)));
        drop(gateway);

        let kinds: Vec<_> = stream.map(|e| e.kind()).collect().await;
        assert_eq!(kinds, vec!["tagSnapshot", "healthSnapshot", "tagAdded"]);
    }

    #[test]
    fn events_serialize_with_type_and_payload() {
        let event = ObserverEvent::TagAdded(Arc::new(tag("FF01", 1)));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tagAdded");
        assert_eq!(json["payload"]["scanOrder"], 1);
        assert_eq!(json["payload"]["enrichment"]["itemCode"], "N/A");
    }
}
