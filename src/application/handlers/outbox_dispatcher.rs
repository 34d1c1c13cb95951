use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    application::services::transport::Transport,
    domain::{
        events::{DispatchedEvent, DomainEvent},
        models::OutboxEvent,
        repositories::OutboxRepository,
    },
};

#[derive(Debug, Clone)]
pub struct OutboxDispatcherConfig {
    pub enabled: bool,
    pub dispatch_interval: Duration,
    pub batch_size: u32,
    pub lease_duration: Duration,
    pub retry_cooldown: Duration,
    /// Failed attempts after which a row is quarantined. Zero disables the cap.
    pub max_attempts: u32,
}

impl Default for OutboxDispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dispatch_interval: Duration::from_secs(2),
            batch_size: 50,
            lease_duration: Duration::from_secs(30),
            retry_cooldown: Duration::from_secs(3),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub leased: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub quarantined: usize,
}

enum Outcome {
    Dispatched,
    Failed,
    Quarantined,
}

/// Moves committed outbox rows to the transport.
///
/// Any number of dispatchers may run against the same outbox; the lease on
/// each row keeps them from publishing it concurrently.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    transport: Arc<dyn Transport>,
    config: OutboxDispatcherConfig,
    instance_id: String,
}

impl OutboxDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        transport: Arc<dyn Transport>,
        config: OutboxDispatcherConfig,
    ) -> Self {
        Self {
            outbox,
            transport,
            config,
            instance_id: default_instance_id(),
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("outbox dispatcher disabled");
            return;
        }
        info!(
            instance_id = %self.instance_id,
            batch_size = self.config.batch_size,
            interval_ms = self.config.dispatch_interval.as_millis() as u64,
            "outbox dispatcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.dispatch_batch().await {
                Ok(report) if report.leased > 0 => debug!(
                    leased = report.leased,
                    dispatched = report.dispatched,
                    failed = report.failed,
                    quarantined = report.quarantined,
                    "outbox batch finished"
                ),
                Ok(_) => {}
                Err(err) => error!(error = %format!("{err:#}"), "outbox batch failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.dispatch_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(instance_id = %self.instance_id, "outbox dispatcher stopped");
    }

    /// Leases one batch and attempts every row in it, oldest first.
    pub async fn dispatch_batch(&self) -> anyhow::Result<DispatchReport> {
        let now = Utc::now();
        let lease_until = now + to_chrono(self.config.lease_duration);
        let mut batch = self
            .outbox
            .lease_batch(&self.instance_id, self.config.batch_size, now, lease_until)
            .await
            .context("failed to lease outbox batch")?;
        batch.sort_by_key(|event| event.occurred_at);

        let mut report = DispatchReport {
            leased: batch.len(),
            ..DispatchReport::default()
        };
        for event in &batch {
            let span = info_span!(
                "outbox_dispatch",
                outbox_id = %event.id,
                event_type = %event.event_type,
                correlation_id = %event.correlation_id,
                instance_id = %self.instance_id,
            );
            match self.dispatch_one(event).instrument(span).await {
                Outcome::Dispatched => report.dispatched += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Quarantined => report.quarantined += 1,
            }
        }
        Ok(report)
    }

    async fn dispatch_one(&self, event: &OutboxEvent) -> Outcome {
        let attempt = event.attempt_count + 1;
        debug!(attempt, "dispatching outbox event");

        let decoded = match DomainEvent::decode(&event.event_type, &event.payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                error!(error = %err, "outbox event cannot be decoded, quarantining");
                self.quarantine(event.id, &err.to_string()).await;
                return Outcome::Quarantined;
            }
        };

        let dispatched = DispatchedEvent {
            outbox_id: event.id,
            occurred_at: event.occurred_at,
            correlation_id: event.correlation_id.clone(),
            event: decoded,
        };

        match self.transport.publish(&dispatched).await {
            Ok(()) => {
                // If this write is lost the row is re-leased after expiry and
                // published again; consumers tolerate the duplicate.
                if let Err(err) = self.outbox.mark_dispatched(event.id, Utc::now()).await {
                    error!(error = %format!("{err:#}"), "failed to record dispatch");
                }
                info!(attempt, "outbox event dispatched");
                Outcome::Dispatched
            }
            Err(err) => {
                let reason = format!("{err:#}");
                if self.config.max_attempts > 0 && attempt >= self.config.max_attempts {
                    error!(attempt, error = %reason, "dispatch attempts exhausted, quarantining");
                    self.quarantine(event.id, &reason).await;
                    return Outcome::Quarantined;
                }
                let retry_at = Utc::now() + to_chrono(self.config.retry_cooldown);
                warn!(attempt, error = %reason, %retry_at, "dispatch failed, will retry");
                if let Err(err) = self.outbox.mark_failed(event.id, &reason, retry_at).await {
                    error!(error = %format!("{err:#}"), "failed to record dispatch failure");
                }
                Outcome::Failed
            }
        }
    }

    async fn quarantine(&self, id: Uuid, reason: &str) {
        if let Err(err) = self.outbox.quarantine(id, reason, Utc::now()).await {
            error!(error = %format!("{err:#}"), "failed to quarantine outbox event");
        }
    }
}

/// `{host}:{8 hex chars}`, unique per process start.
pub fn default_instance_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "local".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}:{}", host, &suffix[..8])
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration as ChronoDuration;
    use mockall::predicate::always;

    use super::*;
    use crate::{
        application::services::{outbox_writer::OutboxWriter, transport::MockTransport},
        domain::{
            events::{DOCUMENT_UPLOADED, DocumentUploadedEvent},
            models::OutboxState,
            repositories::UnitOfWorkFactory,
            value_objects::ContentHandle,
        },
        infrastructure::repositories::in_memory::InMemoryStore,
    };

    fn config() -> OutboxDispatcherConfig {
        OutboxDispatcherConfig {
            dispatch_interval: Duration::from_millis(10),
            retry_cooldown: Duration::from_secs(3),
            max_attempts: 3,
            ..OutboxDispatcherConfig::default()
        }
    }

    fn uploaded() -> DomainEvent {
        let shipment_id = Uuid::new_v4();
        DomainEvent::DocumentUploaded(DocumentUploadedEvent {
            shipment_id,
            document_id: Uuid::new_v4(),
            content_handle: ContentHandle::generate(shipment_id, "invoice.pdf"),
            correlation_id: "corr-1".into(),
        })
    }

    async fn enqueue(store: &InMemoryStore, event_type: &str, payload: String) -> OutboxEvent {
        let writer = OutboxWriter::new();
        let mut uow = store.begin().await.unwrap();
        let row = writer
            .enqueue(uow.as_mut(), event_type, payload, "corr-1")
            .await
            .unwrap();
        uow.commit().await.unwrap();
        row
    }

    fn dispatcher(store: &InMemoryStore, transport: MockTransport) -> OutboxDispatcher {
        OutboxDispatcher::new(Arc::new(store.clone()), Arc::new(transport), config())
            .with_instance_id("test:00000000")
    }

    #[tokio::test]
    async fn publishes_and_marks_dispatched() {
        let store = InMemoryStore::new();
        let event = uploaded();
        let row = enqueue(&store, DOCUMENT_UPLOADED, event.encode().unwrap()).await;
        let row_id = row.id;
        let mut transport = MockTransport::new();
        transport
            .expect_publish()
            .withf(move |dispatched| {
                dispatched.outbox_id == row_id && dispatched.correlation_id == "corr-1"
            })
            .times(1)
            .returning(|_| Ok(()));

        let report = dispatcher(&store, transport).dispatch_batch().await.unwrap();

        assert_eq!(report.dispatched, 1);
        let stored = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), OutboxState::Dispatched);
        assert_eq!(stored.attempt_count, 0);
    }

    #[tokio::test]
    async fn publish_failure_records_error_and_cooldown() {
        let store = InMemoryStore::new();
        let row = enqueue(&store, DOCUMENT_UPLOADED, uploaded().encode().unwrap()).await;
        let mut transport = MockTransport::new();
        transport
            .expect_publish()
            .with(always())
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("broker unavailable")));
        let dispatcher = dispatcher(&store, transport);

        let report = dispatcher.dispatch_batch().await.unwrap();
        let again = dispatcher.dispatch_batch().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(again.leased, 0, "row is cooling down");
        let stored = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), OutboxState::Pending);
        assert_eq!(stored.attempt_count, 1);
        assert!(stored.last_error.as_deref().unwrap().contains("broker unavailable"));
        let retry_at = stored.lease_until.unwrap();
        assert!(retry_at > Utc::now() + ChronoDuration::seconds(2));
        assert!(stored.is_eligible(retry_at + ChronoDuration::milliseconds(1)));
    }

    #[tokio::test]
    async fn undecodable_rows_are_quarantined_without_publishing() {
        let store = InMemoryStore::new();
        let unknown = enqueue(&store, "ShipmentCancelled", "{}".into()).await;
        let malformed = enqueue(&store, DOCUMENT_UPLOADED, "{\"oops\":true}".into()).await;
        let mut transport = MockTransport::new();
        transport.expect_publish().never();

        let report = dispatcher(&store, transport).dispatch_batch().await.unwrap();

        assert_eq!(report.quarantined, 2);
        for id in [unknown.id, malformed.id] {
            let stored = store.get(id).await.unwrap().unwrap();
            assert_eq!(stored.state(), OutboxState::Quarantined);
            assert!(stored.last_error.is_some());
        }
    }

    #[tokio::test]
    async fn exhausted_rows_are_quarantined() {
        let store = InMemoryStore::new();
        let row = enqueue(&store, DOCUMENT_UPLOADED, uploaded().encode().unwrap()).await;
        let mut transport = MockTransport::new();
        transport
            .expect_publish()
            .times(3)
            .returning(|_| Err(anyhow::anyhow!("broker unavailable")));
        let dispatcher = OutboxDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(transport),
            OutboxDispatcherConfig {
                retry_cooldown: Duration::ZERO,
                ..config()
            },
        );

        let mut quarantined = 0;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(2)).await;
            quarantined += dispatcher.dispatch_batch().await.unwrap().quarantined;
        }

        assert_eq!(quarantined, 1);
        let stored = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(stored.state(), OutboxState::Quarantined);
        assert_eq!(stored.attempt_count, 3);
    }

    #[tokio::test]
    async fn publishes_in_occurrence_order() {
        let store = InMemoryStore::new();
        let first = enqueue(&store, DOCUMENT_UPLOADED, uploaded().encode().unwrap()).await;
        let second = enqueue(&store, DOCUMENT_UPLOADED, uploaded().encode().unwrap()).await;
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let mut transport = MockTransport::new();
        transport.expect_publish().times(2).returning(move |dispatched| {
            seen.lock().unwrap().push(dispatched.outbox_id);
            Ok(())
        });

        dispatcher(&store, transport).dispatch_batch().await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn run_dispatches_until_shutdown() {
        let store = InMemoryStore::new();
        let row = enqueue(&store, DOCUMENT_UPLOADED, uploaded().encode().unwrap()).await;
        let published = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&published);
        let mut transport = MockTransport::new();
        transport.expect_publish().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = dispatcher(&store, transport).spawn(shutdown_rx);

        for _ in 0..100 {
            if store.get(row.id).await.unwrap().unwrap().dispatched_at.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_dispatcher_returns_immediately() {
        let store = InMemoryStore::new();
        enqueue(&store, DOCUMENT_UPLOADED, uploaded().encode().unwrap()).await;
        let mut transport = MockTransport::new();
        transport.expect_publish().never();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = OutboxDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(transport),
            OutboxDispatcherConfig {
                enabled: false,
                ..config()
            },
        );

        tokio::time::timeout(Duration::from_secs(1), dispatcher.run(shutdown_rx))
            .await
            .unwrap();
    }

    #[test]
    fn instance_id_has_random_suffix() {
        let id = default_instance_id();
        let (_, suffix) = id.rsplit_once(':').unwrap();

        assert_eq!(suffix.len(), 8);
        assert_ne!(default_instance_id(), id);
    }
}
