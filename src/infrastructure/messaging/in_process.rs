use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    application::{
        handlers::document_processor::{DocumentProcessingHandler, ProcessingOutcome},
        services::transport::Transport,
    },
    domain::events::{DispatchedEvent, DomainEvent},
};

#[derive(Debug, Clone)]
pub struct InProcessConsumerConfig {
    /// Total handler invocations per event, first attempt included.
    pub max_deliveries: u32,
    pub redelivery_delay: Duration,
}

impl Default for InProcessConsumerConfig {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            redelivery_delay: Duration::from_secs(1),
        }
    }
}

/// Hands dispatched events to a single consumer task in the same process.
///
/// Events still queued when the process stops are lost; their outbox rows
/// are already marked dispatched.
pub struct InProcessTransport {
    sender: mpsc::UnboundedSender<DispatchedEvent>,
}

impl InProcessTransport {
    pub fn new(config: InProcessConsumerConfig) -> (Arc<Self>, InProcessConsumer) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self { sender }),
            InProcessConsumer { receiver, config },
        )
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn publish(&self, event: &DispatchedEvent) -> anyhow::Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("in-process consumer is not running"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Completed(ProcessingOutcome),
    DeadLettered,
    Abandoned,
}

pub struct InProcessConsumer {
    receiver: mpsc::UnboundedReceiver<DispatchedEvent>,
    config: InProcessConsumerConfig,
}

impl InProcessConsumer {
    pub fn spawn(
        self,
        handler: Arc<DocumentProcessingHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(handler, shutdown))
    }

    /// Reads events one at a time until shutdown or until every transport
    /// handle is dropped.
    pub async fn run(
        mut self,
        handler: Arc<DocumentProcessingHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("in-process consumer started");
        loop {
            let event = tokio::select! {
                received = self.receiver.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };
            self.deliver(&handler, event, &mut shutdown).await;
        }
        info!("in-process consumer stopped");
    }

    pub async fn deliver(
        &self,
        handler: &DocumentProcessingHandler,
        event: DispatchedEvent,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DeliveryResult {
        let span = info_span!(
            "in_process_delivery",
            outbox_id = %event.outbox_id,
            correlation_id = %event.correlation_id,
        );
        async {
            let DomainEvent::DocumentUploaded(payload) = &event.event;
            let mut delivery = 1;
            loop {
                let err = match handler.handle(payload).await {
                    Ok(outcome) => {
                        info!(?outcome, delivery, "event handled");
                        return DeliveryResult::Completed(outcome);
                    }
                    Err(err) => err,
                };
                if err.is_permanent() {
                    error!(reason = err.reason_code(), error = %err, "event dead-lettered");
                    return DeliveryResult::DeadLettered;
                }
                if delivery >= self.config.max_deliveries {
                    error!(
                        reason = err.reason_code(),
                        error = %err,
                        delivery,
                        "delivery attempts exhausted, event dead-lettered"
                    );
                    return DeliveryResult::DeadLettered;
                }
                warn!(reason = err.reason_code(), error = %err, delivery, "transient failure, redelivering");
                tokio::select! {
                    _ = tokio::time::sleep(self.config.redelivery_delay) => {}
                    _ = shutdown.changed() => {
                        warn!("shutdown during redelivery, event abandoned");
                        return DeliveryResult::Abandoned;
                    }
                }
                delivery += 1;
            }
        }
        .instrument(span)
        .await
    }
}
