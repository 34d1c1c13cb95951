use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_nats::{
    HeaderMap,
    jetstream::{
        self, AckKind,
        consumer::{AckPolicy, PullConsumer, pull},
    },
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_stream::StreamExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    application::{
        handlers::document_processor::DocumentProcessingHandler, services::transport::Transport,
    },
    domain::events::{DispatchedEvent, DomainEvent, EventEnvelope},
};

pub const MSG_ID_HEADER: &str = "Nats-Msg-Id";
pub const CORRELATION_ID_HEADER: &str = "Correlation-Id";
pub const DEAD_LETTER_REASON_HEADER: &str = "Dead-Letter-Reason";
pub const DEAD_LETTER_DESCRIPTION_HEADER: &str = "Dead-Letter-Description";
pub const ORIGINAL_MSG_ID_HEADER: &str = "Original-Msg-Id";

const PULL_EXPIRES: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct JetstreamConfig {
    pub url: String,
    pub stream: String,
    pub subject: String,
    pub durable: String,
    pub pull_batch: usize,
    pub ack_wait_seconds: u64,
    pub max_deliver: i64,
}

impl JetstreamConfig {
    pub fn dead_letter_subject(&self) -> String {
        format!("{}.dead", self.subject)
    }
}

/// Publishes dispatched events to a JetStream subject and waits for the
/// broker acknowledgement.
pub struct JetstreamTransport {
    context: jetstream::Context,
    subject: String,
}

impl JetstreamTransport {
    pub async fn new(config: &JetstreamConfig) -> anyhow::Result<(Arc<Self>, JetstreamWorker)> {
        let client = async_nats::connect(&config.url)
            .await
            .with_context(|| format!("failed to connect to NATS at {}", config.url))?;
        let context = jetstream::new(client);
        let dead_letter_subject = config.dead_letter_subject();

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream.clone(),
                subjects: vec![config.subject.clone(), dead_letter_subject.clone()],
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(
                &config.durable,
                pull::Config {
                    durable_name: Some(config.durable.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: Duration::from_secs(config.ack_wait_seconds),
                    max_deliver: config.max_deliver,
                    ..Default::default()
                },
            )
            .await?;

        info!(
            stream = %config.stream,
            subject = %config.subject,
            durable = %config.durable,
            "jetstream transport ready"
        );

        let transport = Arc::new(Self {
            context: context.clone(),
            subject: config.subject.clone(),
        });

        let worker = JetstreamWorker {
            consumer,
            context,
            dead_letter_subject,
            pull_batch: config.pull_batch,
            max_deliver: config.max_deliver,
        };

        Ok((transport, worker))
    }
}

#[async_trait::async_trait]
impl Transport for JetstreamTransport {
    async fn publish(&self, event: &DispatchedEvent) -> anyhow::Result<()> {
        let envelope = EventEnvelope::from_dispatched(event)?;
        let payload = serde_json::to_vec(&envelope)?;

        let mut headers = HeaderMap::new();
        // The broker drops re-publishes of the same outbox row inside its
        // duplicate window.
        headers.insert(MSG_ID_HEADER, event.outbox_id.to_string().as_str());
        headers.insert(CORRELATION_ID_HEADER, event.correlation_id.as_str());

        let ack = self
            .context
            .publish_with_headers(self.subject.clone(), headers, payload.into())
            .await?
            .await?;
        debug!(
            stream = %ack.stream,
            sequence = ack.sequence,
            duplicate = ack.duplicate,
            "broker acknowledged event"
        );
        Ok(())
    }
}

pub struct JetstreamWorker {
    consumer: PullConsumer,
    context: jetstream::Context,
    dead_letter_subject: String,
    pull_batch: usize,
    max_deliver: i64,
}

impl JetstreamWorker {
    pub fn spawn(
        self,
        handler: Arc<DocumentProcessingHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(handler, shutdown).await;
        })
    }

    async fn run(self, handler: Arc<DocumentProcessingHandler>, mut shutdown: watch::Receiver<bool>) {
        info!("jetstream worker started");
        'outer: loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = self
                .consumer
                .batch()
                .max_messages(self.pull_batch)
                .expires(PULL_EXPIRES)
                .messages()
                .await;
            let mut batch = match batch {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(error = %err, "failed to pull jetstream batch");
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => continue,
                        _ = shutdown.changed() => break,
                    }
                }
            };

            loop {
                let next = tokio::select! {
                    next = batch.next() => next,
                    _ = shutdown.changed() => break 'outer,
                };
                match next {
                    Some(Ok(message)) => {
                        if let Err(err) = self.process_message(message, &handler).await {
                            error!(error = %format!("{err:#}"), "failed to process message");
                        }
                    }
                    Some(Err(err)) => warn!(error = %err, "jetstream batch error"),
                    None => break,
                }
            }
        }
        info!("jetstream worker stopped");
    }

    async fn process_message(
        &self,
        message: jetstream::Message,
        handler: &DocumentProcessingHandler,
    ) -> anyhow::Result<()> {
        let delivered = message.info().map(|info| info.delivered).unwrap_or(1);
        let message_id = header_value(&message, MSG_ID_HEADER).unwrap_or_default();

        let envelope: EventEnvelope = match serde_json::from_slice(&message.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                return self
                    .dead_letter(&message, "invalid_message", &err.to_string())
                    .await;
            }
        };
        let correlation_id = envelope.correlation_id.clone();
        let span = info_span!(
            "jetstream_delivery",
            message_id = %message_id,
            delivered,
            correlation_id = %correlation_id,
        );

        async {
            let dispatched = match envelope.into_dispatched() {
                Ok(dispatched) => dispatched,
                Err(err) => {
                    return self
                        .dead_letter(&message, "invalid_message", &err.to_string())
                        .await;
                }
            };
            let DomainEvent::DocumentUploaded(event) = &dispatched.event;

            match handler.handle(event).await {
                Ok(outcome) => {
                    message
                        .ack()
                        .await
                        .map_err(|e| anyhow::anyhow!("failed to ack message: {}", e))?;
                    info!(?outcome, "message acknowledged");
                    Ok(())
                }
                Err(err) if err.is_permanent() => {
                    self.dead_letter(&message, err.reason_code(), &err.to_string())
                        .await
                }
                Err(err) if self.max_deliver > 0 && delivered >= self.max_deliver => {
                    self.dead_letter(&message, "max_deliveries_exceeded", &err.to_string())
                        .await
                }
                Err(err) => {
                    // No ack: the broker redelivers after the ack wait.
                    warn!(
                        reason = err.reason_code(),
                        error = %err,
                        "transient failure, leaving message for redelivery"
                    );
                    Ok(())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dead_letter(
        &self,
        message: &jetstream::Message,
        reason: &str,
        description: &str,
    ) -> anyhow::Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(DEAD_LETTER_REASON_HEADER, reason);
        headers.insert(DEAD_LETTER_DESCRIPTION_HEADER, description);
        if let Some(id) = header_value(message, MSG_ID_HEADER) {
            headers.insert(ORIGINAL_MSG_ID_HEADER, id.as_str());
        }
        if let Some(correlation_id) = header_value(message, CORRELATION_ID_HEADER) {
            headers.insert(CORRELATION_ID_HEADER, correlation_id.as_str());
        }

        self.context
            .publish_with_headers(
                self.dead_letter_subject.clone(),
                headers,
                message.payload.clone(),
            )
            .await?
            .await?;
        message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| anyhow::anyhow!("failed to terminate message: {}", e))?;

        warn!(reason, description, subject = %self.dead_letter_subject, "message dead-lettered");
        Ok(())
    }
}

fn header_value(message: &jetstream::Message, name: &str) -> Option<String> {
    message
        .headers
        .as_ref()
        .and_then(|headers| headers.get(name))
        .map(|value| value.as_str().to_string())
}
