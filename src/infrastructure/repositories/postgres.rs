use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, Pool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    models::{OutboxEvent, OutboxState, Shipment, ShipmentDocument, ShipmentStatus},
    repositories::{OutboxRepository, ShipmentRepository, UnitOfWork, UnitOfWorkFactory},
    value_objects::ContentHandle,
};

pub type PgPool = Pool<Postgres>;

const SHIPMENT_COLUMNS: &str =
    "id, reference_number, sender, recipient, status, created_at, processed_at";

const OUTBOX_COLUMNS: &str = "id, occurred_at, event_type, payload, correlation_id, dispatched_at, \
     attempt_count, last_error, lease_until, lease_owner, quarantined_at";

#[derive(Clone)]
pub struct PostgresShipmentRepository {
    pool: PgPool,
}

impl PostgresShipmentRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl ShipmentRepository for PostgresShipmentRepository {
    async fn insert(&self, shipment: &Shipment) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO shipments (
                id,
                reference_number,
                sender,
                recipient,
                status,
                created_at,
                processed_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7)
            ON CONFLICT (reference_number) DO NOTHING
            "#,
        )
        .bind(shipment.id)
        .bind(&shipment.reference_number)
        .bind(&shipment.sender)
        .bind(&shipment.recipient)
        .bind(shipment.status.as_str())
        .bind(shipment.created_at)
        .bind(shipment.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Shipment>> {
        let record = sqlx::query_as::<_, ShipmentRecord>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(record) = record else {
            return Ok(None);
        };
        let documents = fetch_documents(&self.pool, &[id]).await?;
        Ok(assemble(vec![record], documents)?.pop())
    }

    async fn list(&self, limit: u32, offset: u32) -> anyhow::Result<Vec<Shipment>> {
        let records = sqlx::query_as::<_, ShipmentRecord>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        let ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
        let documents = fetch_documents(&self.pool, &ids).await?;
        assemble(records, documents)
    }

    async fn mark_processed(&self, shipment: &Shipment) -> anyhow::Result<bool> {
        let processed_at = shipment.processed_at.unwrap_or_else(Utc::now);
        let result = sqlx::query(
            r#"
            UPDATE shipments
            SET status = $2,
                processed_at = COALESCE(processed_at, $3)
            WHERE id = $1 AND status <> $2
            "#,
        )
        .bind(shipment.id)
        .bind(ShipmentStatus::Processed.as_str())
        .bind(processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone)]
pub struct PostgresOutboxRepository {
    pool: PgPool,
}

impl PostgresOutboxRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    async fn lease_batch(
        &self,
        owner: &str,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<OutboxEvent>> {
        // Rows locked by another leaser are skipped rather than waited on.
        let records = sqlx::query_as::<_, OutboxRecord>(&format!(
            r#"
            UPDATE outbox_events
            SET lease_owner = $1,
                lease_until = $2
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE dispatched_at IS NULL
                  AND quarantined_at IS NULL
                  AND (lease_until IS NULL OR lease_until < $3)
                ORDER BY occurred_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(lease_until)
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut events: Vec<OutboxEvent> = records.into_iter().map(OutboxEvent::from).collect();
        events.sort_by_key(|event| event.occurred_at);
        Ok(events)
    }

    async fn mark_dispatched(&self, id: Uuid, dispatched_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET dispatched_at = $2,
                last_error = NULL
            WHERE id = $1 AND dispatched_at IS NULL
            "#,
        )
        .bind(id)
        .bind(dispatched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempt_count = attempt_count + 1,
                last_error = $2,
                lease_until = $3
            WHERE id = $1 AND dispatched_at IS NULL
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn quarantine(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempt_count = attempt_count + 1,
                last_error = $2,
                quarantined_at = $3
            WHERE id = $1 AND dispatched_at IS NULL
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_quarantined(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET quarantined_at = NULL,
                attempt_count = 0,
                last_error = NULL,
                lease_until = NULL,
                lease_owner = NULL
            WHERE id = $1
              AND quarantined_at IS NOT NULL
              AND dispatched_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<OutboxEvent>> {
        let record = sqlx::query_as::<_, OutboxRecord>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(OutboxEvent::from))
    }

    async fn list(&self, state: OutboxState, limit: u32) -> anyhow::Result<Vec<OutboxEvent>> {
        let filter = match state {
            OutboxState::Pending => {
                "dispatched_at IS NULL AND quarantined_at IS NULL ORDER BY occurred_at"
            }
            OutboxState::Dispatched => "dispatched_at IS NOT NULL ORDER BY dispatched_at DESC",
            OutboxState::Quarantined => {
                "dispatched_at IS NULL AND quarantined_at IS NOT NULL ORDER BY quarantined_at DESC"
            }
        };
        let records = sqlx::query_as::<_, OutboxRecord>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE {filter} LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(OutboxEvent::from).collect())
    }
}

#[derive(Clone)]
pub struct PostgresUnitOfWorkFactory {
    pool: PgPool,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    async fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// A database transaction; dropping it uncommitted rolls it back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn load_shipment(&mut self, id: Uuid) -> anyhow::Result<Option<Shipment>> {
        let record = sqlx::query_as::<_, ShipmentRecord>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        let Some(record) = record else {
            return Ok(None);
        };
        let documents = fetch_documents(&mut *self.tx, &[id]).await?;
        Ok(assemble(vec![record], documents)?.pop())
    }

    async fn add_document(&mut self, document: &ShipmentDocument) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shipment_documents (
                id,
                shipment_id,
                content_handle,
                file_name,
                content_type,
                size,
                uploaded_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7)
            "#,
        )
        .bind(document.id)
        .bind(document.shipment_id)
        .bind(document.content_handle.as_str())
        .bind(&document.file_name)
        .bind(&document.content_type)
        .bind(document.size as i64)
        .bind(document.uploaded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_status(&mut self, shipment: &Shipment) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE shipments
            SET status = $2,
                processed_at = COALESCE(processed_at, $3)
            WHERE id = $1
            "#,
        )
        .bind(shipment.id)
        .bind(shipment.status.as_str())
        .bind(shipment.processed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_outbox(&mut self, event: &OutboxEvent) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id,
                occurred_at,
                event_type,
                payload,
                correlation_id,
                attempt_count
            ) VALUES ($1,$2,$3,$4,$5,$6)
            "#,
        )
        .bind(event.id)
        .bind(event.occurred_at)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.correlation_id)
        .bind(event.attempt_count as i32)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn fetch_documents<'e, E>(executor: E, shipment_ids: &[Uuid]) -> anyhow::Result<Vec<DocumentRecord>>
where
    E: PgExecutor<'e>,
{
    if shipment_ids.is_empty() {
        return Ok(Vec::new());
    }
    let records = sqlx::query_as::<_, DocumentRecord>(
        r#"
        SELECT id, shipment_id, content_handle, file_name, content_type, size, uploaded_at
        FROM shipment_documents
        WHERE shipment_id = ANY($1)
        ORDER BY uploaded_at, id
        "#,
    )
    .bind(shipment_ids)
    .fetch_all(executor)
    .await?;
    Ok(records)
}

fn assemble(
    records: Vec<ShipmentRecord>,
    documents: Vec<DocumentRecord>,
) -> anyhow::Result<Vec<Shipment>> {
    let mut by_shipment: HashMap<Uuid, Vec<ShipmentDocument>> = HashMap::new();
    for document in documents {
        by_shipment
            .entry(document.shipment_id)
            .or_default()
            .push(ShipmentDocument::from(document));
    }
    records
        .into_iter()
        .map(|record| {
            let documents = by_shipment.remove(&record.id).unwrap_or_default();
            let mut shipment = Shipment::try_from(record)?;
            shipment.documents = documents;
            Ok(shipment)
        })
        .collect()
}

#[derive(FromRow)]
struct ShipmentRecord {
    id: Uuid,
    reference_number: String,
    sender: String,
    recipient: String,
    status: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ShipmentRecord> for Shipment {
    type Error = anyhow::Error;

    fn try_from(value: ShipmentRecord) -> Result<Self, Self::Error> {
        let status = ShipmentStatus::from_str(&value.status)
            .ok_or_else(|| anyhow::anyhow!("unknown shipment status {}", value.status))?;
        Ok(Self {
            id: value.id,
            reference_number: value.reference_number,
            sender: value.sender,
            recipient: value.recipient,
            status,
            created_at: value.created_at,
            processed_at: value.processed_at,
            documents: Vec::new(),
        })
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    shipment_id: Uuid,
    content_handle: String,
    file_name: String,
    content_type: String,
    size: i64,
    uploaded_at: DateTime<Utc>,
}

impl From<DocumentRecord> for ShipmentDocument {
    fn from(value: DocumentRecord) -> Self {
        Self {
            id: value.id,
            shipment_id: value.shipment_id,
            content_handle: ContentHandle::new(value.content_handle),
            file_name: value.file_name,
            content_type: value.content_type,
            size: value.size as u64,
            uploaded_at: value.uploaded_at,
        }
    }
}

#[derive(FromRow)]
struct OutboxRecord {
    id: Uuid,
    occurred_at: DateTime<Utc>,
    event_type: String,
    payload: String,
    correlation_id: String,
    dispatched_at: Option<DateTime<Utc>>,
    attempt_count: i32,
    last_error: Option<String>,
    lease_until: Option<DateTime<Utc>>,
    lease_owner: Option<String>,
    quarantined_at: Option<DateTime<Utc>>,
}

impl From<OutboxRecord> for OutboxEvent {
    fn from(value: OutboxRecord) -> Self {
        Self {
            id: value.id,
            occurred_at: value.occurred_at,
            event_type: value.event_type,
            payload: value.payload,
            correlation_id: value.correlation_id,
            dispatched_at: value.dispatched_at,
            attempt_count: value.attempt_count as u32,
            last_error: value.last_error,
            lease_until: value.lease_until,
            lease_owner: value.lease_owner,
            quarantined_at: value.quarantined_at,
        }
    }
}
