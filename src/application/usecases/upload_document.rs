use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::{
    application::services::{
        content_store::{ContentMetadata, ContentStore},
        outbox_writer::OutboxWriter,
    },
    domain::{
        errors::DomainError,
        events::{DocumentUploadedEvent, DomainEvent},
        models::ShipmentDocument,
        repositories::{ShipmentRepository, UnitOfWorkFactory},
        value_objects::{ContentHandle, sanitize_file_name},
    },
};

const FILE_NAME_MAX_LEN: usize = 256;
const CONTENT_TYPE_MAX_LEN: usize = 128;

pub struct UploadDocumentRequest {
    pub shipment_id: Uuid,
    pub file_name: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct UploadDocumentResponse {
    pub document_id: Uuid,
    pub content_handle: ContentHandle,
}

/// Stores a document's bytes, then records the document, the status change
/// and a `DocumentUploaded` outbox row in one unit of work.
pub struct UploadDocumentUseCase {
    shipments: Arc<dyn ShipmentRepository>,
    units: Arc<dyn UnitOfWorkFactory>,
    content: Arc<dyn ContentStore>,
    writer: Arc<OutboxWriter>,
}

impl UploadDocumentUseCase {
    pub fn new(
        shipments: Arc<dyn ShipmentRepository>,
        units: Arc<dyn UnitOfWorkFactory>,
        content: Arc<dyn ContentStore>,
        writer: Arc<OutboxWriter>,
    ) -> Self {
        Self {
            shipments,
            units,
            content,
            writer,
        }
    }

    pub async fn execute(
        &self,
        request: UploadDocumentRequest,
    ) -> Result<UploadDocumentResponse, DomainError> {
        let file_name = sanitize_file_name(&request.file_name);
        if file_name.is_empty() {
            return Err(DomainError::Validation("file name is required".into()));
        }
        if file_name.chars().count() > FILE_NAME_MAX_LEN {
            return Err(DomainError::Validation(format!(
                "file name must be at most {FILE_NAME_MAX_LEN} characters"
            )));
        }
        if request.content.is_empty() {
            return Err(DomainError::Validation("file is empty".into()));
        }
        let content_type = request
            .content_type
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if content_type
            .as_ref()
            .is_some_and(|value| value.len() > CONTENT_TYPE_MAX_LEN)
        {
            return Err(DomainError::Validation(format!(
                "content type must be at most {CONTENT_TYPE_MAX_LEN} characters"
            )));
        }

        if self.shipments.get(request.shipment_id).await?.is_none() {
            return Err(DomainError::NotFound(format!(
                "shipment {}",
                request.shipment_id
            )));
        }

        let size = request.content.len() as u64;
        let metadata = ContentMetadata {
            shipment_id: request.shipment_id,
            file_name: file_name.clone(),
            content_type: content_type.clone(),
        };
        let content_handle = self
            .content
            .put(request.content, &metadata)
            .await
            .map_err(|err| {
                error!(
                    shipment_id = %request.shipment_id,
                    error = %format!("{err:#}"),
                    "content upload failed"
                );
                DomainError::ContentStore(format!("{err:#}"))
            })?;

        let document = ShipmentDocument::new(
            request.shipment_id,
            content_handle.clone(),
            file_name,
            content_type,
            size,
        );
        match self.record(&document, &request.correlation_id).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(DomainError::NotFound(format!(
                    "shipment {}",
                    request.shipment_id
                )));
            }
            Err(err) => {
                error!(
                    shipment_id = %request.shipment_id,
                    content_handle = %content_handle,
                    error = %format!("{err:#}"),
                    "document stored but processing was not scheduled"
                );
                return Err(DomainError::ProcessingNotScheduled {
                    content_handle,
                    document_id: document.id,
                    reason: format!("{err:#}"),
                });
            }
        }

        info!(
            shipment_id = %request.shipment_id,
            document_id = %document.id,
            content_handle = %content_handle,
            correlation_id = %request.correlation_id,
            "document uploaded"
        );
        Ok(UploadDocumentResponse {
            document_id: document.id,
            content_handle,
        })
    }

    /// Returns `Ok(false)` when the shipment disappeared after the upload.
    async fn record(&self, document: &ShipmentDocument, correlation_id: &str) -> anyhow::Result<bool> {
        let mut uow = self.units.begin().await?;
        let Some(mut shipment) = uow.load_shipment(document.shipment_id).await? else {
            return Ok(false);
        };

        shipment.attach_document(document.clone());
        uow.add_document(document).await?;
        uow.save_status(&shipment).await?;

        let event = DomainEvent::DocumentUploaded(DocumentUploadedEvent {
            shipment_id: shipment.id,
            document_id: document.id,
            content_handle: document.content_handle.clone(),
            correlation_id: correlation_id.to_string(),
        });
        self.writer
            .enqueue_event(uow.as_mut(), &event, correlation_id)
            .await?;

        uow.commit().await?;
        Ok(true)
    }
}
