use std::sync::Arc;

use poem::{Result as PoemResult, web::Data};
use poem_openapi::{
    OpenApi,
    param::{Path, Query},
    payload::Json,
};
use uuid::Uuid;

use crate::{
    application::usecases::{
        create_shipment::CreateShipmentRequest, list_shipments::ListShipmentsRequest,
        upload_document::UploadDocumentRequest,
    },
    domain::errors::DomainError,
    presentation::http::{
        correlation::CorrelationId,
        endpoints::root::{ApiState, EndpointsTags},
        errors::problem,
        mappers::map_shipment,
        requests::{CreateShipmentRequestDto, UploadDocumentForm},
        responses::{
            CreateShipmentResponse, ShipmentCreatedDto, ShipmentDto, ShipmentPageDto,
            UploadDocumentResponseDto,
        },
    },
};

#[derive(Clone)]
pub struct ShipmentsEndpoints {
    state: Arc<ApiState>,
}

impl ShipmentsEndpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}

#[OpenApi]
impl ShipmentsEndpoints {
    #[oai(path = "/shipments", method = "post", tag = EndpointsTags::Shipments)]
    pub async fn create_shipment(
        &self,
        request: Json<CreateShipmentRequestDto>,
    ) -> PoemResult<CreateShipmentResponse> {
        let request = request.0;
        let shipment = self
            .state
            .create_shipment_usecase
            .execute(CreateShipmentRequest {
                reference_number: request.reference_number,
                sender: request.sender,
                recipient: request.recipient,
            })
            .await
            .map_err(problem)?;

        Ok(CreateShipmentResponse::Created(
            Json(ShipmentCreatedDto { id: shipment.id }),
            format!("/api/shipments/{}", shipment.id),
        ))
    }

    #[oai(path = "/shipments", method = "get", tag = EndpointsTags::Shipments)]
    pub async fn list_shipments(
        &self,
        page: Query<Option<u32>>,
        page_size: Query<Option<u32>>,
    ) -> PoemResult<Json<ShipmentPageDto>> {
        let result = self
            .state
            .list_shipments_usecase
            .execute(ListShipmentsRequest {
                page: page.0,
                page_size: page_size.0,
            })
            .await
            .map_err(problem)?;

        Ok(Json(ShipmentPageDto {
            page: result.page,
            page_size: result.page_size,
            items: result.items.iter().map(map_shipment).collect(),
        }))
    }

    #[oai(path = "/shipments/:shipment_id", method = "get", tag = EndpointsTags::Shipments)]
    pub async fn get_shipment(&self, shipment_id: Path<Uuid>) -> PoemResult<Json<ShipmentDto>> {
        let shipment = self
            .state
            .get_shipment_usecase
            .execute(shipment_id.0)
            .await
            .map_err(problem)?;

        Ok(Json(map_shipment(&shipment)))
    }

    #[oai(
        path = "/shipments/:shipment_id/documents",
        method = "post",
        tag = EndpointsTags::Shipments,
    )]
    pub async fn upload_document(
        &self,
        correlation_id: Data<&CorrelationId>,
        shipment_id: Path<Uuid>,
        form: UploadDocumentForm,
    ) -> PoemResult<Json<UploadDocumentResponseDto>> {
        let file_name = form.file.file_name().unwrap_or_default().to_string();
        let content_type = form.file.content_type().map(str::to_string);
        let content = form.file.into_vec().await.map_err(|err| {
            problem(DomainError::Validation(format!("failed to read upload: {err}")))
        })?;

        let response = self
            .state
            .upload_document_usecase
            .execute(UploadDocumentRequest {
                shipment_id: shipment_id.0,
                file_name,
                content_type,
                content,
                correlation_id: correlation_id.0.as_str().to_string(),
            })
            .await
            .map_err(problem)?;

        Ok(Json(UploadDocumentResponseDto {
            document_id: response.document_id,
            content_handle: response.content_handle.to_string(),
        }))
    }
}
