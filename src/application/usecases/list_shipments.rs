use std::sync::Arc;

use crate::domain::{errors::DomainError, models::Shipment, repositories::ShipmentRepository};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

pub struct ListShipmentsRequest {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub struct ListShipmentsResponse {
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<Shipment>,
}

pub struct ListShipmentsUseCase {
    repo: Arc<dyn ShipmentRepository>,
}

impl ListShipmentsUseCase {
    pub fn new(repo: Arc<dyn ShipmentRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        request: ListShipmentsRequest,
    ) -> Result<ListShipmentsResponse, DomainError> {
        let page = request.page.unwrap_or(1).max(1);
        let page_size = request
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(page_size);

        let items = self.repo.list(page_size, offset).await?;
        Ok(ListShipmentsResponse {
            page,
            page_size,
            items,
        })
    }
}
