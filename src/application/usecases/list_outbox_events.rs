use std::sync::Arc;

use crate::domain::{
    errors::DomainError,
    models::{OutboxEvent, OutboxState},
    repositories::OutboxRepository,
};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;

pub struct ListOutboxEventsUseCase {
    repo: Arc<dyn OutboxRepository>,
}

impl ListOutboxEventsUseCase {
    pub fn new(repo: Arc<dyn OutboxRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        state: OutboxState,
        limit: Option<u32>,
    ) -> Result<Vec<OutboxEvent>, DomainError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Ok(self.repo.list(state, limit).await?)
    }
}
