//! Work-order service client.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::{build_client, check_status, join_url};
use crate::collaborators::{WorkOrder, WorkOrderLookup};
use crate::config::CollaboratorConfig;
use crate::error::CollaboratorError;

const SERVICE: &str = "work_orders";

#[derive(Serialize)]
struct ActiveQuery<'a> {
    location_ids: &'a [Uuid],
}

pub struct HttpWorkOrderClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkOrderClient {
    pub fn new(config: &CollaboratorConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(SERVICE, config.request_timeout)?,
            base_url: config.work_order_url.clone(),
        })
    }
}

#[async_trait]
impl WorkOrderLookup for HttpWorkOrderClient {
    /// One batched request for all ids.
    async fn active_work_orders(
        &self,
        location_ids: &[Uuid],
    ) -> Result<Vec<WorkOrder>, CollaboratorError> {
        let resp = self
            .client
            .post(join_url(&self.base_url, "work-orders/active"))
            .json(&ActiveQuery { location_ids })
            .send()
            .await
            .map_err(|e| CollaboratorError::request_failed(SERVICE, e))?;
        let orders: Vec<WorkOrder> = check_status(SERVICE, resp)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;
        tracing::debug!(
            locations = location_ids.len(),
            active = orders.len(),
            "Checked active work orders"
        );
        Ok(orders)
    }
}
