//! Control-plane operations over the query executor

use std::sync::Arc;

use async_trait::async_trait;
use occupancy_graphql_client::QueryExecutor;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::documents;
use crate::error::{OccupancyError, OccupancyResult};
use crate::extender::AreaExtender;
use crate::models::{
    GroupOccupancyRecord, OccupancyFilter, SubscriptionArea, SubscriptionAreaCreate,
    SubscriptionAreaUpdate,
};

/// Create, update and query subscription areas
#[derive(Clone)]
pub struct ControlPlane {
    executor: Arc<dyn QueryExecutor>,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane").finish_non_exhaustive()
    }
}

impl ControlPlane {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Validate and create a subscription area
    #[instrument(skip(self, request), fields(granularity = %request.granularity))]
    pub async fn create_subscription_area(
        &self,
        request: &SubscriptionAreaCreate,
    ) -> OccupancyResult<SubscriptionArea> {
        request.validate()?;
        let (fields, variables) = request.mutation_params()?;
        let document = documents::create_subscription_area(&fields);

        debug!("Creating subscription area");
        let data = self.executor.execute(&document, variables).await?;
        let area: SubscriptionArea = extract(data, "createSubscriptionArea")?;
        debug!(area_id = area.id, "Subscription area created");
        Ok(area)
    }

    /// Send only the supplied fields of `update`
    #[instrument(skip(self, update), fields(area_id = update.id))]
    pub async fn update_subscription_area(
        &self,
        update: &SubscriptionAreaUpdate,
    ) -> OccupancyResult<SubscriptionArea> {
        update.validate()?;
        let (fields, variables) = update.mutation_params()?;
        let document = documents::update_subscription_area(&fields);

        debug!(field_count = fields.len(), "Updating subscription area");
        let data = self.executor.execute(&document, variables).await?;
        extract(data, "updateSubscriptionArea")
    }

    /// Refresh an area's expiry by updating no fields
    #[instrument(skip(self))]
    pub async fn extend_subscription_area(&self, area_id: i64) -> OccupancyResult<SubscriptionArea> {
        let area = self
            .update_subscription_area(&SubscriptionAreaUpdate::new(area_id))
            .await?;
        debug!(
            area_id,
            expires_on = ?area.expires_on,
            "Extended expiry"
        );
        Ok(area)
    }

    /// Raw `findGroupOccupancies` rows
    #[instrument(skip(self))]
    pub async fn find_group_occupancies(
        &self,
        filter: &OccupancyFilter,
    ) -> OccupancyResult<Vec<GroupOccupancyRecord>> {
        filter.validate()?;
        let variables = serde_json::to_value(filter)?;
        let data = self
            .executor
            .execute(documents::FIND_GROUP_OCCUPANCIES, variables)
            .await?;
        extract(data, "findGroupOccupancies")
    }
}

#[async_trait]
impl AreaExtender for ControlPlane {
    async fn extend_area(&self, area_id: i64) -> OccupancyResult<()> {
        self.extend_subscription_area(area_id).await.map(|_| ())
    }
}

/// Deserialize `data[field]`, rejecting a missing or null field
fn extract<T: DeserializeOwned>(mut data: Value, field: &str) -> OccupancyResult<T> {
    match data.get_mut(field).map(Value::take) {
        Some(Value::Null) | None => Err(OccupancyError::InvalidResponse(format!(
            "response has no {}",
            field
        ))),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}
