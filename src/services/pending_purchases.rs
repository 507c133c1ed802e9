use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{self, pending_purchase};
use crate::errors::ServiceError;
use crate::models::CartItem;

/// Store for the staging rows that bridge checkout-session creation and
/// payment confirmation. Each row is created exactly once per checkout
/// attempt and consumed at most once via [`PendingPurchaseService::claim`].
#[derive(Clone)]
pub struct PendingPurchaseService {
    db: Arc<DatabaseConnection>,
}

impl PendingPurchaseService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, items))]
    pub async fn create(
        &self,
        reference_id: &str,
        user_id: Uuid,
        items: &[CartItem],
    ) -> Result<(), ServiceError> {
        let snapshot = serde_json::to_value(items)
            .map_err(|err| ServiceError::SerializationError(err.to_string()))?;

        let model = pending_purchase::ActiveModel {
            reference_id: Set(reference_id.to_string()),
            user_id: Set(user_id),
            items: Set(snapshot),
            created_at: Set(Utc::now()),
        };
        model.insert(&*self.db).await?;
        Ok(())
    }

    pub async fn find(
        &self,
        reference_id: &str,
    ) -> Result<Option<pending_purchase::Model>, ServiceError> {
        Ok(entities::PendingPurchase::find_by_id(reference_id.to_string())
            .one(&*self.db)
            .await?)
    }

    /// Atomically consumes the staging row. The single-row delete doubles as
    /// the reconciliation lock: exactly one caller observes `true` per
    /// reference, and that caller owns writing the history records. A `false`
    /// result means the row never existed, already expired, or was claimed
    /// by the concurrent path.
    #[instrument(skip(self))]
    pub async fn claim(&self, reference_id: &str) -> Result<bool, ServiceError> {
        let result = entities::PendingPurchase::delete_by_id(reference_id.to_string())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}
