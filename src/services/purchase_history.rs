use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{self, purchase_history};
use crate::errors::ServiceError;

/// Read/write access to the durable purchase-history table.
#[derive(Clone)]
pub struct PurchaseHistoryService {
    db: Arc<DatabaseConnection>,
}

impl PurchaseHistoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Whether any line items were already recorded for `(user, order)`.
    pub async fn exists_for_order(
        &self,
        user_id: Uuid,
        order_id: &str,
    ) -> Result<bool, ServiceError> {
        let existing = entities::PurchaseHistory::find()
            .filter(purchase_history::Column::UserId.eq(user_id))
            .filter(purchase_history::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?;
        Ok(existing.is_some())
    }

    /// Inserts all line-item records for one order in a single batch.
    #[instrument(skip(self, records))]
    pub async fn insert_batch(
        &self,
        records: Vec<purchase_history::ActiveModel>,
    ) -> Result<usize, ServiceError> {
        if records.is_empty() {
            return Ok(0);
        }
        let count = records.len();
        entities::PurchaseHistory::insert_many(records)
            .exec(&*self.db)
            .await?;
        Ok(count)
    }

    /// Pages through a user's purchase history, newest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<purchase_history::Model>, u64), ServiceError> {
        let paginator = entities::PurchaseHistory::find()
            .filter(purchase_history::Column::UserId.eq(user_id))
            .order_by_desc(purchase_history::Column::PurchasedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let records = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((records, total))
    }
}
