use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Authoritative purchase record, one row per cart line item per completed
/// order. `(user_id, order_id)` identifies the order; column names are the
/// contract the order-history and admin surfaces read.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub product_handle: String,
    pub product_title: String,
    pub product_image: Option<String>,
    pub product_price: Decimal,
    pub quantity: i32,
    pub purchased_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
