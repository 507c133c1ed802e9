use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Staging row created at checkout-session time and consumed exactly once
/// by whichever reconciliation path confirms the payment first. `items`
/// holds the serialized cart snapshot; a nil `user_id` marks an anonymous
/// checkout that only the client-side path may complete.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_purchases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub reference_id: String,
    pub user_id: Uuid,
    pub items: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
