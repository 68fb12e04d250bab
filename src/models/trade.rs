use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::Side;

/// A single matched execution between two resting/incoming orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub maker_order_id: Uuid,
    pub taker_order_id: Uuid,
    pub maker_account_id: Uuid,
    pub taker_account_id: Uuid,
    pub price: Decimal,
    pub quantity: Decimal,
    pub taker_side: Side,
    pub internal: bool,
    pub executed_at: DateTime<Utc>,
}
