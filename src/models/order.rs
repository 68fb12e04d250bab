use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Time-in-force. `Day` is accepted on the wire but treated identically to
/// `Gtc` — no session-boundary expiry collaborator exists in this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Day,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Gtc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    /// A market order that found no (or insufficient) liquidity at
    /// submission. Not terminal: the continuous driver resumes it on a
    /// later matching cycle.
    Pending,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::PartiallyFilled => write!(f, "partially_filled"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Rejected => write!(f, "rejected"),
            OrderStatus::Pending => write!(f, "pending"),
        }
    }
}

/// A resting or historical order. `internal` marks a dark-pool order; it is
/// always a bare bool, never a routing string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub account_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub time_in_force: TimeInForce,
    pub internal: bool,
    pub status: OrderStatus,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the order reaches a terminal status (filled, cancelled, or
    /// rejected). `pending` and resting statuses leave this `None`.
    pub closed_at: Option<DateTime<Utc>>,
    /// The risk gate's rejection message, set only when `status == rejected`.
    pub reject_reason: Option<String>,
    /// Volume-weighted average fill price across all of this order's trades
    /// so far. Populated incrementally as fills accumulate.
    pub execution_price: Option<Decimal>,
}

impl Order {
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn is_resting(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    pub account_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Debug, Deserialize)]
pub struct EditOrderRequest {
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub time_in_force: TimeInForce,
    pub internal: bool,
    pub status: OrderStatus,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub execution_price: Option<Decimal>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let remaining_quantity = order.remaining_quantity();
        Self {
            id: order.id,
            account_id: order.account_id,
            symbol: order.symbol,
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            quantity: order.quantity,
            filled_quantity: order.filled_quantity,
            remaining_quantity,
            time_in_force: order.time_in_force,
            internal: order.internal,
            status: order.status,
            edited: order.edited,
            created_at: order.created_at,
            closed_at: order.closed_at,
            reject_reason: order.reject_reason,
            execution_price: order.execution_price,
        }
    }
}
