//! Event Bus (C6): named pub/sub channels carrying JSON records, fanned out
//! in-process via broadcast and mirrored best-effort to Redis PUBLISH so any
//! number of external listeners can attach without slowing down matching.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Order, Trade};
use crate::store::keys::StoreKey;

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub channel: String,
    pub kind: &'static str,
    pub at: DateTime<Utc>,
    pub payload: Value,
}

impl EventRecord {
    /// A single order's state changed; delivered to its owner only.
    pub fn order_updated(order: &Order) -> Self {
        Self {
            channel: StoreKey::channel_account_updates(&order.account_id.to_string()),
            kind: "order_updated",
            at: Utc::now(),
            payload: serde_json::to_value(order).unwrap_or(Value::Null),
        }
    }

    /// A batch of an account's orders changed together (e.g. a cleanup
    /// sweep), without one single order record to attach to.
    pub fn orders_updated(account_id: Uuid, reason: &str) -> Self {
        Self {
            channel: StoreKey::channel_account_updates(&account_id.to_string()),
            kind: "orders_updated",
            at: Utc::now(),
            payload: serde_json::json!({ "account_id": account_id, "reason": reason }),
        }
    }

    /// Risk gate rejection: a toast aimed at the rejected order's owner.
    pub fn order_rejected(order: &Order, reason: &str) -> Self {
        Self {
            channel: StoreKey::channel_account_notifications(&order.account_id.to_string()),
            kind: "toast",
            at: Utc::now(),
            payload: serde_json::json!({ "order": order, "reason": reason, "severity": "error" }),
        }
    }

    /// A system-wide toast, e.g. an admin action affecting all participants.
    pub fn system_notice(message: &str) -> Self {
        Self {
            channel: StoreKey::channel_notifications(),
            kind: "toast",
            at: Utc::now(),
            payload: serde_json::json!({ "message": message, "severity": "info" }),
        }
    }

    pub fn trade_executed(trade: &Trade) -> Self {
        Self {
            channel: StoreKey::channel_trades(&trade.symbol),
            kind: "trade_executed",
            at: Utc::now(),
            payload: serde_json::to_value(trade).unwrap_or(Value::Null),
        }
    }

    /// The book for `symbol` changed shape (insert, cancel, or cross); tells
    /// any depth-watching client to refetch.
    pub fn orderbook_refresh(symbol: &str) -> Self {
        Self {
            channel: StoreKey::channel_orderbook_updates(),
            kind: "refresh",
            at: Utc::now(),
            payload: serde_json::json!({ "symbol": symbol }),
        }
    }
}

/// In-process broadcast plus a best-effort Redis mirror. A PUBLISH failure
/// never fails the caller — the event bus is fire-and-forget by design, and
/// the in-process subscribers (the metrics recorder, any local listeners)
/// still receive every record regardless of Redis's health.
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
    redis: Option<ConnectionManager>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender, redis: None }
    }

    pub fn with_redis(redis: ConnectionManager) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            redis: Some(redis),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub async fn publish(&self, record: EventRecord) {
        let channel = record.channel.clone();
        crate::metrics::record_event_published(&channel);
        let _ = self.sender.send(record.clone());

        if let Some(mut conn) = self.redis.clone() {
            let Ok(body) = serde_json::to_string(&record) else {
                return;
            };
            if let Err(err) = redis::cmd("PUBLISH")
                .arg(&channel)
                .arg(body)
                .query_async::<_, i64>(&mut conn)
                .await
            {
                tracing::warn!(%channel, error = %err, "event bus redis publish failed");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, OrderType, Side, TimeInForce};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscribers_receive_published_records() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let order = Order {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Some(dec!(100)),
            quantity: dec!(10),
            filled_quantity: Decimal::ZERO,
            time_in_force: TimeInForce::Gtc,
            internal: false,
            status: OrderStatus::Open,
            edited: false,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            closed_at: None,
            reject_reason: None,
            execution_price: None,
        };
        bus.publish(EventRecord::order_updated(&order)).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.channel, format!("account:{}:updates", order.account_id));
        assert_eq!(received.kind, "order_updated");
    }

    #[tokio::test]
    async fn orderbook_refresh_uses_the_shared_channel() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EventRecord::orderbook_refresh("AAPL")).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.channel, "orderbook_updates");
        assert_eq!(received.kind, "refresh");
    }
}
