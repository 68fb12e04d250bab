//! Redis-backed `Store` implementation. Connection pooling and retry follow
//! the same pattern as a typical production client wrapper: a single
//! `ConnectionManager` behind a retry-with-backoff helper, reconnecting on
//! failure rather than failing the whole process.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::keys::StoreKey;
use super::{SettlementWrite, Store};
use crate::error::StoreError;
use crate::metrics::Timer;
use crate::models::{Account, Order, Position, Trade, Transaction};

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Lua script performing the atomic multi-key settlement write: both
/// accounts' cash, both positions, the trade record, and both transaction
/// entries become visible together. Values are pre-serialized JSON computed
/// by the caller under the per-symbol matching mutex; the script's job is to
/// make the write atomic, not to recompute it.
const SETTLE_SCRIPT: &str = r#"
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SET', KEYS[3], ARGV[3])
redis.call('SET', KEYS[4], ARGV[4])
redis.call('RPUSH', KEYS[5], ARGV[5])
redis.call('RPUSH', KEYS[6], ARGV[6])
redis.call('RPUSH', KEYS[7], ARGV[7])
return 1
"#;

/// Lua script performing the atomic cash adjustment write: the updated
/// account and its transaction entry become visible together. The final
/// account JSON is computed by the caller (`rust_decimal` round-trips through
/// JSON as a string, so arithmetic belongs in Rust, not in the script).
const ADJUST_CASH_SCRIPT: &str = r#"
redis.call('SET', KEYS[1], ARGV[1])
redis.call('RPUSH', KEYS[2], ARGV[2])
return 1
"#;

pub struct RedisStore {
    config: RedisStoreConfig,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    client: Client,
    settle_script: Script,
    adjust_cash_script: Script,
}

impl RedisStore {
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let store = Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            client,
            settle_script: Script::new(SETTLE_SCRIPT),
            adjust_cash_script: Script::new(ADJUST_CASH_SCRIPT),
        };
        store.ensure_connected().await?;
        Ok(store)
    }

    async fn ensure_connected(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.write().await;
        if conn.is_none() {
            tracing::info!("connecting to state store at {}", self.config.url);
            let manager = ConnectionManager::new(self.client.clone())
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            *conn = Some(manager);
        }
        Ok(())
    }

    async fn get_connection(&self) -> Result<ConnectionManager, StoreError> {
        self.ensure_connected().await?;
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Unavailable("connection not available".to_string()))
    }

    async fn with_retry<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let timer = Timer::new();
        let result = self.with_retry_inner(&mut f).await;
        crate::metrics::record_store_operation(operation, timer.elapsed_secs());
        if result.is_err() {
            crate::metrics::record_store_error(operation);
        }
        result
    }

    async fn with_retry_inner<F, Fut, T>(&self, operation: &mut F) -> Result<T, StoreError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            match self.get_connection().await {
                Ok(conn) => match operation(conn).await {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        tracing::warn!(
                            "store operation failed (attempt {}/{}): {}",
                            attempt + 1,
                            self.config.max_retries,
                            e
                        );
                        last_error = Some(e.to_string());
                        if attempt < self.config.max_retries - 1 {
                            *self.connection.write().await = None;
                            tokio::time::sleep(Duration::from_millis(
                                self.config.retry_delay_ms * (attempt as u64 + 1),
                            ))
                            .await;
                        }
                    }
                },
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < self.config.max_retries - 1 {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * (attempt as u64 + 1),
                        ))
                        .await;
                    }
                }
            }
        }
        Err(StoreError::Unavailable(
            last_error.unwrap_or_else(|| "max retries exceeded".to_string()),
        ))
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
        serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let key = StoreKey::account(&id.to_string());
        let raw: Option<String> = self
            .with_retry("get_account", |mut conn| {
                let key = key.clone();
                async move { conn.get(&key).await }
            })
            .await?;
        raw.map(|r| Self::from_json(&r)).transpose()
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        let key = StoreKey::account(&account.id.to_string());
        let payload = Self::to_json(account)?;
        let index_key = StoreKey::accounts_index();
        let id = account.id.to_string();
        self.with_retry("put_account", |mut conn| {
            let key = key.clone();
            let payload = payload.clone();
            let index_key = index_key.clone();
            let id = id.clone();
            async move {
                conn.set::<_, _, ()>(&key, payload).await?;
                conn.sadd::<_, _, ()>(&index_key, id).await
            }
        })
        .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let index_key = StoreKey::accounts_index();
        let ids: Vec<String> = self
            .with_retry("list_accounts", |mut conn| {
                let index_key = index_key.clone();
                async move { conn.smembers(&index_key).await }
            })
            .await?;
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(uuid) = Uuid::parse_str(&id) {
                if let Some(account) = self.get_account(uuid).await? {
                    accounts.push(account);
                }
            }
        }
        Ok(accounts)
    }

    async fn accounts_is_empty(&self) -> Result<bool, StoreError> {
        let index_key = StoreKey::accounts_index();
        let count: i64 = self
            .with_retry("accounts_is_empty", |mut conn| {
                let index_key = index_key.clone();
                async move { conn.scard(&index_key).await }
            })
            .await?;
        Ok(count == 0)
    }

    async fn get_position(&self, account_id: Uuid, symbol: &str) -> Result<Option<Position>, StoreError> {
        let key = StoreKey::position(&account_id.to_string(), symbol);
        let raw: Option<String> = self
            .with_retry("get_position", |mut conn| {
                let key = key.clone();
                async move { conn.get(&key).await }
            })
            .await?;
        raw.map(|r| Self::from_json(&r)).transpose()
    }

    async fn put_position(&self, position: &Position) -> Result<(), StoreError> {
        let key = StoreKey::position(&position.account_id.to_string(), &position.symbol);
        let payload = Self::to_json(position)?;
        self.with_retry("put_position", |mut conn| {
            let key = key.clone();
            let payload = payload.clone();
            async move { conn.set(&key, payload).await }
        })
        .await
    }

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, StoreError> {
        // Positions aren't indexed per-account beyond the keys themselves;
        // callers that need a full list should track symbols separately.
        // For the symbols this engine knows about we scan via the orders
        // index instead, which is always populated on first order.
        let orders = self.list_orders_by_account(account_id).await?;
        let mut symbols: Vec<String> = orders.into_iter().map(|o| o.symbol).collect();
        symbols.sort();
        symbols.dedup();
        let mut positions = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(position) = self.get_position(account_id, &symbol).await? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let key = StoreKey::order(&id.to_string());
        let raw: Option<String> = self
            .with_retry("get_order", |mut conn| {
                let key = key.clone();
                async move { conn.get(&key).await }
            })
            .await?;
        raw.map(|r| Self::from_json(&r)).transpose()
    }

    async fn put_order(&self, order: &Order) -> Result<(), StoreError> {
        let key = StoreKey::order(&order.id.to_string());
        let payload = Self::to_json(order)?;
        let account_orders_key = StoreKey::account_orders(&order.account_id.to_string());
        let symbol_orders_key = StoreKey::symbol_orders(&order.symbol);
        let orders_index_key = StoreKey::orders_index();
        let id = order.id.to_string();
        self.with_retry("put_order", |mut conn| {
            let key = key.clone();
            let payload = payload.clone();
            let account_orders_key = account_orders_key.clone();
            let symbol_orders_key = symbol_orders_key.clone();
            let orders_index_key = orders_index_key.clone();
            let id = id.clone();
            async move {
                conn.set::<_, _, ()>(&key, payload).await?;
                conn.sadd::<_, _, ()>(&account_orders_key, id.clone()).await?;
                conn.sadd::<_, _, ()>(&symbol_orders_key, id.clone()).await?;
                conn.sadd::<_, _, ()>(&orders_index_key, id).await
            }
        })
        .await
    }

    async fn list_orders_by_account(&self, account_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let key = StoreKey::account_orders(&account_id.to_string());
        self.list_orders_from_index(&key).await
    }

    async fn list_orders_by_symbol(&self, symbol: &str) -> Result<Vec<Order>, StoreError> {
        let key = StoreKey::symbol_orders(symbol);
        self.list_orders_from_index(&key).await
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>, StoreError> {
        let key = StoreKey::orders_index();
        self.list_orders_from_index(&key).await
    }

    async fn append_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let key = StoreKey::transactions(&transaction.account_id.to_string());
        let payload = Self::to_json(transaction)?;
        self.with_retry("append_transaction", |mut conn| {
            let key = key.clone();
            let payload = payload.clone();
            async move { conn.rpush(&key, payload).await }
        })
        .await
    }

    async fn list_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let key = StoreKey::transactions(&account_id.to_string());
        let raws: Vec<String> = self
            .with_retry("list_transactions", |mut conn| {
                let key = key.clone();
                async move { conn.lrange(&key, 0, -1).await }
            })
            .await?;
        raws.iter().map(|r| Self::from_json(r)).collect()
    }

    async fn append_trade(&self, symbol: &str, trade: &Trade) -> Result<(), StoreError> {
        let key = StoreKey::trades(symbol);
        let payload = Self::to_json(trade)?;
        self.with_retry("append_trade", |mut conn| {
            let key = key.clone();
            let payload = payload.clone();
            async move { conn.rpush(&key, payload).await }
        })
        .await
    }

    async fn list_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let key = StoreKey::trades(symbol);
        let raws: Vec<String> = self
            .with_retry("list_trades", |mut conn| {
                let key = key.clone();
                async move {
                    let len: isize = conn.llen(&key).await?;
                    let start = (len - limit as isize).max(0);
                    conn.lrange(&key, start, -1).await
                }
            })
            .await?;
        raws.iter().map(|r| Self::from_json(r)).collect()
    }

    async fn settle(&self, write: SettlementWrite) -> Result<(), StoreError> {
        let buyer_key = StoreKey::account(&write.buyer_account.id.to_string());
        let seller_key = StoreKey::account(&write.seller_account.id.to_string());
        let buyer_pos_key =
            StoreKey::position(&write.buyer_position.account_id.to_string(), &write.buyer_position.symbol);
        let seller_pos_key =
            StoreKey::position(&write.seller_position.account_id.to_string(), &write.seller_position.symbol);
        let trades_key = StoreKey::trades(&write.trade.symbol);
        let buyer_txn_key = StoreKey::transactions(&write.buyer_transaction.account_id.to_string());
        let seller_txn_key = StoreKey::transactions(&write.seller_transaction.account_id.to_string());

        let buyer_account_json = Self::to_json(&write.buyer_account)?;
        let seller_account_json = Self::to_json(&write.seller_account)?;
        let buyer_pos_json = Self::to_json(&write.buyer_position)?;
        let seller_pos_json = Self::to_json(&write.seller_position)?;
        let trade_json = Self::to_json(&write.trade)?;
        let buyer_txn_json = Self::to_json(&write.buyer_transaction)?;
        let seller_txn_json = Self::to_json(&write.seller_transaction)?;

        let script = self.settle_script.clone();
        self.with_retry("settle", move |mut conn| {
            let script = script.clone();
            let keys = (
                buyer_key.clone(),
                seller_key.clone(),
                buyer_pos_key.clone(),
                seller_pos_key.clone(),
                trades_key.clone(),
                buyer_txn_key.clone(),
                seller_txn_key.clone(),
            );
            let args = (
                buyer_account_json.clone(),
                seller_account_json.clone(),
                buyer_pos_json.clone(),
                seller_pos_json.clone(),
                trade_json.clone(),
                buyer_txn_json.clone(),
                seller_txn_json.clone(),
            );
            async move {
                script
                    .key(keys.0)
                    .key(keys.1)
                    .key(keys.2)
                    .key(keys.3)
                    .key(keys.4)
                    .key(keys.5)
                    .key(keys.6)
                    .arg(args.0)
                    .arg(args.1)
                    .arg(args.2)
                    .arg(args.3)
                    .arg(args.4)
                    .arg(args.5)
                    .arg(args.6)
                    .invoke_async::<_, i32>(&mut conn)
                    .await
                    .map(|_| ())
            }
        })
        .await
        .map_err(|e| StoreError::ScriptFailed(e.to_string()))
    }

    async fn adjust_cash(
        &self,
        account_id: Uuid,
        delta: Decimal,
        transaction: Transaction,
    ) -> Result<Account, StoreError> {
        let mut account = self
            .get_account(account_id)
            .await?
            .ok_or_else(|| StoreError::ScriptFailed(format!("unknown account {account_id}")))?;
        account.cash_balance += delta;

        let account_key = StoreKey::account(&account_id.to_string());
        let txn_key = StoreKey::transactions(&account_id.to_string());
        let account_json = Self::to_json(&account)?;
        let txn_json = Self::to_json(&transaction)?;

        let script = self.adjust_cash_script.clone();
        self.with_retry("adjust_cash", move |mut conn| {
            let script = script.clone();
            let account_key = account_key.clone();
            let txn_key = txn_key.clone();
            let account_json = account_json.clone();
            let txn_json = txn_json.clone();
            async move {
                script
                    .key(account_key)
                    .key(txn_key)
                    .arg(account_json)
                    .arg(txn_json)
                    .invoke_async::<_, i32>(&mut conn)
                    .await
                    .map(|_| ())
            }
        })
        .await
        .map_err(|e| StoreError::ScriptFailed(e.to_string()))?;

        Ok(account)
    }

    async fn ping(&self) -> bool {
        self.with_retry("ping", |mut conn| async move {
            let result: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(result == "PONG")
        })
        .await
        .unwrap_or(false)
    }
}

impl RedisStore {
    async fn list_orders_from_index(&self, index_key: &str) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<String> = self
            .with_retry("list_orders_from_index", |mut conn| {
                let index_key = index_key.to_string();
                async move { conn.smembers(&index_key).await }
            })
            .await?;
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(uuid) = Uuid::parse_str(&id) {
                if let Some(order) = self.get_order(uuid).await? {
                    orders.push(order);
                }
            }
        }
        Ok(orders)
    }
}
