//! State Store (C1): a key-addressed map over accounts, positions, orders,
//! and transactions, with one atomic multi-key mutation primitive used by
//! trade settlement.

pub mod keys;
pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Account, Order, Position, Trade, Transaction};

pub use memory_store::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

/// A single settlement unit: the atomic effect of one trade on both sides'
/// cash and positions, plus the trade/transaction records it produces.
pub struct SettlementWrite {
    pub trade: Trade,
    pub buyer_account: Account,
    pub seller_account: Account,
    pub buyer_position: Position,
    pub seller_position: Position,
    pub buyer_transaction: Transaction,
    pub seller_transaction: Transaction,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn put_account(&self, account: &Account) -> Result<(), StoreError>;
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;
    async fn accounts_is_empty(&self) -> Result<bool, StoreError>;

    async fn get_position(&self, account_id: Uuid, symbol: &str) -> Result<Option<Position>, StoreError>;
    async fn put_position(&self, position: &Position) -> Result<(), StoreError>;
    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn put_order(&self, order: &Order) -> Result<(), StoreError>;
    async fn list_orders_by_account(&self, account_id: Uuid) -> Result<Vec<Order>, StoreError>;
    async fn list_orders_by_symbol(&self, symbol: &str) -> Result<Vec<Order>, StoreError>;
    /// Every order ever submitted, regardless of account or symbol. Backs
    /// the account-joined order listing and the risk-alert feed.
    async fn list_all_orders(&self) -> Result<Vec<Order>, StoreError>;

    async fn append_transaction(&self, transaction: &Transaction) -> Result<(), StoreError>;
    async fn list_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    async fn append_trade(&self, symbol: &str, trade: &Trade) -> Result<(), StoreError>;
    async fn list_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>, StoreError>;

    /// Atomically apply a settlement: both accounts' cash, both positions,
    /// the trade record, and both transaction entries become visible
    /// together or not at all.
    async fn settle(&self, write: SettlementWrite) -> Result<(), StoreError>;

    /// Adjust a single account's cash balance (deposit/withdrawal/manual
    /// adjustment), appending the corresponding transaction atomically.
    async fn adjust_cash(
        &self,
        account_id: Uuid,
        delta: Decimal,
        transaction: Transaction,
    ) -> Result<Account, StoreError>;

    async fn ping(&self) -> bool;
}
