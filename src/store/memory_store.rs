//! In-memory `Store` double used by tests: no live Redis is available to the
//! test runner, so this preserves the same atomicity contract behind one
//! mutex guarding the whole map.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{SettlementWrite, Store};
use crate::error::StoreError;
use crate::models::{Account, Order, Position, Trade, Transaction};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    positions: HashMap<(Uuid, String), Position>,
    orders: HashMap<Uuid, Order>,
    transactions: HashMap<Uuid, Vec<Transaction>>,
    trades: HashMap<String, Vec<Trade>>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.lock().unwrap().accounts.get(&id).cloned())
    }

    async fn put_account(&self, account: &Account) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.inner.lock().unwrap().accounts.values().cloned().collect())
    }

    async fn accounts_is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().accounts.is_empty())
    }

    async fn get_position(&self, account_id: Uuid, symbol: &str) -> Result<Option<Position>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .positions
            .get(&(account_id, symbol.to_string()))
            .cloned())
    }

    async fn put_position(&self, position: &Position) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .positions
            .insert((position.account_id, position.symbol.clone()), position.clone());
        Ok(())
    }

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .positions
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.lock().unwrap().orders.get(&id).cloned())
    }

    async fn put_order(&self, order: &Order) -> Result<(), StoreError> {
        self.inner.lock().unwrap().orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn list_orders_by_account(&self, account_id: Uuid) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .orders
            .values()
            .filter(|o| o.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn list_orders_by_symbol(&self, symbol: &str) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .orders
            .values()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.inner.lock().unwrap().orders.values().cloned().collect())
    }

    async fn append_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .entry(transaction.account_id)
            .or_default()
            .push(transaction.clone());
        Ok(())
    }

    async fn list_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_trade(&self, symbol: &str, trade: &Trade) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .trades
            .entry(symbol.to_string())
            .or_default()
            .push(trade.clone());
        Ok(())
    }

    async fn list_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .trades
            .get(symbol)
            .map(|trades| {
                trades
                    .iter()
                    .rev()
                    .take(limit)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }

    async fn settle(&self, write: SettlementWrite) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().unwrap();
        guard.accounts.insert(write.buyer_account.id, write.buyer_account);
        guard.accounts.insert(write.seller_account.id, write.seller_account);
        guard.positions.insert(
            (write.buyer_position.account_id, write.buyer_position.symbol.clone()),
            write.buyer_position,
        );
        guard.positions.insert(
            (write.seller_position.account_id, write.seller_position.symbol.clone()),
            write.seller_position,
        );
        guard
            .transactions
            .entry(write.buyer_transaction.account_id)
            .or_default()
            .push(write.buyer_transaction);
        guard
            .transactions
            .entry(write.seller_transaction.account_id)
            .or_default()
            .push(write.seller_transaction);
        guard
            .trades
            .entry(write.trade.symbol.clone())
            .or_default()
            .push(write.trade);
        Ok(())
    }

    async fn adjust_cash(
        &self,
        account_id: Uuid,
        delta: Decimal,
        transaction: Transaction,
    ) -> Result<Account, StoreError> {
        let mut guard = self.inner.lock().unwrap();
        let account = guard
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::ScriptFailed(format!("unknown account {account_id}")))?;
        account.cash_balance += delta;
        let updated = account.clone();
        guard
            .transactions
            .entry(account_id)
            .or_default()
            .push(transaction);
        Ok(updated)
    }

    async fn ping(&self) -> bool {
        true
    }
}
