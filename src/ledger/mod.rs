//! Account Ledger (C3): balance, position, and transaction bookkeeping, plus
//! atomic trade settlement and first-startup account seeding.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    Account, AccountType, Position, Side, Trade, Transaction, TransactionType,
};
use crate::store::{SettlementWrite, Store};

pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_account(&self, account: Account) -> Result<Account, EngineError> {
        self.store
            .put_account(&account)
            .await
            .map_err(EngineError::from)?;
        Ok(account)
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Account, EngineError> {
        self.store
            .get_account(id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("account {id}")))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, EngineError> {
        self.store.list_accounts().await.map_err(EngineError::from)
    }

    pub async fn update_account(
        &self,
        id: Uuid,
        enabled: Option<bool>,
        max_order_value: Option<Decimal>,
        max_position_qty: Option<Decimal>,
        risk_level: Option<crate::models::RiskLevel>,
    ) -> Result<Account, EngineError> {
        let mut account = self.get_account(id).await?;
        if let Some(enabled) = enabled {
            account.enabled = enabled;
        }
        if let Some(limit) = max_order_value {
            account.max_order_value = Some(limit);
        }
        if let Some(limit) = max_position_qty {
            account.max_position_qty = Some(limit);
        }
        if let Some(level) = risk_level {
            account.risk_level = level;
        }
        account.updated_at = Utc::now();
        self.store
            .put_account(&account)
            .await
            .map_err(EngineError::from)?;
        Ok(account)
    }

    pub async fn get_position(&self, account_id: Uuid, symbol: &str) -> Result<Position, EngineError> {
        Ok(self
            .store
            .get_position(account_id, symbol)
            .await
            .map_err(EngineError::from)?
            .unwrap_or_else(|| Position::flat(account_id, symbol)))
    }

    pub async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, EngineError> {
        self.store
            .list_positions(account_id)
            .await
            .map_err(EngineError::from)
    }

    pub async fn list_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>, EngineError> {
        self.store
            .list_transactions(account_id)
            .await
            .map_err(EngineError::from)
    }

    /// Post a standalone transaction (deposit, withdrawal, manual
    /// adjustment) that debits/credits cash and is visible atomically with
    /// the updated balance.
    pub async fn post_transaction(
        &self,
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> Result<Account, EngineError> {
        let account = self.get_account(account_id).await?;
        let delta = match transaction_type {
            TransactionType::Withdrawal => -amount,
            _ => amount,
        };
        if account.cash_balance + delta < Decimal::ZERO {
            return Err(EngineError::Validation(
                "transaction would overdraw account".to_string(),
            ));
        }
        let transaction = Transaction {
            id: Uuid::new_v4(),
            account_id,
            transaction_type,
            amount,
            balance_after: account.cash_balance + delta,
            reference: None,
            created_at: Utc::now(),
        };
        self.store
            .adjust_cash(account_id, delta, transaction)
            .await
            .map_err(EngineError::from)
    }

    /// Atomically settle one trade: debit the buyer's cash, credit the
    /// seller's, update both positions, and record the trade and both
    /// transactions — all-or-nothing.
    pub async fn settle_trade(&self, trade: &Trade) -> Result<(), EngineError> {
        let (buyer_id, seller_id) = match trade.taker_side {
            Side::Buy => (trade.taker_account_id, trade.maker_account_id),
            Side::Sell => (trade.maker_account_id, trade.taker_account_id),
        };
        let mut buyer = self.get_account(buyer_id).await?;
        let mut seller = self.get_account(seller_id).await?;

        let gross = trade.price * trade.quantity;
        if buyer.cash_balance < gross {
            return Err(EngineError::InvariantViolation(
                "buyer has insufficient cash at settlement time".to_string(),
            ));
        }

        let mut buyer_position = self.get_position(buyer.id, &trade.symbol).await?;
        let mut seller_position = self.get_position(seller.id, &trade.symbol).await?;

        buyer_position.apply_fill(Side::Buy, trade.quantity, trade.price);
        seller_position.apply_fill(Side::Sell, trade.quantity, trade.price);

        buyer.cash_balance -= gross;
        seller.cash_balance += gross;
        let now = Utc::now();
        buyer.updated_at = now;
        seller.updated_at = now;

        let buyer_transaction = Transaction {
            id: Uuid::new_v4(),
            account_id: buyer.id,
            transaction_type: TransactionType::TradeDebit,
            amount: -gross,
            balance_after: buyer.cash_balance,
            reference: Some(trade.id),
            created_at: now,
        };
        let seller_transaction = Transaction {
            id: Uuid::new_v4(),
            account_id: seller.id,
            transaction_type: TransactionType::TradeCredit,
            amount: gross,
            balance_after: seller.cash_balance,
            reference: Some(trade.id),
            created_at: now,
        };

        self.store
            .settle(SettlementWrite {
                trade: trade.clone(),
                buyer_account: buyer,
                seller_account: seller,
                buyer_position,
                seller_position,
                buyer_transaction,
                seller_transaction,
            })
            .await
            .map_err(EngineError::from)
    }

    /// Seed a small fixed set of demo accounts through the normal create
    /// path, iff no accounts exist yet.
    pub async fn seed_if_empty(&self) -> Result<(), EngineError> {
        if !self
            .store
            .accounts_is_empty()
            .await
            .map_err(EngineError::from)?
        {
            return Ok(());
        }

        let seeds = [
            ("alpha-capital", AccountType::Institutional, dec!(5_000_000)),
            ("blue-harbor-mm", AccountType::MarketMaker, dec!(2_000_000)),
            ("retail-jane", AccountType::Individual, dec!(25_000)),
            ("retail-marco", AccountType::Individual, dec!(10_000)),
        ];

        for (name, account_type, starting_cash) in seeds {
            let account = Account::new(name, account_type, starting_cash);
            self.create_account(account).await?;
        }
        tracing::info!("seeded {} demo accounts", seeds.len());
        Ok(())
    }
}
