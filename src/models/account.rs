use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of account holder, used to pick default risk-limit overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Individual,
    Institutional,
    MarketMaker,
}

impl Default for AccountType {
    fn default() -> Self {
        AccountType::Individual
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Individual => write!(f, "individual"),
            AccountType::Institutional => write!(f, "institutional"),
            AccountType::MarketMaker => write!(f, "market_maker"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Medium
    }
}

impl RiskLevel {
    /// The multiplier applied to global risk-limit defaults when an account
    /// has no explicit override: a conservative tag halves the default, a
    /// permissive one doubles it.
    fn scale_factor(self) -> Decimal {
        match self {
            RiskLevel::Low => Decimal::new(5, 1),
            RiskLevel::Medium => Decimal::ONE,
            RiskLevel::High => Decimal::from(2),
        }
    }
}

/// A trading account: cash balance, risk overrides, enable/disable flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub account_type: AccountType,
    pub risk_level: RiskLevel,
    pub cash_balance: Decimal,
    pub enabled: bool,
    /// Per-account override of the global max order value; `None` falls back
    /// to the configured default.
    pub max_order_value: Option<Decimal>,
    /// Per-account override of the global max position quantity; `None`
    /// falls back to a type-scaled default (see `effective_max_position_qty`).
    pub max_position_qty: Option<Decimal>,
    /// Per-symbol order-value overrides, keyed by symbol.
    pub symbol_limits: std::collections::HashMap<String, Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: impl Into<String>, account_type: AccountType, starting_cash: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            account_type,
            risk_level: RiskLevel::default(),
            cash_balance: starting_cash,
            enabled: true,
            max_order_value: None,
            max_position_qty: None,
            symbol_limits: std::collections::HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolve the effective max order value for `symbol`: symbol override,
    /// then account override, then the global default scaled by risk level.
    pub fn effective_max_order_value(&self, symbol: &str, global_default: Decimal) -> Decimal {
        if let Some(limit) = self.symbol_limits.get(symbol) {
            return *limit;
        }
        self.max_order_value
            .unwrap_or_else(|| global_default * self.risk_level.scale_factor())
    }

    /// Resolve the effective max absolute position size: an explicit
    /// override if set, otherwise the global default scaled by account type
    /// and then by risk level. Market makers have no cap (`None`);
    /// institutional accounts get 10x the individual default.
    pub fn effective_max_position_qty(&self, global_default: Decimal) -> Option<Decimal> {
        if let Some(limit) = self.max_position_qty {
            return Some(limit);
        }
        let scaled = global_default * self.risk_level.scale_factor();
        match self.account_type {
            AccountType::MarketMaker => None,
            AccountType::Institutional => Some(scaled * Decimal::from(10)),
            AccountType::Individual => Some(scaled),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    #[serde(default)]
    pub account_type: AccountType,
    pub starting_cash: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub enabled: Option<bool>,
    pub max_order_value: Option<Decimal>,
    pub max_position_qty: Option<Decimal>,
    pub risk_level: Option<RiskLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn risk_level_scales_the_default_order_value_limit() {
        let mut account = Account::new("acct", AccountType::Individual, dec!(1_000_000));
        account.risk_level = RiskLevel::Low;
        assert_eq!(account.effective_max_order_value("AAPL", dec!(100_000)), dec!(50_000));

        account.risk_level = RiskLevel::High;
        assert_eq!(account.effective_max_order_value("AAPL", dec!(100_000)), dec!(200_000));
    }

    #[test]
    fn explicit_override_ignores_risk_level() {
        let mut account = Account::new("acct", AccountType::Individual, dec!(1_000_000));
        account.risk_level = RiskLevel::High;
        account.max_order_value = Some(dec!(10_000));
        assert_eq!(account.effective_max_order_value("AAPL", dec!(100_000)), dec!(10_000));
    }
}
