//! Risk Gate (C2): a pure, synchronous pre-trade check. No I/O — every input
//! it needs is handed in by the caller, and the fixed step order below is
//! authoritative (it supersedes the two duplicate, inconsistently-limited
//! check paths the original system carried).

use rust_decimal::Decimal;

use crate::config::AppConfig;
use crate::models::{Account, Order, Position};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskRejection {
    AccountDisabled,
    SymbolDisabled,
    QuantityOutOfBounds,
    PriceOutOfBounds,
    PriceDeviationExceeded,
    OrderValueExceeded,
    InsufficientFunds,
    InsufficientInventory,
    PositionLimitExceeded,
}

impl RiskRejection {
    pub fn message(&self) -> &'static str {
        match self {
            RiskRejection::AccountDisabled => "account is disabled",
            RiskRejection::SymbolDisabled => "symbol is disabled for trading",
            RiskRejection::QuantityOutOfBounds => "order quantity outside allowed bounds",
            RiskRejection::PriceOutOfBounds => "limit price outside allowed bounds",
            RiskRejection::PriceDeviationExceeded => "limit price deviates too far from last trade",
            RiskRejection::OrderValueExceeded => "order value exceeds account limit",
            RiskRejection::InsufficientFunds => "insufficient cash balance for buy order",
            RiskRejection::InsufficientInventory => "insufficient inventory for sell order; short-selling disallowed",
            RiskRejection::PositionLimitExceeded => "order would exceed the account's max position size",
        }
    }
}

pub type RiskOutcome = Result<(), RiskRejection>;

/// Everything the gate needs to evaluate one order, borrowed from callers.
pub struct RiskContext<'a> {
    pub account: &'a Account,
    pub disabled_symbols: &'a [String],
    pub last_trade_price: Option<Decimal>,
    pub position: Option<&'a Position>,
    pub config: &'a AppConfig,
}

/// Evaluate an order against the fixed 9-step sequence:
/// 1. account enabled
/// 2. symbol enabled
/// 3. quantity within [min, max]
/// 4. limit price within [min, max] (market orders skip this and the next two)
/// 5. limit price within `price_deviation_pct` of the last trade price
/// 6. order value within the account's effective max order value
/// 7. for buy orders: price x quantity <= account cash balance (sufficient funds)
/// 8. for sell orders: open inventory >= quantity (sufficient inventory; no short-selling)
/// 9. projected position size within the account's effective max position size
pub fn evaluate(order: &Order, ctx: &RiskContext) -> RiskOutcome {
    if !ctx.account.enabled {
        return Err(RiskRejection::AccountDisabled);
    }

    if ctx.disabled_symbols.iter().any(|s| s == &order.symbol) {
        return Err(RiskRejection::SymbolDisabled);
    }

    let min_qty = ctx.config.min_order_size();
    let max_qty = ctx.config.max_order_size();
    if order.quantity < min_qty || order.quantity > max_qty {
        return Err(RiskRejection::QuantityOutOfBounds);
    }

    if let Some(price) = order.price {
        let min_price = ctx.config.min_price();
        let max_price = ctx.config.max_price();
        if price < min_price || price > max_price {
            return Err(RiskRejection::PriceOutOfBounds);
        }

        if let Some(last_price) = ctx.last_trade_price {
            if last_price > Decimal::ZERO {
                let deviation = ((price - last_price) / last_price * Decimal::ONE_HUNDRED).abs();
                if deviation > ctx.config.price_deviation_pct() {
                    return Err(RiskRejection::PriceDeviationExceeded);
                }
            }
        }

        let order_value = price * order.quantity;
        let limit = ctx
            .account
            .effective_max_order_value(&order.symbol, ctx.config.max_order_value());
        if order_value > limit {
            return Err(RiskRejection::OrderValueExceeded);
        }
    }

    match order.side {
        crate::models::Side::Buy => {
            if let Some(price) = order.price.or(ctx.last_trade_price) {
                let required = price * order.quantity;
                if required > ctx.account.cash_balance {
                    return Err(RiskRejection::InsufficientFunds);
                }
            }
        }
        crate::models::Side::Sell => {
            let held = ctx.position.map(|p| p.quantity).unwrap_or(Decimal::ZERO);
            if held < order.quantity {
                return Err(RiskRejection::InsufficientInventory);
            }
        }
    }

    if let Some(limit) = ctx
        .account
        .effective_max_position_qty(ctx.config.max_position_qty())
    {
        let current = ctx.position.map(|p| p.quantity).unwrap_or(Decimal::ZERO);
        let delta = match order.side {
            crate::models::Side::Buy => order.quantity,
            crate::models::Side::Sell => -order.quantity,
        };
        if (current + delta).abs() > limit {
            return Err(RiskRejection::PositionLimitExceeded);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountType, OrderStatus, OrderType, Side, TimeInForce};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sample_order(quantity: Decimal, price: Option<Decimal>) -> Order {
        sample_order_side(Side::Buy, quantity, price)
    }

    fn sample_order_side(side: Side, quantity: Decimal, price: Option<Decimal>) -> Order {
        Order {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            side,
            order_type: OrderType::Limit,
            price,
            quantity,
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
        }
    }

    #[test]
    fn rejects_disabled_account() {
        let mut account = Account::new("acct", AccountType::Individual, dec!(10000));
        account.enabled = false;
        let config = AppConfig::default();
        let order = sample_order(dec!(10), Some(dec!(100)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: None,
            position: None,
            config: &config,
        };
        assert_eq!(evaluate(&order, &ctx), Err(RiskRejection::AccountDisabled));
    }

    #[test]
    fn rejects_price_deviation() {
        let account = Account::new("acct", AccountType::Individual, dec!(10000));
        let config = AppConfig::default();
        let order = sample_order(dec!(10), Some(dec!(200)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: Some(dec!(100)),
            position: None,
            config: &config,
        };
        assert_eq!(evaluate(&order, &ctx), Err(RiskRejection::PriceDeviationExceeded));
    }

    #[test]
    fn accepts_order_within_bounds() {
        let account = Account::new("acct", AccountType::Individual, dec!(10000));
        let config = AppConfig::default();
        let order = sample_order(dec!(10), Some(dec!(101)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: Some(dec!(100)),
            position: None,
            config: &config,
        };
        assert!(evaluate(&order, &ctx).is_ok());
    }

    #[test]
    fn rejects_buy_with_insufficient_cash() {
        let account = Account::new("acct", AccountType::Individual, dec!(500));
        let config = AppConfig::default();
        let order = sample_order(dec!(10), Some(dec!(100)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: Some(dec!(100)),
            position: None,
            config: &config,
        };
        assert_eq!(evaluate(&order, &ctx), Err(RiskRejection::InsufficientFunds));
    }

    #[test]
    fn rejects_naked_short_sell() {
        let account = Account::new("acct", AccountType::Individual, dec!(10_000));
        let config = AppConfig::default();
        let order = sample_order_side(Side::Sell, dec!(10), Some(dec!(100)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: Some(dec!(100)),
            position: None,
            config: &config,
        };
        assert_eq!(evaluate(&order, &ctx), Err(RiskRejection::InsufficientInventory));
    }

    #[test]
    fn accepts_sell_covered_by_existing_position() {
        let account = Account::new("acct", AccountType::Individual, dec!(10_000));
        let config = AppConfig::default();
        let position = crate::models::Position {
            account_id: account.id,
            symbol: "AAPL".to_string(),
            quantity: dec!(20),
            avg_cost: dec!(90),
        };
        let order = sample_order_side(Side::Sell, dec!(10), Some(dec!(100)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: Some(dec!(100)),
            position: Some(&position),
            config: &config,
        };
        assert!(evaluate(&order, &ctx).is_ok());
    }

    #[test]
    fn rejects_order_that_would_exceed_position_limit() {
        let account = Account::new("acct", AccountType::Individual, dec!(10_000_000));
        let config = AppConfig::default();
        let position = crate::models::Position {
            account_id: account.id,
            symbol: "AAPL".to_string(),
            quantity: config.max_position_qty() - dec!(5),
            avg_cost: dec!(100),
        };
        let order = sample_order(dec!(10), Some(dec!(100)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: Some(dec!(100)),
            position: Some(&position),
            config: &config,
        };
        assert_eq!(evaluate(&order, &ctx), Err(RiskRejection::PositionLimitExceeded));
    }

    #[test]
    fn market_makers_have_no_position_limit() {
        let account = Account::new("mm", AccountType::MarketMaker, dec!(10_000_000));
        let config = AppConfig::default();
        let position = crate::models::Position {
            account_id: account.id,
            symbol: "AAPL".to_string(),
            quantity: config.max_position_qty() * dec!(100),
            avg_cost: dec!(100),
        };
        let order = sample_order(dec!(10), Some(dec!(100)));
        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &[],
            last_trade_price: Some(dec!(100)),
            position: Some(&position),
            config: &config,
        };
        assert!(evaluate(&order, &ctx).is_ok());
    }
}
