use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A per-account, per-symbol cash position: quantity held and the
/// volume-weighted average cost basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub account_id: Uuid,
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
}

impl Position {
    pub fn flat(account_id: Uuid, symbol: impl Into<String>) -> Self {
        Self {
            account_id,
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
        }
    }

    /// Apply a fill of `quantity` at `price` on `side`, updating quantity and
    /// VWAP cost basis. A sell reduces quantity and realizes against the
    /// existing average cost; it never recomputes avg_cost on close.
    pub fn apply_fill(&mut self, side: crate::models::order::Side, quantity: Decimal, price: Decimal) {
        use crate::models::order::Side;
        match side {
            Side::Buy => {
                let new_quantity = self.quantity + quantity;
                if new_quantity.is_zero() {
                    self.avg_cost = Decimal::ZERO;
                } else if self.quantity.is_zero() {
                    self.avg_cost = price;
                } else {
                    let existing_value = self.quantity * self.avg_cost;
                    let added_value = quantity * price;
                    self.avg_cost = (existing_value + added_value) / new_quantity;
                }
                self.quantity = new_quantity;
            }
            Side::Sell => {
                self.quantity -= quantity;
                if self.quantity.is_zero() {
                    self.avg_cost = Decimal::ZERO;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::Side;
    use rust_decimal_macros::dec;

    #[test]
    fn vwap_averages_across_two_buys() {
        let mut pos = Position::flat(Uuid::new_v4(), "AAPL");
        pos.apply_fill(Side::Buy, dec!(10), dec!(100));
        pos.apply_fill(Side::Buy, dec!(10), dec!(120));
        assert_eq!(pos.quantity, dec!(20));
        assert_eq!(pos.avg_cost, dec!(110));
    }

    #[test]
    fn sell_reduces_quantity_without_changing_avg_cost() {
        let mut pos = Position::flat(Uuid::new_v4(), "AAPL");
        pos.apply_fill(Side::Buy, dec!(10), dec!(100));
        pos.apply_fill(Side::Sell, dec!(4), dec!(150));
        assert_eq!(pos.quantity, dec!(6));
        assert_eq!(pos.avg_cost, dec!(100));
    }

    #[test]
    fn closing_position_resets_avg_cost() {
        let mut pos = Position::flat(Uuid::new_v4(), "AAPL");
        pos.apply_fill(Side::Buy, dec!(10), dec!(100));
        pos.apply_fill(Side::Sell, dec!(10), dec!(150));
        assert_eq!(pos.quantity, dec!(0));
        assert_eq!(pos.avg_cost, dec!(0));
    }
}
