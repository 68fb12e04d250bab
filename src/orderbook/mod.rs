//! Order Book (C4): per-symbol price-time priority index, lit and dark.

use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use crate::models::{Order, Side};

/// Fixed-point price with 8 decimal precision for exact ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceLevel(i64);

const SCALE: i64 = 100_000_000;

impl PriceLevel {
    pub fn from_decimal(price: Decimal) -> Self {
        let scaled = price * Decimal::from(SCALE);
        PriceLevel(scaled.round().to_i64().unwrap_or(0))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(SCALE)
    }
}

impl Ord for PriceLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for PriceLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A resting order entry, carrying just what the book needs to match and
/// break ties: account id for self-trade prevention, timestamp and id for
/// price-time-then-id priority.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub order_id: Uuid,
    pub account_id: Uuid,
    pub side: Side,
    pub price: Decimal,
    pub remaining: Decimal,
    pub timestamp_millis: i64,
    pub internal: bool,
}

impl From<&Order> for BookEntry {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            account_id: order.account_id,
            side: order.side,
            price: order.price.unwrap_or(Decimal::ZERO),
            remaining: order.remaining_quantity(),
            timestamp_millis: order.created_at.timestamp_millis(),
            internal: order.internal,
        }
    }
}

/// Book side keyed by price level, FIFO within a level, with id as a
/// tie-break for orders sharing a timestamp.
struct Side_ {
    levels: BTreeMap<PriceLevel, VecDeque<BookEntry>>,
}

impl Side_ {
    fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    fn insert(&mut self, entry: BookEntry) {
        let level = PriceLevel::from_decimal(entry.price);
        let queue = self.levels.entry(level).or_insert_with(VecDeque::new);
        let insert_at = queue
            .iter()
            .position(|e| {
                (e.timestamp_millis, e.order_id) > (entry.timestamp_millis, entry.order_id)
            })
            .unwrap_or(queue.len());
        queue.insert(insert_at, entry);
    }

    fn remove(&mut self, price: Decimal, order_id: Uuid) -> Option<BookEntry> {
        let level = PriceLevel::from_decimal(price);
        let queue = self.levels.get_mut(&level)?;
        let pos = queue.iter().position(|e| e.order_id == order_id)?;
        let entry = queue.remove(pos);
        if queue.is_empty() {
            self.levels.remove(&level);
        }
        entry
    }

    fn depth(&self, levels: usize) -> Vec<(Decimal, Decimal)> {
        self.levels
            .iter()
            .map(|(level, queue)| (level.to_decimal(), queue.iter().map(|e| e.remaining).sum()))
            .take(levels)
            .collect()
    }
}

/// One symbol's lit and dark books, plus an order-id index for O(1)
/// cancel/edit lookups.
pub struct SymbolBook {
    pub symbol: String,
    lit_bids: RwLock<Side_>,
    lit_asks: RwLock<Side_>,
    dark_bids: RwLock<Side_>,
    dark_asks: RwLock<Side_>,
    index: DashMap<Uuid, (Side, bool, Decimal)>,
    last_trade_price: RwLock<Option<Decimal>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub last_trade_price: Option<Decimal>,
}

impl SymbolBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            lit_bids: RwLock::new(Side_::new()),
            lit_asks: RwLock::new(Side_::new()),
            dark_bids: RwLock::new(Side_::new()),
            dark_asks: RwLock::new(Side_::new()),
            index: DashMap::new(),
            last_trade_price: RwLock::new(None),
        }
    }

    fn side_mut(&self, side: Side, internal: bool) -> &RwLock<Side_> {
        match (side, internal) {
            (Side::Buy, false) => &self.lit_bids,
            (Side::Sell, false) => &self.lit_asks,
            (Side::Buy, true) => &self.dark_bids,
            (Side::Sell, true) => &self.dark_asks,
        }
    }

    fn opposite_sides(&self, side: Side, internal: bool) -> Vec<&RwLock<Side_>> {
        // Dark-pool preference order per §4.5: internal-vs-internal, then
        // cross-book, then lit-vs-lit. A lit taker never sees the dark book
        // at all — dark liquidity is only reachable by another dark order.
        let opp = side.opposite();
        if internal {
            vec![self.side_mut(opp, true), self.side_mut(opp, false)]
        } else {
            vec![self.side_mut(opp, false)]
        }
    }

    pub fn insert(&self, entry: BookEntry) {
        let key = (entry.side, entry.internal, entry.price);
        self.index.insert(entry.order_id, key);
        self.side_mut(entry.side, entry.internal).write().insert(entry);
    }

    pub fn cancel(&self, order_id: Uuid) -> Option<BookEntry> {
        let (side, internal, price) = *self.index.get(&order_id)?;
        self.index.remove(&order_id);
        self.side_mut(side, internal).write().remove(price, order_id)
    }

    /// Remove and reinsert at a new price/quantity, preserving order id but
    /// losing time priority — the caller (matching engine) is responsible
    /// for stamping `edited = true` and re-running matching afterward.
    pub fn edit(&self, order_id: Uuid, new_price: Decimal, new_remaining: Decimal) -> Option<BookEntry> {
        let (side, internal, old_price) = *self.index.get(&order_id)?;
        let mut entry = self.side_mut(side, internal).write().remove(old_price, order_id)?;
        entry.price = new_price;
        entry.remaining = new_remaining;
        self.insert(entry.clone());
        Some(entry)
    }

    pub fn has_order(&self, order_id: Uuid) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Every order id currently resting in this symbol's book, lit or dark.
    /// Used by the cleanup sweep to reconcile the book against the store.
    pub fn resting_order_ids(&self) -> Vec<Uuid> {
        self.index.iter().map(|entry| *entry.key()).collect()
    }

    pub fn set_last_trade_price(&self, price: Decimal) {
        *self.last_trade_price.write() = Some(price);
    }

    pub fn last_trade_price(&self) -> Option<Decimal> {
        *self.last_trade_price.read()
    }

    pub fn best(&self, side: Side, internal: bool) -> Option<Decimal> {
        let book = self.side_mut(side, internal).read();
        match side {
            Side::Buy => book.levels.keys().next_back().map(|l| l.to_decimal()),
            Side::Sell => book.levels.keys().next().map(|l| l.to_decimal()),
        }
    }

    /// Pop the best resting entry on `side`/`internal` that crosses
    /// `limit_price` (`None` = market, always crosses) and whose account id
    /// is not `self_account` (self-trade prevention: the incoming order is
    /// skipped against its own resting order, and since the incoming order
    /// must be the later one by definition, it is always the one that
    /// yields). If the best price level is entirely self-owned, falls
    /// through to the next (worse but still crossing) level rather than
    /// giving up — a level with no eligible counterparty must not strand
    /// valid liquidity behind it.
    fn pop_crossing(
        &self,
        side: Side,
        internal: bool,
        limit_price: Option<Decimal>,
        self_account: Uuid,
    ) -> Option<BookEntry> {
        let mut book = self.side_mut(side, internal).write();
        let level_keys: Vec<PriceLevel> = match side {
            Side::Buy => book.levels.keys().rev().copied().collect(),
            Side::Sell => book.levels.keys().copied().collect(),
        };
        for level_key in level_keys {
            let level_price = level_key.to_decimal();
            let crosses = match (side, limit_price) {
                (_, None) => true,
                (Side::Buy, Some(limit)) => level_price <= limit,
                (Side::Sell, Some(limit)) => level_price >= limit,
            };
            if !crosses {
                break;
            }
            let Some(queue) = book.levels.get_mut(&level_key) else {
                continue;
            };
            let Some(pos) = queue.iter().position(|e| e.account_id != self_account) else {
                continue;
            };
            let entry = queue.remove(pos)?;
            if queue.is_empty() {
                book.levels.remove(&level_key);
            }
            drop(book);
            self.index.remove(&entry.order_id);
            return Some(entry);
        }
        None
    }

    /// Re-insert a partially-filled maker back at the front of its level.
    fn push_front(&self, entry: BookEntry) {
        let level = PriceLevel::from_decimal(entry.price);
        self.index
            .insert(entry.order_id, (entry.side, entry.internal, entry.price));
        self.side_mut(entry.side, entry.internal)
            .write()
            .levels
            .entry(level)
            .or_insert_with(VecDeque::new)
            .push_front(entry);
    }

    /// Walk the book against `taker`, crossing as much quantity as possible
    /// at resting (maker) prices, honoring dark-pool preference order and
    /// self-trade prevention. Returns (fills, remaining quantity).
    pub fn walk(
        &self,
        taker_account: Uuid,
        taker_side: Side,
        taker_internal: bool,
        limit_price: Option<Decimal>,
        mut remaining: Decimal,
    ) -> (Vec<(BookEntry, Decimal)>, Decimal) {
        let mut fills = Vec::new();
        for book in self.opposite_sides(taker_side, taker_internal) {
            let internal_flag = std::ptr::eq(book, &self.dark_bids) || std::ptr::eq(book, &self.dark_asks);
            while remaining > Decimal::ZERO {
                let Some(mut maker) = self.pop_crossing(
                    taker_side.opposite(),
                    internal_flag,
                    limit_price,
                    taker_account,
                ) else {
                    break;
                };
                let trade_qty = remaining.min(maker.remaining);
                maker.remaining -= trade_qty;
                remaining -= trade_qty;
                self.set_last_trade_price(maker.price);
                let maker_remaining_after = maker.remaining;
                let maker_for_fill = maker.clone();
                if maker_remaining_after > Decimal::ZERO {
                    self.push_front(maker);
                }
                fills.push((maker_for_fill, trade_qty));
            }
            if remaining <= Decimal::ZERO {
                break;
            }
        }
        (fills, remaining)
    }

    /// The `n` best resting orders per side, ordered. `internal` selects the
    /// dark book instead of the lit one.
    pub fn depth(&self, levels: usize, internal: bool) -> BookSnapshot {
        let (bids, asks) = if internal {
            (&self.dark_bids, &self.dark_asks)
        } else {
            (&self.lit_bids, &self.lit_asks)
        };
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: bids.read().depth(levels),
            asks: asks.read().depth(levels),
            last_trade_price: self.last_trade_price(),
        }
    }
}

trait SideExt {
    fn opposite(self) -> Self;
}

impl SideExt for Side {
    fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(order_id: Uuid, account_id: Uuid, side: Side, price: Decimal, qty: Decimal, ts: i64) -> BookEntry {
        BookEntry {
            order_id,
            account_id,
            side,
            price,
            remaining: qty,
            timestamp_millis: ts,
            internal: false,
        }
    }

    #[test]
    fn price_level_round_trips() {
        let price = dec!(97500.50);
        assert_eq!(PriceLevel::from_decimal(price).to_decimal(), price);
    }

    #[test]
    fn resting_order_ids_reflects_index() {
        let book = SymbolBook::new("AAPL");
        let id = Uuid::new_v4();
        book.insert(entry(id, Uuid::new_v4(), Side::Buy, dec!(100), dec!(10), 1));
        assert_eq!(book.resting_order_ids(), vec![id]);
        book.cancel(id);
        assert!(book.resting_order_ids().is_empty());
    }

    #[test]
    fn insert_and_cancel() {
        let book = SymbolBook::new("AAPL");
        let id = Uuid::new_v4();
        book.insert(entry(id, Uuid::new_v4(), Side::Buy, dec!(100), dec!(10), 1));
        assert!(book.has_order(id));
        assert!(book.cancel(id).is_some());
        assert!(!book.has_order(id));
    }

    #[test]
    fn walk_matches_best_price_first() {
        let book = SymbolBook::new("AAPL");
        let maker_low = Uuid::new_v4();
        let maker_high = Uuid::new_v4();
        book.insert(entry(maker_low, Uuid::new_v4(), Side::Sell, dec!(100), dec!(5), 1));
        book.insert(entry(maker_high, Uuid::new_v4(), Side::Sell, dec!(101), dec!(5), 2));

        let (fills, remaining) = book.walk(Uuid::new_v4(), Side::Buy, false, Some(dec!(101)), dec!(7));
        assert_eq!(remaining, dec!(0));
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].0.order_id, maker_low);
        assert_eq!(fills[0].1, dec!(5));
        assert_eq!(fills[1].0.order_id, maker_high);
        assert_eq!(fills[1].1, dec!(2));
    }

    #[test]
    fn self_trade_is_skipped() {
        let book = SymbolBook::new("AAPL");
        let account = Uuid::new_v4();
        let own_maker = Uuid::new_v4();
        let other_maker = Uuid::new_v4();
        book.insert(entry(own_maker, account, Side::Sell, dec!(100), dec!(5), 1));
        book.insert(entry(other_maker, Uuid::new_v4(), Side::Sell, dec!(100), dec!(5), 2));

        let (fills, remaining) = book.walk(account, Side::Buy, false, Some(dec!(100)), dec!(5));
        assert_eq!(remaining, dec!(0));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].0.order_id, other_maker);
        assert!(book.has_order(own_maker));
    }

    #[test]
    fn self_trade_falls_through_to_next_level_when_best_level_is_all_self() {
        let book = SymbolBook::new("AAPL");
        let account_x = Uuid::new_v4();
        let account_y = Uuid::new_v4();
        let x_maker = Uuid::new_v4();
        let y_maker = Uuid::new_v4();
        book.insert(entry(x_maker, account_x, Side::Sell, dec!(100), dec!(10), 1));
        book.insert(entry(y_maker, account_y, Side::Sell, dec!(101), dec!(10), 2));

        let (fills, remaining) = book.walk(account_x, Side::Buy, false, None, dec!(10));
        assert_eq!(remaining, dec!(0));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].0.order_id, y_maker);
        assert_eq!(fills[0].1, dec!(10));
        assert!(book.has_order(x_maker));
    }
}
