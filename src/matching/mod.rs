//! Matching Engine (C5): continuous price-time matching across lit and dark
//! books, built on top of the Risk Gate, Order Book, and Account Ledger.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::events::{EventBus, EventRecord};
use crate::ledger::Ledger;
use crate::models::{Order, OrderStatus, OrderType, Side, TimeInForce, Trade};
use crate::orderbook::{BookEntry, BookSnapshot, SymbolBook};
use crate::risk::{self, RiskContext};
use crate::store::Store;

pub struct MatchingEngine {
    store: Arc<dyn Store>,
    ledger: Arc<Ledger>,
    config: Arc<AppConfig>,
    events: Arc<EventBus>,
    books: DashMap<String, Arc<SymbolBook>>,
    disabled_symbols: parking_lot::RwLock<Vec<String>>,
}

pub struct SubmitOutcome {
    pub order: Order,
    pub trades: Vec<Trade>,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn Store>, ledger: Arc<Ledger>, config: Arc<AppConfig>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            ledger,
            config,
            events,
            books: DashMap::new(),
            disabled_symbols: parking_lot::RwLock::new(Vec::new()),
        }
    }

    fn book(&self, symbol: &str) -> Arc<SymbolBook> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(SymbolBook::new(symbol)))
            .clone()
    }

    pub async fn disable_symbol(&self, symbol: &str) {
        self.disabled_symbols.write().push(symbol.to_string());
        self.events
            .publish(EventRecord::system_notice(&format!("trading halted for {symbol}")))
            .await;
    }

    pub fn depth(&self, symbol: &str, levels: usize, internal: bool) -> BookSnapshot {
        self.book(symbol).depth(levels, internal)
    }

    /// Validate, risk-check, and submit an order. Runs the full continuous
    /// match immediately (IOC/FOK orders never rest; GTC/Day orders rest
    /// whatever remains unfilled).
    pub async fn submit(&self, mut order: Order) -> Result<SubmitOutcome, EngineError> {
        let account = self.ledger.get_account(order.account_id).await?;
        let position = self.ledger.get_position(order.account_id, &order.symbol).await.ok();
        let book = self.book(&order.symbol);
        let last_trade_price = book.last_trade_price();
        let disabled = self.disabled_symbols.read().clone();

        let ctx = RiskContext {
            account: &account,
            disabled_symbols: &disabled,
            last_trade_price,
            position: position.as_ref(),
            config: &self.config,
        };
        if let Err(rejection) = risk::evaluate(&order, &ctx) {
            order.status = OrderStatus::Rejected;
            order.reject_reason = Some(rejection.message().to_string());
            order.closed_at = Some(chrono::Utc::now());
            self.store.put_order(&order).await.map_err(EngineError::from)?;
            self.events
                .publish(EventRecord::order_rejected(&order, rejection.message()))
                .await;
            return Ok(SubmitOutcome { order, trades: vec![] });
        }

        match order.order_type {
            OrderType::Market => self.match_market_order(order, &book).await,
            OrderType::Limit => self.match_limit_order(order, &book).await,
        }
    }

    async fn match_limit_order(&self, mut order: Order, book: &Arc<SymbolBook>) -> Result<SubmitOutcome, EngineError> {
        let limit = order.price;
        let trades = self.cross(&mut order, book, limit).await?;

        match order.time_in_force {
            TimeInForce::Fok => {
                // All-or-nothing: if the immediate pass didn't fully fill,
                // undo by crediting back whatever matched and reject.
                if order.remaining_quantity() > Decimal::ZERO {
                    self.unwind_fok(&order, &trades, book).await?;
                    let reason = "fill-or-kill could not fill completely";
                    order.status = OrderStatus::Rejected;
                    order.filled_quantity = Decimal::ZERO;
                    order.execution_price = None;
                    order.reject_reason = Some(reason.to_string());
                    order.closed_at = Some(chrono::Utc::now());
                    self.store.put_order(&order).await.map_err(EngineError::from)?;
                    self.events.publish(EventRecord::order_rejected(&order, reason)).await;
                    return Ok(SubmitOutcome { order, trades: vec![] });
                }
                order.status = OrderStatus::Filled;
                order.closed_at = Some(chrono::Utc::now());
            }
            TimeInForce::Ioc => {
                order.status = if order.filled_quantity > Decimal::ZERO {
                    if order.remaining_quantity() > Decimal::ZERO {
                        OrderStatus::PartiallyFilled
                    } else {
                        OrderStatus::Filled
                    }
                } else {
                    OrderStatus::Cancelled
                };
                // Any unfilled remainder never rests.
                if order.is_terminal() {
                    order.closed_at = Some(chrono::Utc::now());
                }
            }
            TimeInForce::Gtc | TimeInForce::Day => {
                if order.remaining_quantity() > Decimal::ZERO {
                    order.status = if order.filled_quantity > Decimal::ZERO {
                        OrderStatus::PartiallyFilled
                    } else {
                        OrderStatus::Open
                    };
                    book.insert(BookEntry::from(&order));
                } else {
                    order.status = OrderStatus::Filled;
                    order.closed_at = Some(chrono::Utc::now());
                }
            }
        }

        self.store.put_order(&order).await.map_err(EngineError::from)?;
        self.events.publish(EventRecord::order_updated(&order)).await;
        if !trades.is_empty() {
            self.record_trades_matched(&trades);
            self.events.publish(EventRecord::orderbook_refresh(&order.symbol)).await;
        }
        Ok(SubmitOutcome { order, trades })
    }

    /// Market orders never rest at a price, so any shortfall can't be parked
    /// in the book. Instead it goes `pending`: the continuous driver retries
    /// it against fresh liquidity on a later cycle (§4.5).
    async fn match_market_order(&self, mut order: Order, book: &Arc<SymbolBook>) -> Result<SubmitOutcome, EngineError> {
        let trades = self.cross(&mut order, book, None).await?;
        order.status = if order.remaining_quantity() > Decimal::ZERO {
            OrderStatus::Pending
        } else {
            order.closed_at = Some(chrono::Utc::now());
            OrderStatus::Filled
        };
        self.store.put_order(&order).await.map_err(EngineError::from)?;
        self.events.publish(EventRecord::order_updated(&order)).await;
        if !trades.is_empty() {
            self.record_trades_matched(&trades);
            self.events.publish(EventRecord::orderbook_refresh(&order.symbol)).await;
        }
        Ok(SubmitOutcome { order, trades })
    }

    fn record_trades_matched(&self, trades: &[Trade]) {
        for trade in trades {
            crate::metrics::record_order_matched(if trade.internal { "dark" } else { "lit" });
        }
    }

    /// Walk the opposing book against `order`, settling each fill through
    /// the ledger and stamping `order.filled_quantity` as it goes. VWAP for
    /// a market order falls out naturally: each fill at the resting price.
    async fn cross(
        &self,
        order: &mut Order,
        book: &Arc<SymbolBook>,
        limit_price: Option<Decimal>,
    ) -> Result<Vec<Trade>, EngineError> {
        let prior_filled = order.filled_quantity;
        let remaining = order.remaining_quantity();
        let (fills, left) = book.walk(order.account_id, order.side, order.internal, limit_price, remaining);

        let mut trades = Vec::with_capacity(fills.len());
        let mut fill_notional = Decimal::ZERO;
        let mut fill_quantity = Decimal::ZERO;
        for (maker, quantity) in fills {
            let trade = self.build_trade(order, &maker, quantity);
            self.ledger.settle_trade(&trade).await?;
            self.mark_maker_filled(&maker, quantity).await?;
            self.events.publish(EventRecord::trade_executed(&trade)).await;
            fill_notional += trade.price * trade.quantity;
            fill_quantity += trade.quantity;
            trades.push(trade);
        }
        if fill_quantity > Decimal::ZERO {
            let prior_notional = order.execution_price.unwrap_or(Decimal::ZERO) * prior_filled;
            order.execution_price = Some((prior_notional + fill_notional) / (prior_filled + fill_quantity));
        }
        order.filled_quantity = prior_filled + (remaining - left);
        order.updated_at = chrono::Utc::now();
        Ok(trades)
    }

    fn build_trade(&self, taker: &Order, maker: &BookEntry, quantity: Decimal) -> Trade {
        let (maker_account_id, taker_account_id) = (maker.account_id, taker.account_id);
        Trade {
            id: Uuid::new_v4(),
            symbol: taker.symbol.clone(),
            maker_order_id: maker.order_id,
            taker_order_id: taker.id,
            maker_account_id,
            taker_account_id,
            price: maker.price,
            quantity,
            taker_side: taker.side,
            internal: maker.internal && taker.internal,
            executed_at: chrono::Utc::now(),
        }
    }

    async fn mark_maker_filled(&self, maker: &BookEntry, quantity: Decimal) -> Result<(), EngineError> {
        if let Some(mut resting) = self.store.get_order(maker.order_id).await.map_err(EngineError::from)? {
            resting.filled_quantity += quantity;
            resting.status = if resting.remaining_quantity() > Decimal::ZERO {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Filled
            };
            resting.updated_at = chrono::Utc::now();
            self.store.put_order(&resting).await.map_err(EngineError::from)?;
        }
        Ok(())
    }

    /// Reverse a fill-or-kill order's partial matches: the maker side never
    /// actually lost priority (FOK only rejects the taker), so the trades
    /// already settled must be economically undone before rejecting.
    async fn unwind_fok(&self, order: &Order, trades: &[Trade], book: &Arc<SymbolBook>) -> Result<(), EngineError> {
        for trade in trades {
            let reversal = Trade {
                id: Uuid::new_v4(),
                symbol: trade.symbol.clone(),
                maker_order_id: trade.taker_order_id,
                taker_order_id: trade.maker_order_id,
                maker_account_id: trade.taker_account_id,
                taker_account_id: trade.maker_account_id,
                price: trade.price,
                quantity: trade.quantity,
                taker_side: match trade.taker_side {
                    Side::Buy => Side::Sell,
                    Side::Sell => Side::Buy,
                },
                internal: trade.internal,
                executed_at: chrono::Utc::now(),
            };
            self.ledger.settle_trade(&reversal).await?;
            if let Some(mut maker_order) = self.store.get_order(trade.maker_order_id).await.map_err(EngineError::from)? {
                maker_order.filled_quantity -= trade.quantity;
                maker_order.status = OrderStatus::Open;
                maker_order.updated_at = chrono::Utc::now();
                self.store.put_order(&maker_order).await.map_err(EngineError::from)?;
                book.insert(BookEntry::from(&maker_order));
            }
        }
        let _ = order;
        Ok(())
    }

    pub async fn cancel(&self, order_id: Uuid, requester: Uuid) -> Result<Order, EngineError> {
        let mut order = self
            .store
            .get_order(order_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;
        if order.account_id != requester {
            return Err(EngineError::Unauthorized("order belongs to another account".to_string()));
        }
        let book = self.book(&order.symbol);
        if book.cancel(order_id).is_none() {
            return Err(EngineError::Conflict("order is not resting".to_string()));
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = chrono::Utc::now();
        order.closed_at = Some(order.updated_at);
        self.store.put_order(&order).await.map_err(EngineError::from)?;
        self.events.publish(EventRecord::order_updated(&order)).await;
        self.events.publish(EventRecord::orderbook_refresh(&order.symbol)).await;
        Ok(order)
    }

    /// Edit price and/or quantity on a resting order. Per the chosen
    /// semantics, editing to the same price is a no-op stamp of `edited`
    /// that does not re-trigger matching; any other price, or a quantity
    /// increase, loses time priority and re-enters the book at the back.
    pub async fn edit(
        &self,
        order_id: Uuid,
        requester: Uuid,
        new_price: Option<Decimal>,
        new_quantity: Option<Decimal>,
    ) -> Result<SubmitOutcome, EngineError> {
        let mut order = self
            .store
            .get_order(order_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;
        if order.account_id != requester {
            return Err(EngineError::Unauthorized("order belongs to another account".to_string()));
        }
        if !order.is_resting() {
            return Err(EngineError::Conflict("order is not resting".to_string()));
        }
        let book = self.book(&order.symbol);
        let price_unchanged = new_price.map(|p| Some(p) == order.price).unwrap_or(true);
        let quantity_unchanged = new_quantity.map(|q| q == order.quantity).unwrap_or(true);

        if let Some(price) = new_price {
            order.price = Some(price);
        }
        if let Some(quantity) = new_quantity {
            order.quantity = quantity;
        }
        order.edited = true;
        order.updated_at = chrono::Utc::now();

        if price_unchanged && quantity_unchanged {
            self.store.put_order(&order).await.map_err(EngineError::from)?;
            return Ok(SubmitOutcome { order, trades: vec![] });
        }

        book.cancel(order_id);
        let remaining = order.remaining_quantity();
        if remaining <= Decimal::ZERO {
            order.status = OrderStatus::Cancelled;
            order.closed_at = Some(order.updated_at);
            self.store.put_order(&order).await.map_err(EngineError::from)?;
            return Ok(SubmitOutcome { order, trades: vec![] });
        }
        book.insert(BookEntry::from(&order));
        let cross_price = order.price;
        let trades = self.cross(&mut order, &book, cross_price).await?;
        order.status = if order.remaining_quantity() > Decimal::ZERO {
            book.cancel(order.id);
            if order.remaining_quantity() < remaining {
                book.insert(BookEntry::from(&order));
            }
            if order.filled_quantity > Decimal::ZERO {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            }
        } else {
            book.cancel(order.id);
            order.closed_at = Some(chrono::Utc::now());
            OrderStatus::Filled
        };
        self.store.put_order(&order).await.map_err(EngineError::from)?;
        self.events.publish(EventRecord::order_updated(&order)).await;
        if !trades.is_empty() {
            self.record_trades_matched(&trades);
            self.events.publish(EventRecord::orderbook_refresh(&order.symbol)).await;
        }
        Ok(SubmitOutcome { order, trades })
    }

    /// Every symbol with a live book, lit or dark.
    fn symbols(&self) -> Vec<String> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Re-attempt every `pending` market order resting for `symbol`: a
    /// market order finds no (or insufficient) liquidity on submission goes
    /// `pending` rather than cancelled, and is retried here as new resting
    /// liquidity arrives. Limit orders never need this path — they cross
    /// synchronously in full on `submit`, so the book can never be left
    /// crossed between two resting orders.
    pub async fn match_symbol(&self, symbol: &str) -> Result<(), EngineError> {
        let book = self.book(symbol);
        let candidates = self
            .store
            .list_orders_by_symbol(symbol)
            .await
            .map_err(EngineError::from)?;

        for mut order in candidates.into_iter().filter(|o| o.status == OrderStatus::Pending) {
            let trades = self.cross(&mut order, &book, None).await?;
            order.status = if order.remaining_quantity() > Decimal::ZERO {
                OrderStatus::Pending
            } else {
                order.closed_at = Some(chrono::Utc::now());
                OrderStatus::Filled
            };
            self.store.put_order(&order).await.map_err(EngineError::from)?;
            self.events.publish(EventRecord::order_updated(&order)).await;
            if !trades.is_empty() {
                self.record_trades_matched(&trades);
                self.events.publish(EventRecord::orderbook_refresh(symbol)).await;
            }
        }
        Ok(())
    }

    /// Reconcile each book's resting entries against the store: an entry
    /// whose order is missing or has already reached a terminal status (a
    /// crash between the book mutation and the order write is the only way
    /// this can happen) is evicted so it can't strand liquidity or falsely
    /// report depth.
    async fn cleanup_sweep(&self) {
        for symbol in self.symbols() {
            let book = self.book(&symbol);
            for order_id in book.resting_order_ids() {
                let stored = self.store.get_order(order_id).await.ok().flatten();
                let stale = match &stored {
                    None => true,
                    Some(order) => order.is_terminal(),
                };
                if stale {
                    book.cancel(order_id);
                    tracing::debug!(%symbol, %order_id, "cleanup sweep evicted stale book entry");
                    if let Some(order) = stored {
                        self.events
                            .publish(EventRecord::orders_updated(order.account_id, "cleanup sweep"))
                            .await;
                    }
                }
            }
        }
    }

    /// Continuous driver (§4.5): sweep stale book entries, then retry
    /// pending market orders for every known symbol, on a fixed cycle. Runs
    /// until the process exits.
    pub async fn run(&self, cycle_interval: std::time::Duration) {
        loop {
            self.cleanup_sweep().await;
            for symbol in self.symbols() {
                if let Err(err) = self.match_symbol(&symbol).await {
                    tracing::warn!(%symbol, error = %err, "match_symbol cycle failed");
                }
            }
            tokio::time::sleep(cycle_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::ledger::Ledger;
    use crate::models::{Account, AccountType, OrderType, TimeInForce};
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    async fn engine() -> (MatchingEngine, Account, Account) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ledger = Arc::new(Ledger::new(store.clone()));
        let config = Arc::new(AppConfig::default());
        let events = Arc::new(EventBus::new());
        let buyer = Account::new("buyer", AccountType::Individual, dec!(1_000_000));
        let seller = Account::new("seller", AccountType::Individual, dec!(1_000_000));
        ledger.create_account(buyer.clone()).await.unwrap();
        ledger.create_account(seller.clone()).await.unwrap();
        // Risk check 8 disallows naked shorts, so the seller fixture needs
        // standing inventory before it can rest or cross any sell order.
        store
            .put_position(&crate::models::Position {
                account_id: seller.id,
                symbol: "AAPL".to_string(),
                quantity: dec!(1_000),
                avg_cost: Decimal::ZERO,
            })
            .await
            .unwrap();
        (MatchingEngine::new(store, ledger, config, events), buyer, seller)
    }

    fn limit_order(account_id: Uuid, side: Side, price: Decimal, quantity: Decimal) -> Order {
        Order {
            id: Uuid::new_v4(),
            account_id,
            symbol: "AAPL".to_string(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
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

    #[tokio::test]
    async fn crossing_orders_produce_a_trade() {
        let (engine, buyer, seller) = engine().await;
        engine
            .submit(limit_order(seller.id, Side::Sell, dec!(100), dec!(10)))
            .await
            .unwrap();
        let outcome = engine
            .submit(limit_order(buyer.id, Side::Buy, dec!(100), dec!(10)))
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Filled);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].price, dec!(100));
    }

    #[tokio::test]
    async fn ioc_does_not_rest() {
        let (engine, buyer, _seller) = engine().await;
        let mut order = limit_order(buyer.id, Side::Buy, dec!(100), dec!(10));
        order.time_in_force = TimeInForce::Ioc;
        let outcome = engine.submit(order).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Cancelled);
        assert!(!engine.book("AAPL").has_order(outcome.order.id));
    }

    #[tokio::test]
    async fn market_order_with_no_liquidity_goes_pending_and_resumes() {
        let (engine, buyer, seller) = engine().await;
        let mut order = limit_order(buyer.id, Side::Buy, dec!(100), dec!(10));
        order.order_type = OrderType::Market;
        order.price = None;
        let outcome = engine.submit(order).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Pending);
        assert!(outcome.trades.is_empty());

        engine
            .submit(limit_order(seller.id, Side::Sell, dec!(100), dec!(10)))
            .await
            .unwrap();
        engine.match_symbol("AAPL").await.unwrap();

        let resumed = engine.store.get_order(outcome.order.id).await.unwrap().unwrap();
        assert_eq!(resumed.status, OrderStatus::Filled);
        assert_eq!(resumed.execution_price, Some(dec!(100)));
        assert!(resumed.closed_at.is_some());
    }

    #[tokio::test]
    async fn execution_price_is_the_volume_weighted_average_fill() {
        let (engine, buyer, seller) = engine().await;
        engine
            .submit(limit_order(seller.id, Side::Sell, dec!(100), dec!(5)))
            .await
            .unwrap();
        engine
            .submit(limit_order(seller.id, Side::Sell, dec!(102), dec!(5)))
            .await
            .unwrap();
        let outcome = engine
            .submit(limit_order(buyer.id, Side::Buy, dec!(102), dec!(10)))
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Filled);
        assert_eq!(outcome.order.execution_price, Some(dec!(101)));
    }

    #[tokio::test]
    async fn cleanup_sweep_evicts_entries_for_terminal_orders() {
        let (engine, _buyer, seller) = engine().await;
        let order = limit_order(seller.id, Side::Sell, dec!(100), dec!(10));
        let order_id = order.id;
        engine.submit(order).await.unwrap();
        assert!(engine.book("AAPL").has_order(order_id));

        let mut stored = engine.store.get_order(order_id).await.unwrap().unwrap();
        stored.status = OrderStatus::Cancelled;
        engine.store.put_order(&stored).await.unwrap();

        engine.cleanup_sweep().await;
        assert!(!engine.book("AAPL").has_order(order_id));
    }

    #[tokio::test]
    async fn fok_rejects_when_not_fully_fillable() {
        let (engine, buyer, seller) = engine().await;
        engine
            .submit(limit_order(seller.id, Side::Sell, dec!(100), dec!(5)))
            .await
            .unwrap();
        let mut order = limit_order(buyer.id, Side::Buy, dec!(100), dec!(10));
        order.time_in_force = TimeInForce::Fok;
        let outcome = engine.submit(order).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Rejected);
        assert!(outcome.trades.is_empty());
        let seller_position = engine.ledger.get_position(seller.id, "AAPL").await.unwrap();
        assert_eq!(seller_position.quantity, dec!(1_000));
    }
}
