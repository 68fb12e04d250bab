//! Key namespace for the state store.

pub struct StoreKey;

impl StoreKey {
    pub fn account(id: &str) -> String {
        format!("account:{id}")
    }

    pub fn accounts_index() -> String {
        "accounts:index".to_string()
    }

    pub fn position(account_id: &str, symbol: &str) -> String {
        format!("position:{account_id}:{symbol}")
    }

    pub fn order(id: &str) -> String {
        format!("order:{id}")
    }

    pub fn account_orders(account_id: &str) -> String {
        format!("account:{account_id}:orders")
    }

    pub fn symbol_orders(symbol: &str) -> String {
        format!("symbol:{symbol}:orders")
    }

    /// Global index of every order id, used for account-joined listings and
    /// the risk-alert feed.
    pub fn orders_index() -> String {
        "orders:index".to_string()
    }

    pub fn transactions(account_id: &str) -> String {
        format!("account:{account_id}:transactions")
    }

    pub fn trades(symbol: &str) -> String {
        format!("symbol:{symbol}:trades")
    }

    /// Global system-wide toasts and alerts.
    pub fn channel_notifications() -> String {
        "notifications".to_string()
    }

    /// Toasts and risk alerts scoped to one account.
    pub fn channel_account_notifications(account_id: &str) -> String {
        format!("account:{account_id}:notifications")
    }

    /// Book-depth refresh signal, shared across all symbols.
    pub fn channel_orderbook_updates() -> String {
        "orderbook_updates".to_string()
    }

    /// Order state changes scoped to one account.
    pub fn channel_account_updates(account_id: &str) -> String {
        format!("account:{account_id}:updates")
    }

    /// Trade prints for one symbol.
    pub fn channel_trades(symbol: &str) -> String {
        format!("trades:{symbol}")
    }
}
