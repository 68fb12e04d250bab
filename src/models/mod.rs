pub mod account;
pub mod order;
pub mod position;
pub mod trade;
pub mod transaction;

pub use account::*;
pub use order::*;
pub use position::*;
pub use trade::*;
pub use transaction::*;
