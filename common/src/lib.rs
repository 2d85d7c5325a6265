mod accounts;
mod credit;
mod db;
mod error;
pub mod ledger;
pub mod money;
mod schema;
mod settlement;
mod subscriptions;
mod tips;

pub use accounts::LIST_LIMIT;
pub use credit::*;
pub use db::*;
pub use error::*;
pub use schema::*;
pub use settlement::*;
pub use tips::{BetConfirmation, PublishedTip};
