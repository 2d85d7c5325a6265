mod bet;
mod subscription;
mod tip;
mod transaction;
mod users;
mod wallet;

pub use bet::*;
pub use subscription::*;
pub use tip::*;
pub use transaction::*;
pub use users::*;
pub use wallet::*;
