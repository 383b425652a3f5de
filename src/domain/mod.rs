mod account;
mod ledger;
mod money;
mod password;
mod transaction;

pub use account::*;
pub use ledger::*;
pub use money::*;
pub use password::*;
pub use transaction::*;
