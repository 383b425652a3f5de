// Application layer: the ledger core and the auth gateway in front of it.

pub mod auth;
pub mod error;
pub mod ledger;

pub use auth::*;
pub use error::*;
pub use ledger::*;
