//! The timed assessment session engine.

pub mod controller;
pub mod error;
pub mod ledger;
pub mod persister;
pub mod scorer;
pub mod timer;

pub use controller::{SessionContext, SessionController};
pub use error::SessionError;
pub use persister::{ResultPersister, ResultStore};
