pub mod models;
pub mod repository;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use repository::PgLedger;
pub use store::{run_in_transaction, OrderStore};
