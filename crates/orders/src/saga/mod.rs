//! The checkout saga: cart → catalog → inventory → order store.
//!
//! There is no transaction spanning the inventory ledger and the order store,
//! so the saga orders its steps and defines one compensating action: once
//! stock is reserved, any failure to persist the order releases it again.

mod expiry;
mod orchestrator;
mod state;

pub use expiry::spawn_expiry_worker;
pub use orchestrator::{CheckoutSettings, OrderOrchestrator, PlacedOrder};
pub use state::CheckoutStep;
