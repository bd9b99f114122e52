//! Route handlers for both services.

pub mod cart;
pub mod inventory;
pub mod ops;
pub mod orders;
