//! Types shared by the inventory and order services.

mod money;
mod page;
mod types;

pub use money::Money;
pub use page::{Page, PageRequest};
pub use types::{OrderId, ProductId, UserId};
