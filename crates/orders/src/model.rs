//! Cart lines, orders and their line items.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// One product in a user's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Only checked lines are purchased at checkout.
    pub checked: bool,
}

/// Lifecycle status of an order.
///
/// ```text
/// Paying ──► WaitBuyerPay ──► TradeSuccess ──► TradeFinished
///    │             │
///    └─────────────┴──► TradeClosed
/// ```
///
/// Transitions after creation are driven by payment and shipment events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, payment not yet started.
    #[default]
    Paying,
    /// Waiting for the buyer to complete payment.
    WaitBuyerPay,
    /// Paid.
    TradeSuccess,
    /// Closed before payment, e.g. cancelled or expired.
    TradeClosed,
    /// Paid and fulfilled.
    TradeFinished,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Paying,
        OrderStatus::WaitBuyerPay,
        OrderStatus::TradeSuccess,
        OrderStatus::TradeClosed,
        OrderStatus::TradeFinished,
    ];

    /// Returns true while the order still holds reserved stock and no payment.
    pub fn is_unpaid(&self) -> bool {
        matches!(self, OrderStatus::Paying | OrderStatus::WaitBuyerPay)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paying => "PAYING",
            OrderStatus::WaitBuyerPay => "WAIT_BUYER_PAY",
            OrderStatus::TradeSuccess => "TRADE_SUCCESS",
            OrderStatus::TradeClosed => "TRADE_CLOSED",
            OrderStatus::TradeFinished => "TRADE_FINISHED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status '{s}'"))
    }
}

/// Where and to whom an order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    #[serde(default)]
    pub note: String,
}

/// A purchased product with its name and price as they were at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_image: String,
    pub unit_price: Money,
    pub quantity: i32,
}

impl OrderLine {
    pub fn subtotal(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Order header as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub total: Money,
    pub status: OrderStatus,
    pub shipping: ShippingInfo,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to persist a new order in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderDraft {
    /// Cart lines the placement consumes.
    pub fn purchased_products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.lines.iter().map(|line| line.product_id)
    }
}

/// An order together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
        assert!("PAID".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_unpaid_states() {
        assert_eq!(OrderStatus::default(), OrderStatus::Paying);
        assert!(OrderStatus::Paying.is_unpaid());
        assert!(OrderStatus::WaitBuyerPay.is_unpaid());
        assert!(!OrderStatus::TradeSuccess.is_unpaid());
    }

    #[test]
    fn test_line_subtotal() {
        let line = OrderLine {
            product_id: ProductId::new(1),
            product_name: "Widget".to_string(),
            product_image: String::new(),
            unit_price: Money::from_cents(1250),
            quantity: 2,
        };
        assert_eq!(line.subtotal(), Money::from_cents(2500));
    }
}
