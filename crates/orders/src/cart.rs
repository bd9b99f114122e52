//! Shopping cart storage.

use async_trait::async_trait;
use common::{ProductId, UserId};

use crate::error::StoreError;
use crate::model::CartLine;

/// Per-user candidate purchase lines.
///
/// Lines are unique per `(user, product)`. Only checked lines are bought at
/// checkout, and the order store deletes them in the same transaction that
/// inserts the order.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// All lines of a user's cart.
    async fn list(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError>;

    /// Adds units of a product, merging into an existing line.
    ///
    /// A new line starts unchecked; merging keeps the existing flag.
    async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<CartLine, StoreError>;

    /// Sets the checked flag and, when `quantity` is positive, the quantity.
    async fn update(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Option<i32>,
        checked: bool,
    ) -> Result<CartLine, StoreError>;

    /// Deletes a line. Fails with `CartLineNotFound` when absent.
    async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<(), StoreError>;

    /// The lines that would be purchased at checkout.
    async fn checked_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, StoreError>;
}

/// Most units of one product a cart line may hold. Merging adds stops here.
pub const MAX_CART_QUANTITY: i32 = 9_999;

/// Accepts quantities in `1..=MAX_CART_QUANTITY`.
pub(crate) fn validate_add_quantity(
    product_id: ProductId,
    quantity: i32,
) -> Result<(), StoreError> {
    if !(1..=MAX_CART_QUANTITY).contains(&quantity) {
        return Err(StoreError::InvalidQuantity {
            product_id,
            quantity,
        });
    }
    Ok(())
}

/// Quantity after merging an add into an existing line.
pub(crate) fn merged_quantity(current: i32, added: i32) -> i32 {
    current.saturating_add(added).min(MAX_CART_QUANTITY)
}

/// Quantity to store after an update request; `None` keeps the current one.
///
/// Positive requests above [`MAX_CART_QUANTITY`] are refused.
pub(crate) fn updated_quantity(
    product_id: ProductId,
    current: i32,
    requested: Option<i32>,
) -> Result<i32, StoreError> {
    match requested {
        Some(quantity) if quantity > MAX_CART_QUANTITY => Err(StoreError::InvalidQuantity {
            product_id,
            quantity,
        }),
        Some(quantity) if quantity > 0 => Ok(quantity),
        _ => Ok(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEN: ProductId = ProductId::new(1);

    #[test]
    fn test_update_ignores_non_positive_quantity() {
        assert_eq!(updated_quantity(PEN, 3, Some(5)).unwrap(), 5);
        assert_eq!(updated_quantity(PEN, 3, Some(0)).unwrap(), 3);
        assert_eq!(updated_quantity(PEN, 3, Some(-2)).unwrap(), 3);
        assert_eq!(updated_quantity(PEN, 3, None).unwrap(), 3);
    }

    #[test]
    fn test_update_refuses_quantity_above_cap() {
        assert_eq!(
            updated_quantity(PEN, 3, Some(MAX_CART_QUANTITY)).unwrap(),
            MAX_CART_QUANTITY
        );
        assert!(matches!(
            updated_quantity(PEN, 3, Some(MAX_CART_QUANTITY + 1)),
            Err(StoreError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_add_requires_quantity_within_bounds() {
        assert!(validate_add_quantity(PEN, 1).is_ok());
        assert!(validate_add_quantity(PEN, MAX_CART_QUANTITY).is_ok());
        assert!(matches!(
            validate_add_quantity(PEN, 0),
            Err(StoreError::InvalidQuantity { quantity: 0, .. })
        ));
        assert!(matches!(
            validate_add_quantity(PEN, i32::MAX),
            Err(StoreError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_merge_stops_at_cap() {
        assert_eq!(merged_quantity(2, 3), 5);
        assert_eq!(merged_quantity(MAX_CART_QUANTITY - 1, 5), MAX_CART_QUANTITY);
    }
}
