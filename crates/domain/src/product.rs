//! Catalog products and their stock rules.

use chrono::{DateTime, Utc};
use common::{CategoryId, Money, ProductId, Version};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, required_text};

/// Default reorder threshold for new products.
pub const DEFAULT_MIN_STOCK_LEVEL: i64 = 10;

/// Stock-keeping unit: trimmed, upper-cased, 3-100 characters of
/// `A-Z`, `0-9`, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let sku = value.trim().to_ascii_uppercase();
        let valid_chars = sku
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !(3..=100).contains(&sku.len()) || !valid_chars {
            return Err(DomainError::validation(
                "SKU must be 3-100 characters of A-Z, 0-9, '-' and '_'",
            ));
        }
        Ok(Self(sku))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sku {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self {
        sku.0
    }
}

/// Every field of a product, used to build or restore one.
#[derive(Debug, Clone)]
pub struct ProductParts {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub sku: Sku,
    pub category_id: Option<CategoryId>,
    pub price: Money,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

/// A sellable catalog item.
///
/// Stock and reorder level never go negative: direct writes clamp at zero
/// and decreases beyond the available stock fail with
/// [`DomainError::InsufficientStock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub sku: Sku,
    pub category_id: Option<CategoryId>,
    pub price: Money,
    stock_quantity: i64,
    min_stock_level: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl Product {
    /// Builds a product, clamping stock fields at zero.
    pub fn from_parts(parts: ProductParts) -> Self {
        Self {
            id: parts.id,
            name: parts.name,
            description: parts.description,
            sku: parts.sku,
            category_id: parts.category_id,
            price: parts.price,
            stock_quantity: parts.stock_quantity.max(0),
            min_stock_level: parts.min_stock_level.max(0),
            is_active: parts.is_active,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        }
    }

    pub fn validate_name(name: &str) -> Result<String, DomainError> {
        required_text("Product name", name, 2, 255)
    }

    /// Prices must be strictly positive.
    pub fn validate_price(price: Money) -> Result<Money, DomainError> {
        if !price.is_positive() {
            return Err(DomainError::validation("Price must be greater than zero"));
        }
        Ok(price)
    }

    pub fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    pub fn min_stock_level(&self) -> i64 {
        self.min_stock_level
    }

    /// Overwrites the stock level, clamping at zero.
    pub fn set_stock_quantity(&mut self, quantity: i64) {
        self.stock_quantity = quantity.max(0);
        self.touch();
    }

    pub fn set_min_stock_level(&mut self, level: i64) {
        self.min_stock_level = level.max(0);
        self.touch();
    }

    /// Active and with at least one unit in stock.
    pub fn is_available(&self) -> bool {
        self.is_active && self.stock_quantity > 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.min_stock_level
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.stock_quantity == 0
    }

    /// Whether `quantity` units could be taken out right now.
    pub fn can_fulfill_quantity(&self, quantity: i64) -> bool {
        quantity > 0 && quantity <= self.stock_quantity
    }

    pub fn increase_stock(&mut self, quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity {
                quantity,
                reason: "stock increase must be positive",
            });
        }
        self.stock_quantity = self
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("Stock quantity overflow"))?;
        self.touch();
        Ok(())
    }

    /// Removes `quantity` units. Stock is left untouched on failure.
    pub fn decrease_stock(&mut self, quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity {
                quantity,
                reason: "stock decrease must be positive",
            });
        }
        if quantity > self.stock_quantity {
            return Err(DomainError::InsufficientStock {
                sku: self.sku.to_string(),
                requested: quantity,
                available: self.stock_quantity,
            });
        }
        self.stock_quantity -= quantity;
        self.touch();
        Ok(())
    }

    /// Applies a signed stock change: positive increases, negative decreases.
    pub fn apply_stock_delta(&mut self, delta: i64) -> Result<(), DomainError> {
        match delta {
            0 => Err(DomainError::InvalidQuantity {
                quantity: 0,
                reason: "stock change cannot be zero",
            }),
            d if d > 0 => self.increase_stock(d),
            d => self.decrease_stock(d.checked_neg().unwrap_or(i64::MAX)),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Currency;
    use proptest::prelude::*;

    fn product(stock: i64, min: i64) -> Product {
        Product::from_parts(ProductParts {
            id: ProductId::new(),
            name: "Laptop Pro 15".into(),
            description: None,
            sku: Sku::parse("LP-15-001").unwrap(),
            category_id: None,
            price: Money::from_minor_units(129_999, Currency::EUR),
            stock_quantity: stock,
            min_stock_level: min,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        })
    }

    #[test]
    fn sku_is_normalised() {
        assert_eq!(Sku::parse("  lp-15_001 ").unwrap().as_str(), "LP-15_001");
        assert!(Sku::parse("ab").is_err());
        assert!(Sku::parse("LP 15").is_err());
        assert!(Sku::parse("LP.15").is_err());
    }

    #[test]
    fn from_parts_clamps_negative_stock() {
        let p = product(-5, -1);
        assert_eq!(p.stock_quantity(), 0);
        assert_eq!(p.min_stock_level(), 0);
    }

    #[test]
    fn increase_stock_rejects_non_positive() {
        let mut p = product(5, 1);
        assert!(matches!(
            p.increase_stock(0),
            Err(DomainError::InvalidQuantity { .. })
        ));
        assert!(p.increase_stock(-3).is_err());
        p.increase_stock(3).unwrap();
        assert_eq!(p.stock_quantity(), 8);
        assert!(p.updated_at.is_some());
    }

    #[test]
    fn decrease_to_zero_makes_unavailable() {
        let mut p = product(2, 1);
        assert!(p.is_available());
        p.decrease_stock(2).unwrap();
        assert_eq!(p.stock_quantity(), 0);
        assert!(!p.is_available());
        assert!(p.is_out_of_stock());
    }

    #[test]
    fn inactive_product_is_unavailable() {
        let mut p = product(10, 1);
        p.is_active = false;
        assert!(!p.is_available());
    }

    #[test]
    fn low_stock_threshold_is_inclusive() {
        assert!(product(5, 5).is_low_stock());
        assert!(!product(6, 5).is_low_stock());
    }

    #[test]
    fn apply_stock_delta_dispatches_by_sign() {
        let mut p = product(5, 1);
        p.apply_stock_delta(4).unwrap();
        p.apply_stock_delta(-2).unwrap();
        assert_eq!(p.stock_quantity(), 7);
        assert!(p.apply_stock_delta(0).is_err());
        assert!(matches!(
            p.apply_stock_delta(-8),
            Err(DomainError::InsufficientStock { available: 7, .. })
        ));
    }

    #[test]
    fn set_stock_clamps() {
        let mut p = product(5, 1);
        p.set_stock_quantity(-4);
        assert_eq!(p.stock_quantity(), 0);
    }

    proptest! {
        #[test]
        fn decrease_within_stock_subtracts(stock in 0i64..10_000, take in 1i64..10_000) {
            prop_assume!(take <= stock);
            let mut p = product(stock, 5);
            p.decrease_stock(take).unwrap();
            prop_assert_eq!(p.stock_quantity(), stock - take);
            prop_assert_eq!(p.is_available(), stock - take > 0);
        }

        #[test]
        fn decrease_beyond_stock_fails_and_keeps_stock(stock in 0i64..10_000, extra in 1i64..10_000) {
            let mut p = product(stock, 5);
            let result = p.decrease_stock(stock + extra);
            let is_insufficient = matches!(result, Err(DomainError::InsufficientStock { .. }));
            prop_assert!(is_insufficient);
            prop_assert_eq!(p.stock_quantity(), stock);
        }

        #[test]
        fn can_fulfill_matches_decrease(stock in 0i64..1_000, qty in 1i64..1_000) {
            let mut p = product(stock, 5);
            let expected = p.can_fulfill_quantity(qty);
            prop_assert_eq!(p.decrease_stock(qty).is_ok(), expected);
        }
    }
}
