//! Stock movements: the ledger that justifies every stock change.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, StockMovementId, Version};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Goods received; quantity is positive.
    In,
    /// Goods shipped or written off; quantity is positive.
    Out,
    /// Signed correction, e.g. after an inventory count.
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(DomainError::validation(format!(
                "Unknown movement type: {other}"
            ))),
        }
    }
}

/// Business reason attached to a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementReason {
    Purchase,
    Sale,
    Return,
    Damage,
    Loss,
    Inventory,
    #[default]
    Manual,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "purchase",
            MovementReason::Sale => "sale",
            MovementReason::Return => "return",
            MovementReason::Damage => "damage",
            MovementReason::Loss => "loss",
            MovementReason::Inventory => "inventory",
            MovementReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for MovementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(MovementReason::Purchase),
            "sale" => Ok(MovementReason::Sale),
            "return" => Ok(MovementReason::Return),
            "damage" => Ok(MovementReason::Damage),
            "loss" => Ok(MovementReason::Loss),
            "inventory" => Ok(MovementReason::Inventory),
            "manual" => Ok(MovementReason::Manual),
            other => Err(DomainError::validation(format!(
                "Unknown movement reason: {other}"
            ))),
        }
    }
}

/// Every stored field of a movement except the derived total cost.
#[derive(Debug, Clone)]
pub struct StockMovementParts {
    pub id: StockMovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reason: MovementReason,
    pub unit_cost: Option<Money>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub movement_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

/// One entry of a product's stock ledger.
///
/// Type, quantity and product are fixed once recorded; only the descriptive
/// fields may change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: StockMovementId,
    product_id: ProductId,
    movement_type: MovementType,
    quantity: i64,
    pub reason: MovementReason,
    unit_cost: Option<Money>,
    total_cost: Option<Money>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub movement_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl StockMovement {
    /// Validates the quantity against the movement type and derives the
    /// total cost.
    pub fn new(parts: StockMovementParts) -> Result<Self, DomainError> {
        match parts.movement_type {
            MovementType::In | MovementType::Out if parts.quantity <= 0 => {
                return Err(DomainError::InvalidQuantity {
                    quantity: parts.quantity,
                    reason: "in/out movements need a positive quantity",
                });
            }
            MovementType::Adjustment if parts.quantity == 0 => {
                return Err(DomainError::InvalidQuantity {
                    quantity: 0,
                    reason: "adjustments cannot be zero",
                });
            }
            _ => {}
        }

        let mut movement = Self {
            id: parts.id,
            product_id: parts.product_id,
            movement_type: parts.movement_type,
            quantity: parts.quantity,
            reason: parts.reason,
            unit_cost: None,
            total_cost: None,
            reference: parts.reference,
            notes: parts.notes,
            movement_date: parts.movement_date,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        };
        movement.apply_unit_cost(parts.unit_cost)?;
        Ok(movement)
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_cost(&self) -> Option<Money> {
        self.unit_cost
    }

    pub fn total_cost(&self) -> Option<Money> {
        self.total_cost
    }

    /// Signed effect of this movement on the product's stock.
    pub fn stock_delta(&self) -> i64 {
        match self.movement_type {
            MovementType::In | MovementType::Adjustment => self.quantity,
            MovementType::Out => -self.quantity,
        }
    }

    /// Replaces the unit cost and recomputes the total cost.
    pub fn set_unit_cost(&mut self, unit_cost: Option<Money>) -> Result<(), DomainError> {
        self.apply_unit_cost(unit_cost)?;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    fn apply_unit_cost(&mut self, unit_cost: Option<Money>) -> Result<(), DomainError> {
        let total_cost = match unit_cost {
            Some(cost) if cost.is_negative() => {
                return Err(DomainError::validation("Unit cost cannot be negative"));
            }
            Some(cost) => {
                let units = self
                    .quantity
                    .checked_abs()
                    .ok_or(common::MoneyError::Overflow)?;
                Some(cost.multiply(units)?)
            }
            None => None,
        };
        self.unit_cost = unit_cost;
        self.total_cost = total_cost;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Currency;

    fn parts(movement_type: MovementType, quantity: i64) -> StockMovementParts {
        StockMovementParts {
            id: StockMovementId::new(),
            product_id: ProductId::new(),
            movement_type,
            quantity,
            reason: MovementReason::default(),
            unit_cost: None,
            reference: None,
            notes: None,
            movement_date: Utc::now(),
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        }
    }

    #[test]
    fn in_and_out_require_positive_quantity() {
        assert!(StockMovement::new(parts(MovementType::In, 0)).is_err());
        assert!(StockMovement::new(parts(MovementType::Out, -2)).is_err());
        assert!(StockMovement::new(parts(MovementType::Out, 2)).is_ok());
    }

    #[test]
    fn adjustment_is_signed_but_not_zero() {
        assert!(StockMovement::new(parts(MovementType::Adjustment, 0)).is_err());
        let down = StockMovement::new(parts(MovementType::Adjustment, -4)).unwrap();
        assert_eq!(down.stock_delta(), -4);
    }

    #[test]
    fn stock_delta_follows_type() {
        let inbound = StockMovement::new(parts(MovementType::In, 3)).unwrap();
        let outbound = StockMovement::new(parts(MovementType::Out, 3)).unwrap();
        assert_eq!(inbound.stock_delta(), 3);
        assert_eq!(outbound.stock_delta(), -3);
    }

    #[test]
    fn total_cost_uses_absolute_quantity() {
        let mut p = parts(MovementType::Adjustment, -3);
        p.unit_cost = Some(Money::from_minor_units(250, Currency::EUR));
        let movement = StockMovement::new(p).unwrap();
        assert_eq!(
            movement.total_cost(),
            Some(Money::from_minor_units(750, Currency::EUR))
        );
    }

    #[test]
    fn set_unit_cost_recomputes_total() {
        let mut movement = StockMovement::new(parts(MovementType::In, 10)).unwrap();
        assert_eq!(movement.total_cost(), None);
        movement
            .set_unit_cost(Some(Money::from_minor_units(199, Currency::USD)))
            .unwrap();
        assert_eq!(
            movement.total_cost(),
            Some(Money::from_minor_units(1990, Currency::USD))
        );
        assert!(
            movement
                .set_unit_cost(Some(Money::from_minor_units(-1, Currency::USD)))
                .is_err()
        );
    }

    #[test]
    fn reason_defaults_to_manual() {
        assert_eq!(MovementReason::default(), MovementReason::Manual);
        assert_eq!("sale".parse::<MovementReason>().unwrap(), MovementReason::Sale);
        assert!("gift".parse::<MovementReason>().is_err());
    }
}
