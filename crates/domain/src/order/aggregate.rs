//! Order and order line entities.

use chrono::{DateTime, Utc};
use common::{Currency, CustomerId, Money, OrderId, OrderItemId, ProductId, Version};
use serde::Serialize;

use super::OrderStatus;
use crate::error::DomainError;
use crate::numbering::DocumentNumber;

/// A single order line. `total_price` is always `quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    quantity: i64,
    unit_price: Money,
    total_price: Money,
}

impl OrderItem {
    pub fn new(
        id: OrderItemId,
        product_id: ProductId,
        product_name: impl Into<String>,
        sku: impl Into<String>,
        quantity: i64,
        unit_price: Money,
    ) -> Result<Self, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity {
                quantity,
                reason: "order item quantity must be positive",
            });
        }
        if unit_price.is_negative() {
            return Err(DomainError::validation("Unit price cannot be negative"));
        }
        Ok(Self {
            id,
            product_id,
            product_name: product_name.into(),
            sku: sku.into(),
            quantity,
            unit_price,
            total_price: unit_price.multiply(quantity)?,
        })
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }
}

/// Every stored field of an order except the derived total.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub order_number: DocumentNumber,
    pub customer_id: CustomerId,
    pub currency: Currency,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub shipping_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

/// A customer's order.
///
/// The total is derived from the lines and is never set directly. Status
/// only moves along the [`OrderStatus`] transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: DocumentNumber,
    pub customer_id: CustomerId,
    currency: Currency,
    items: Vec<OrderItem>,
    status: OrderStatus,
    total_amount: Money,
    pub order_date: DateTime<Utc>,
    shipping_date: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl Order {
    /// Builds an order and computes its total.
    ///
    /// Fails with a currency mismatch if a line is priced in another
    /// currency than the order.
    pub fn from_parts(parts: OrderParts) -> Result<Self, DomainError> {
        let mut order = Self {
            id: parts.id,
            order_number: parts.order_number,
            customer_id: parts.customer_id,
            currency: parts.currency,
            items: parts.items,
            status: parts.status,
            total_amount: Money::zero(parts.currency),
            order_date: parts.order_date,
            shipping_date: parts.shipping_date,
            delivery_date: parts.delivery_date,
            notes: parts.notes,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        };
        order.calculate_total()?;
        Ok(order)
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_date(&self) -> Option<DateTime<Utc>> {
        self.shipping_date
    }

    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_date
    }

    /// Total number of units across all lines.
    ///
    /// Always fits: [`Order::calculate_total`] rejects lines whose quantities
    /// overflow when summed.
    pub fn total_quantity(&self) -> i64 {
        checked_quantity(&self.items).unwrap_or(i64::MAX)
    }

    /// Sums the line totals, stores the result and returns it.
    pub fn calculate_total(&mut self) -> Result<Money, DomainError> {
        checked_quantity(&self.items)?;
        let total = Money::sum(self.items.iter().map(OrderItem::total_price), self.currency)?;
        self.total_amount = total;
        Ok(total)
    }

    /// Appends a line while the order is still pending.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), DomainError> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::validation(format!(
                "Items can only be added to pending orders (order is {})",
                self.status
            )));
        }
        self.items.push(item);
        if let Err(err) = self.calculate_total() {
            self.items.pop();
            return Err(err);
        }
        self.touch();
        Ok(())
    }

    /// Moves the order to `next`.
    ///
    /// Returns `Ok(false)` when `next` is the current status, which leaves the
    /// order untouched. Shipping and delivery stamp their dates with `at`.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        if next == self.status {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: "order",
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        match next {
            OrderStatus::Shipped => self.shipping_date = Some(at),
            OrderStatus::Delivered => self.delivery_date = Some(at),
            _ => {}
        }
        self.status = next;
        self.updated_at = Some(at);
        Ok(true)
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

fn checked_quantity(items: &[OrderItem]) -> Result<i64, DomainError> {
    items.iter().try_fold(0i64, |sum, item| {
        sum.checked_add(item.quantity).ok_or(DomainError::InvalidQuantity {
            quantity: item.quantity,
            reason: "order quantities overflow when summed",
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numbering::DocumentKind;
    use proptest::prelude::*;

    fn eur(minor: i64) -> Money {
        Money::from_minor_units(minor, Currency::EUR)
    }

    fn item(quantity: i64, price: Money) -> OrderItem {
        OrderItem::new(
            OrderItemId::new(),
            ProductId::new(),
            "Laptop Pro 15",
            "LP-15-001",
            quantity,
            price,
        )
        .unwrap()
    }

    fn order(items: Vec<OrderItem>) -> Result<Order, DomainError> {
        Order::from_parts(OrderParts {
            id: OrderId::new(),
            order_number: DocumentNumber::new(DocumentKind::Order, 2024, 1).unwrap(),
            customer_id: CustomerId::new(),
            currency: Currency::EUR,
            items,
            status: OrderStatus::Pending,
            order_date: Utc::now(),
            shipping_date: None,
            delivery_date: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        })
    }

    #[test]
    fn item_rejects_non_positive_quantity() {
        let result = OrderItem::new(OrderItemId::new(), ProductId::new(), "x", "SKU", 0, eur(100));
        assert!(matches!(result, Err(DomainError::InvalidQuantity { .. })));
    }

    #[test]
    fn overflowing_quantities_are_rejected() {
        let free = eur(0);
        let err = order(vec![item(i64::MAX, free), item(1, free)]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity { .. }));

        let mut single = order(vec![item(i64::MAX, free)]).unwrap();
        assert_eq!(single.total_quantity(), i64::MAX);
        let err = single.add_item(item(1, free)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity { .. }));
        assert_eq!(single.items().len(), 1);
    }

    #[test]
    fn total_is_sum_of_lines() {
        let order = order(vec![item(1, eur(129_999)), item(3, eur(1_050))]).unwrap();
        assert_eq!(order.total_amount(), eur(133_149));
        assert_eq!(order.total_quantity(), 4);
    }

    #[test]
    fn empty_order_totals_zero() {
        assert_eq!(order(vec![]).unwrap().total_amount(), eur(0));
    }

    #[test]
    fn mixed_currency_lines_are_rejected() {
        let usd = Money::from_minor_units(100, Currency::USD);
        let result = order(vec![item(1, eur(100)), item(1, usd)]);
        assert!(matches!(result, Err(DomainError::Money(_))));
    }

    #[test]
    fn add_item_recomputes_total() {
        let mut order = order(vec![item(1, eur(500))]).unwrap();
        order.add_item(item(2, eur(250))).unwrap();
        assert_eq!(order.total_amount(), eur(1_000));

        let usd = Money::from_minor_units(100, Currency::USD);
        assert!(order.add_item(item(1, usd)).is_err());
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.total_amount(), eur(1_000));
    }

    #[test]
    fn add_item_only_while_pending() {
        let mut order = order(vec![]).unwrap();
        order
            .transition_to(OrderStatus::Confirmed, Utc::now())
            .unwrap();
        assert!(order.add_item(item(1, eur(100))).is_err());
    }

    #[test]
    fn transitions_stamp_dates() {
        let mut order = order(vec![item(1, eur(100))]).unwrap();
        let now = Utc::now();
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            assert!(order.transition_to(status, now).unwrap());
        }
        assert_eq!(order.shipping_date(), Some(now));
        assert_eq!(order.delivery_date(), None);
        order.transition_to(OrderStatus::Delivered, now).unwrap();
        assert_eq!(order.delivery_date(), Some(now));
    }

    #[test]
    fn same_status_is_a_no_op() {
        let mut order = order(vec![]).unwrap();
        assert!(!order.transition_to(OrderStatus::Pending, Utc::now()).unwrap());
        assert_eq!(order.updated_at, None);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut order = order(vec![]).unwrap();
        let err = order
            .transition_to(OrderStatus::Delivered, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { from: "pending", to: "delivered", .. }));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    proptest! {
        #[test]
        fn total_matches_line_products(lines in prop::collection::vec((1i64..100, 0i64..1_000_000), 0..20)) {
            let expected: i64 = lines.iter().map(|(q, p)| q * p).sum();
            let items = lines.iter().map(|(q, p)| item(*q, eur(*p))).collect();
            let order = order(items).unwrap();
            prop_assert_eq!(order.total_amount().to_minor_units(), expected);
        }
    }
}
