//! Typed inputs of the service operations.
//!
//! These carry already-parsed values (ids, money, enums). Text fields are
//! trimmed and validated by the services.

use chrono::{DateTime, Utc};
use common::{CategoryId, CustomerId, Money, OrderId, ProductId};
use domain::{
    InvoiceStatus, MovementReason, MovementType, OrderStatus, PaymentMethod, PaymentStatus,
};
use rust_decimal::Decimal;

/// Create or replace a category.
#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    /// Derived from the name when absent.
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub position: i32,
    pub is_active: bool,
}

impl CategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: None,
            description: None,
            parent_id: None,
            position: 0,
            is_active: true,
        }
    }

    pub fn with_parent(mut self, parent_id: CategoryId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Create or replace a product.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Money,
    /// Clamped at zero. Zero on create when absent, kept on update.
    pub stock: Option<i64>,
    /// Defaults to the domain default on create and is kept on update.
    pub min_stock_level: Option<i64>,
    /// Active on create when absent, kept on update.
    pub is_active: Option<bool>,
    pub category_id: Option<CategoryId>,
}

impl ProductInput {
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            name: name.into(),
            sku: sku.into(),
            description: None,
            price,
            stock: Some(stock),
            min_stock_level: None,
            is_active: None,
            category_id: None,
        }
    }
}

/// Create or replace a customer.
#[derive(Debug, Clone, Default)]
pub struct CustomerInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Record a stock movement.
#[derive(Debug, Clone)]
pub struct NewStockMovement {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    /// Positive for `in`/`out`, signed for `adjustment`.
    pub quantity: i64,
    /// Defaults to [`MovementReason::Manual`].
    pub reason: Option<MovementReason>,
    pub reference: Option<String>,
    pub unit_cost: Option<Money>,
    pub notes: Option<String>,
    /// Defaults to now.
    pub movement_date: Option<DateTime<Utc>>,
}

impl NewStockMovement {
    pub fn new(product_id: ProductId, movement_type: MovementType, quantity: i64) -> Self {
        Self {
            product_id,
            movement_type,
            quantity,
            reason: None,
            reference: None,
            unit_cost: None,
            notes: None,
            movement_date: None,
        }
    }

    pub fn reason(mut self, reason: MovementReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Edit a recorded movement.
///
/// Only the descriptive fields can change. `product_id`, `movement_type`
/// and `quantity` are accepted so that a request repeating the stored
/// values passes; any other value is rejected.
#[derive(Debug, Clone, Default)]
pub struct StockMovementChanges {
    pub reason: Option<MovementReason>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub unit_cost: Option<Money>,
    pub product_id: Option<ProductId>,
    pub movement_type: Option<MovementType>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Defaults to the product's current price.
    pub unit_price: Option<Money>,
}

impl NewOrderItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: None,
        }
    }
}

/// Place an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub items: Vec<NewOrderItem>,
    /// Applied as a transition from `pending`.
    pub status: Option<OrderStatus>,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn new(customer_id: CustomerId, items: Vec<NewOrderItem>) -> Self {
        Self {
            customer_id,
            items,
            status: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewInvoiceLine {
    /// Defaults to the product name, or "Item" without a product.
    pub description: Option<String>,
    pub product_id: Option<ProductId>,
    pub quantity: i64,
    pub unit_price: Money,
}

/// How the tax of an invoice is set. A rate wins over an amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxInput {
    pub rate: Option<Decimal>,
    pub amount: Option<Money>,
}

impl TaxInput {
    pub fn rate(rate: Decimal) -> Self {
        Self {
            rate: Some(rate),
            amount: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.rate.is_none() && self.amount.is_none()
    }
}

/// Issue an invoice for an order.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub order_id: OrderId,
    /// Copied from the order when absent.
    pub lines: Option<Vec<NewInvoiceLine>>,
    pub tax: TaxInput,
    /// `draft` (default) or `sent`.
    pub status: Option<InvoiceStatus>,
    pub issue_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl NewInvoice {
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id,
            lines: None,
            tax: TaxInput::default(),
            status: None,
            issue_date: None,
            due_date: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceChanges {
    pub lines: Option<Vec<NewInvoiceLine>>,
    pub tax: TaxInput,
    pub status: Option<InvoiceStatus>,
    /// Used when the invoice moves to `paid`; defaults to now.
    pub paid_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl InvoiceChanges {
    pub(crate) fn touches_amounts(&self) -> bool {
        self.lines.is_some() || !self.tax.is_empty()
    }
}

/// Record a payment against an invoice.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Money,
    pub method: PaymentMethod,
    /// Defaults to `completed`.
    pub status: Option<PaymentStatus>,
    pub transaction_id: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl NewPayment {
    pub fn new(amount: Money, method: PaymentMethod) -> Self {
        Self {
            amount,
            method,
            status: None,
            transaction_id: None,
            payment_date: None,
            notes: None,
        }
    }
}

/// Trims free text, mapping blank input to `None`.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
