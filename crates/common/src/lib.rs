//! Shared types for the ERP backend.
//!
//! - Typed entity identifiers ([`ProductId`], [`OrderId`], ...)
//! - [`Money`], an immutable fixed-point currency amount
//! - [`Version`], the optimistic-concurrency counter carried by mutable rows

pub mod money;
pub mod types;
pub mod version;

pub use money::{Currency, Money, MoneyError};
pub use types::{
    CategoryId, CustomerId, InvoiceId, InvoiceLineId, OrderId, OrderItemId, PaymentId, ProductId,
    StockMovementId,
};
pub use version::Version;
