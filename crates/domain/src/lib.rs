//! Domain layer for the ERP backend.
//!
//! This crate holds the entities and the rules that keep them consistent:
//! - Category hierarchy with cycle prevention
//! - Product stock rules (never negative, low-stock detection)
//! - Stock movements as the ledger behind every stock change
//! - Orders and invoices with derived totals and status machines
//! - Payments and document numbering

pub mod category;
pub mod customer;
pub mod error;
pub mod invoice;
pub mod numbering;
pub mod order;
pub mod payment;
pub mod product;
pub mod stock;

pub use category::{Category, CategoryTree, Slug};
pub use customer::{Customer, Email};
pub use error::DomainError;
pub use invoice::{Invoice, InvoiceLine, InvoiceParts, InvoiceStatus};
pub use numbering::{DocumentKind, DocumentNumber};
pub use order::{Order, OrderItem, OrderParts, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentParts, PaymentStatus};
pub use product::{Product, ProductParts, Sku};
pub use stock::{MovementReason, MovementType, StockMovement, StockMovementParts};
