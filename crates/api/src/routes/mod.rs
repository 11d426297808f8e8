//! HTTP route handlers.

pub mod auth;
pub mod categories;
pub mod customers;
pub mod dashboard;
pub mod invoices;
pub mod orders;
pub mod products;
pub mod stock_movements;
pub mod system;
