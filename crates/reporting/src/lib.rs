//! Dashboard statistics for the ERP backend.
//!
//! A pure fold over the current products, orders, customers and invoices.
//! Nothing is cached: every call reads full snapshots, so the cost grows
//! linearly with the size of each collection.

pub mod dashboard;

pub use dashboard::{
    CurrencyTotals, CustomerStats, DashboardStats, InvoiceStats, OrderStats, ProductStats,
    Snapshot, month_start,
};
