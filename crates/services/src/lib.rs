//! Application services for the ERP backend.
//!
//! Each service owns one area of the model and is generic over the
//! [`store::Store`] it runs against. Every mutating operation validates its
//! input, loads what it needs, and writes all affected rows through a
//! single [`store::ChangeSet`], so a failure at any step leaves the store
//! as it was.

pub mod catalog;
pub mod commands;
pub mod customers;
pub mod error;
pub mod invoices;
pub mod orders;
pub mod render;
pub mod reports;
pub mod stock;

pub use catalog::{CatalogService, CategoryDetails};
pub use commands::{
    CategoryInput, CustomerInput, InvoiceChanges, NewInvoice, NewInvoiceLine, NewOrder,
    NewOrderItem, NewPayment, NewStockMovement, OrderChanges, ProductInput, StockMovementChanges,
    TaxInput,
};
pub use customers::CustomerService;
pub use error::{Result, ServiceError};
pub use invoices::{InvoiceService, RecordedPayment};
pub use orders::OrderService;
pub use reports::DashboardService;
pub use stock::StockService;

/// All services over one shared store.
#[derive(Clone)]
pub struct Services<S: store::Store + Clone> {
    pub catalog: CatalogService<S>,
    pub customers: CustomerService<S>,
    pub stock: StockService<S>,
    pub orders: OrderService<S>,
    pub invoices: InvoiceService<S>,
    pub dashboard: DashboardService<S>,
}

impl<S: store::Store + Clone> Services<S> {
    pub fn new(store: S) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            customers: CustomerService::new(store.clone()),
            stock: StockService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            invoices: InvoiceService::new(store.clone()),
            dashboard: DashboardService::new(store),
        }
    }
}
