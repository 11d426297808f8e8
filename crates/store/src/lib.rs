pub mod change;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use change::{Change, ChangeSet};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::ProductQuery;
pub use store::{
    CategoryRepository, CustomerRepository, InvoiceRepository, OrderRepository,
    PaymentRepository, ProductRepository, StockMovementRepository, Store,
};
