use async_trait::async_trait;
use common::{CategoryId, CustomerId, InvoiceId, OrderId, ProductId, StockMovementId};
use domain::{
    Category, Customer, Email, Invoice, Order, Payment, Product, Sku, Slug, StockMovement,
};

use crate::{ChangeSet, ProductQuery, Result};

/// Read access to categories.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    async fn find_category_by_slug(&self, slug: &Slug) -> Result<Option<Category>>;

    /// All categories ordered by position, then name.
    async fn list_categories(&self) -> Result<Vec<Category>>;
}

/// Read access to products.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn find_product_by_sku(&self, sku: &Sku) -> Result<Option<Product>>;

    /// Products matching `query`, ordered by name then SKU.
    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>>;
}

/// Read access to customers.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>>;

    async fn find_customer_by_email(&self, email: &Email) -> Result<Option<Customer>>;

    /// All customers, newest first.
    async fn list_customers(&self) -> Result<Vec<Customer>>;
}

/// Read access to the stock ledger.
#[async_trait]
pub trait StockMovementRepository: Send + Sync {
    async fn get_stock_movement(&self, id: StockMovementId) -> Result<Option<StockMovement>>;

    /// Movements, newest first, optionally for one product.
    async fn list_stock_movements(&self, product_id: Option<ProductId>)
    -> Result<Vec<StockMovement>>;
}

/// Read access to orders and their items.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Orders, newest first, optionally for one customer.
    async fn list_orders(&self, customer_id: Option<CustomerId>) -> Result<Vec<Order>>;

    /// Highest order number sequence issued in `year`.
    async fn last_order_sequence(&self, year: i32) -> Result<Option<u32>>;

    /// Whether any order line references the product.
    async fn product_has_order_items(&self, product_id: ProductId) -> Result<bool>;
}

/// Read access to invoices and their lines.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>>;

    async fn find_invoice_by_order(&self, order_id: OrderId) -> Result<Option<Invoice>>;

    /// Invoices, newest first.
    async fn list_invoices(&self) -> Result<Vec<Invoice>>;

    /// Highest invoice number sequence issued in `year`.
    async fn last_invoice_sequence(&self, year: i32) -> Result<Option<u32>>;
}

/// Read access to payments.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Payments of one invoice, oldest first.
    async fn list_payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>>;
}

/// Core trait for store implementations.
///
/// Reads go through the repository supertraits. Every write goes through
/// [`Store::commit`]: the change set is applied atomically, either all
/// changes succeed or none do. An update or delete whose expected version
/// does not match the stored row fails the commit with
/// `ConcurrencyConflict`; a taken unique key fails it with
/// `UniqueViolation`.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store:
    CategoryRepository
    + ProductRepository
    + CustomerRepository
    + StockMovementRepository
    + OrderRepository
    + InvoiceRepository
    + PaymentRepository
{
    async fn commit(&self, changes: ChangeSet) -> Result<()>;

    /// Checks that the backing storage is reachable.
    async fn ping(&self) -> Result<()>;
}
