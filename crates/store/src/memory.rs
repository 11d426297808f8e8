use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    CategoryId, CustomerId, InvoiceId, OrderId, PaymentId, ProductId, StockMovementId, Version,
};
use domain::{
    Category, Customer, Email, Invoice, Order, Payment, Product, Sku, Slug, StockMovement,
};
use tokio::sync::RwLock;

use crate::{
    Change, ChangeSet, ProductQuery, Result, StoreError,
    store::{
        CategoryRepository, CustomerRepository, InvoiceRepository, OrderRepository,
        PaymentRepository, ProductRepository, StockMovementRepository, Store,
    },
};

/// In-memory store implementation.
///
/// Used when no database is configured and throughout the tests. It
/// enforces the same keys, references and version checks as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every row.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

trait Versioned {
    fn current_version(&self) -> Version;
}

macro_rules! versioned {
    ($($ty:ty),*) => {
        $(impl Versioned for $ty {
            fn current_version(&self) -> Version {
                self.version
            }
        })*
    };
}

versioned!(Category, Product, Customer, StockMovement, Order, Invoice);

#[derive(Debug, Default)]
struct Tables {
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    movements: HashMap<StockMovementId, StockMovement>,
    orders: HashMap<OrderId, Order>,
    invoices: HashMap<InvoiceId, Invoice>,
    payments: HashMap<PaymentId, Payment>,
}

fn check_version<K, V>(
    rows: &HashMap<K, V>,
    id: K,
    expected: Version,
    entity: &'static str,
) -> Result<()>
where
    K: Eq + Hash + std::fmt::Display,
    V: Versioned,
{
    match rows.get(&id) {
        None => Err(StoreError::not_found(entity, id)),
        Some(row) if row.current_version() != expected => Err(StoreError::conflict(
            entity,
            id,
            expected,
            row.current_version(),
        )),
        Some(_) => Ok(()),
    }
}

fn ensure_new<K, V>(rows: &HashMap<K, V>, id: K, entity: &'static str) -> Result<()>
where
    K: Eq + Hash + std::fmt::Display,
{
    if rows.contains_key(&id) {
        return Err(StoreError::UniqueViolation {
            entity,
            key: format!("id {id}"),
        });
    }
    Ok(())
}

fn ensure_referenced<K, V>(rows: &HashMap<K, V>, id: K, entity: &'static str) -> Result<()>
where
    K: Eq + Hash + std::fmt::Display,
{
    if !rows.contains_key(&id) {
        return Err(StoreError::ReferenceViolation {
            entity,
            key: format!("missing {id}"),
        });
    }
    Ok(())
}

/// Undo steps for the writes of one commit, replayed in reverse on failure.
type Journal = Vec<Box<dyn FnOnce(&mut Tables) + Send>>;

/// A row type and the table holding it.
trait Row: Sized + Send + 'static {
    type Key: Copy + Eq + Hash + Send + 'static;

    fn rows(tables: &mut Tables) -> &mut HashMap<Self::Key, Self>;
}

macro_rules! row {
    ($ty:ty, $key:ty, $table:ident) => {
        impl Row for $ty {
            type Key = $key;

            fn rows(tables: &mut Tables) -> &mut HashMap<$key, $ty> {
                &mut tables.$table
            }
        }
    };
}

row!(Category, CategoryId, categories);
row!(Product, ProductId, products);
row!(Customer, CustomerId, customers);
row!(StockMovement, StockMovementId, movements);
row!(Order, OrderId, orders);
row!(Invoice, InvoiceId, invoices);
row!(Payment, PaymentId, payments);

impl Tables {
    fn put<R: Row>(&mut self, key: R::Key, row: R, journal: &mut Journal) {
        let previous = R::rows(self).insert(key, row);
        journal.push(Box::new(move |tables: &mut Tables| {
            let rows = R::rows(tables);
            match previous {
                Some(row) => rows.insert(key, row),
                None => rows.remove(&key),
            };
        }));
    }

    fn take<R: Row>(&mut self, key: R::Key, journal: &mut Journal) {
        if let Some(row) = R::rows(self).remove(&key) {
            journal.push(Box::new(move |tables: &mut Tables| {
                R::rows(tables).insert(key, row);
            }));
        }
    }

    /// Checks one change and writes it. Nothing is written unless every
    /// check passes.
    fn apply(&mut self, change: Change, journal: &mut Journal) -> Result<()> {
        match change {
            Change::InsertCategory(category) => {
                ensure_new(&self.categories, category.id, "category")?;
                self.check_category(&category)?;
                self.put(category.id, category, journal);
            }
            Change::UpdateCategory { category, expected } => {
                check_version(&self.categories, category.id, expected, "category")?;
                self.check_category(&category)?;
                self.put(category.id, category, journal);
            }
            Change::DeleteCategory { id, expected } => {
                check_version(&self.categories, id, expected, "category")?;
                let in_use = self.products.values().any(|p| p.category_id == Some(id))
                    || self.categories.values().any(|c| c.parent_id == Some(id));
                if in_use {
                    return Err(StoreError::ReferenceViolation {
                        entity: "category",
                        key: format!("{id} still has products or children"),
                    });
                }
                self.take::<Category>(id, journal);
            }

            Change::InsertProduct(product) => {
                ensure_new(&self.products, product.id, "product")?;
                self.check_product(&product)?;
                self.put(product.id, product, journal);
            }
            Change::UpdateProduct { product, expected } => {
                check_version(&self.products, product.id, expected, "product")?;
                self.check_product(&product)?;
                self.put(product.id, product, journal);
            }
            Change::DeleteProduct { id, expected } => {
                check_version(&self.products, id, expected, "product")?;
                let ordered = self
                    .orders
                    .values()
                    .any(|o| o.items().iter().any(|i| i.product_id == id));
                if ordered {
                    return Err(StoreError::ReferenceViolation {
                        entity: "product",
                        key: format!("{id} is referenced by order items"),
                    });
                }
                let movements: Vec<_> = self
                    .movements
                    .values()
                    .filter(|m| m.product_id() == id)
                    .map(|m| m.id)
                    .collect();
                for movement in movements {
                    self.take::<StockMovement>(movement, journal);
                }
                self.take::<Product>(id, journal);
            }

            Change::InsertCustomer(customer) => {
                ensure_new(&self.customers, customer.id, "customer")?;
                self.check_customer(&customer)?;
                self.put(customer.id, customer, journal);
            }
            Change::UpdateCustomer { customer, expected } => {
                check_version(&self.customers, customer.id, expected, "customer")?;
                self.check_customer(&customer)?;
                self.put(customer.id, customer, journal);
            }
            Change::DeleteCustomer { id, expected } => {
                check_version(&self.customers, id, expected, "customer")?;
                if self.orders.values().any(|o| o.customer_id == id) {
                    return Err(StoreError::ReferenceViolation {
                        entity: "customer",
                        key: format!("{id} has orders"),
                    });
                }
                self.take::<Customer>(id, journal);
            }

            Change::InsertStockMovement(movement) => {
                ensure_new(&self.movements, movement.id, "stock movement")?;
                ensure_referenced(&self.products, movement.product_id(), "product")?;
                self.put(movement.id, movement, journal);
            }
            Change::UpdateStockMovement { movement, expected } => {
                check_version(&self.movements, movement.id, expected, "stock movement")?;
                ensure_referenced(&self.products, movement.product_id(), "product")?;
                self.put(movement.id, movement, journal);
            }
            Change::DeleteStockMovement { id, expected } => {
                check_version(&self.movements, id, expected, "stock movement")?;
                self.take::<StockMovement>(id, journal);
            }

            Change::InsertOrder(order) => {
                ensure_new(&self.orders, order.id, "order")?;
                self.check_order(&order)?;
                self.put(order.id, order, journal);
            }
            Change::UpdateOrder { order, expected } => {
                check_version(&self.orders, order.id, expected, "order")?;
                self.check_order(&order)?;
                self.put(order.id, order, journal);
            }
            Change::DeleteOrder { id, expected } => {
                check_version(&self.orders, id, expected, "order")?;
                if self.invoices.values().any(|i| i.order_id == id) {
                    return Err(StoreError::ReferenceViolation {
                        entity: "order",
                        key: format!("{id} is invoiced"),
                    });
                }
                self.take::<Order>(id, journal);
            }

            Change::InsertInvoice(invoice) => {
                ensure_new(&self.invoices, invoice.id, "invoice")?;
                self.check_invoice(&invoice)?;
                self.put(invoice.id, invoice, journal);
            }
            Change::UpdateInvoice { invoice, expected } => {
                check_version(&self.invoices, invoice.id, expected, "invoice")?;
                self.check_invoice(&invoice)?;
                self.put(invoice.id, invoice, journal);
            }
            Change::DeleteInvoice { id, expected } => {
                check_version(&self.invoices, id, expected, "invoice")?;
                let payments: Vec<_> = self
                    .payments
                    .values()
                    .filter(|p| p.invoice_id == id)
                    .map(|p| p.id)
                    .collect();
                for payment in payments {
                    self.take::<Payment>(payment, journal);
                }
                self.take::<Invoice>(id, journal);
            }

            Change::InsertPayment(payment) => {
                ensure_new(&self.payments, payment.id, "payment")?;
                ensure_referenced(&self.invoices, payment.invoice_id, "invoice")?;
                self.put(payment.id, payment, journal);
            }
        }
        Ok(())
    }

    fn check_category(&self, category: &Category) -> Result<()> {
        if self
            .categories
            .values()
            .any(|c| c.id != category.id && c.slug == category.slug)
        {
            return Err(StoreError::UniqueViolation {
                entity: "category",
                key: format!("slug {}", category.slug),
            });
        }
        if let Some(parent) = category.parent_id {
            ensure_referenced(&self.categories, parent, "category")?;
        }
        self.check_ancestry(category)
    }

    /// Walks up from the new parent; reaching the category itself means the
    /// write closes a loop. Bounded by the table size.
    fn check_ancestry(&self, category: &Category) -> Result<()> {
        let mut next = category.parent_id;
        for _ in 0..=self.categories.len() {
            let Some(id) = next else {
                return Ok(());
            };
            if id == category.id {
                return Err(StoreError::Cycle {
                    entity: "category",
                    id: category.id.to_string(),
                });
            }
            next = self.categories.get(&id).and_then(|c| c.parent_id);
        }
        Err(StoreError::Cycle {
            entity: "category",
            id: category.id.to_string(),
        })
    }

    fn check_product(&self, product: &Product) -> Result<()> {
        if self
            .products
            .values()
            .any(|p| p.id != product.id && p.sku == product.sku)
        {
            return Err(StoreError::UniqueViolation {
                entity: "product",
                key: format!("sku {}", product.sku),
            });
        }
        if let Some(category) = product.category_id {
            ensure_referenced(&self.categories, category, "category")?;
        }
        Ok(())
    }

    fn check_customer(&self, customer: &Customer) -> Result<()> {
        if self
            .customers
            .values()
            .any(|c| c.id != customer.id && c.email == customer.email)
        {
            return Err(StoreError::UniqueViolation {
                entity: "customer",
                key: format!("email {}", customer.email),
            });
        }
        Ok(())
    }

    fn check_order(&self, order: &Order) -> Result<()> {
        if self
            .orders
            .values()
            .any(|o| o.id != order.id && o.order_number == order.order_number)
        {
            return Err(StoreError::UniqueViolation {
                entity: "order",
                key: format!("number {}", order.order_number),
            });
        }
        ensure_referenced(&self.customers, order.customer_id, "customer")?;
        for item in order.items() {
            ensure_referenced(&self.products, item.product_id, "product")?;
        }
        Ok(())
    }

    fn check_invoice(&self, invoice: &Invoice) -> Result<()> {
        for other in self.invoices.values().filter(|i| i.id != invoice.id) {
            if other.invoice_number == invoice.invoice_number {
                return Err(StoreError::UniqueViolation {
                    entity: "invoice",
                    key: format!("number {}", invoice.invoice_number),
                });
            }
            if other.order_id == invoice.order_id {
                return Err(StoreError::UniqueViolation {
                    entity: "invoice",
                    key: format!("order {}", invoice.order_id),
                });
            }
        }
        ensure_referenced(&self.orders, invoice.order_id, "order")
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &Slug) -> Result<Option<Category>> {
        let tables = self.tables.read().await;
        Ok(tables.categories.values().find(|c| &c.slug == slug).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<_> = tables.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.position.cmp(&b.position).then(a.name.cmp(&b.name)));
        Ok(categories)
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> Result<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.values().find(|p| &p.sku == sku).cloned())
    }

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let mut products: Vec<_> = tables
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.sku.cmp(&b.sku)));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(products.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn find_customer_by_email(&self, email: &Email) -> Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.values().find(|c| &c.email == email).cloned())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let tables = self.tables.read().await;
        let mut customers: Vec<_> = tables.customers.values().cloned().collect();
        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(customers)
    }
}

#[async_trait]
impl StockMovementRepository for InMemoryStore {
    async fn get_stock_movement(&self, id: StockMovementId) -> Result<Option<StockMovement>> {
        Ok(self.tables.read().await.movements.get(&id).cloned())
    }

    async fn list_stock_movements(
        &self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<StockMovement>> {
        let tables = self.tables.read().await;
        let mut movements: Vec<_> = tables
            .movements
            .values()
            .filter(|m| product_id.is_none_or(|id| m.product_id() == id))
            .cloned()
            .collect();
        movements.sort_by(|a, b| {
            b.movement_date
                .cmp(&a.movement_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(movements)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, customer_id: Option<CustomerId>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| customer_id.is_none_or(|id| o.customer_id == id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.order_date
                .cmp(&a.order_date)
                .then(b.order_number.cmp(&a.order_number))
        });
        Ok(orders)
    }

    async fn last_order_sequence(&self, year: i32) -> Result<Option<u32>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.order_number.year() == year)
            .map(|o| o.order_number.sequence())
            .max())
    }

    async fn product_has_order_items(&self, product_id: ProductId) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .any(|o| o.items().iter().any(|i| i.product_id == product_id)))
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.tables.read().await.invoices.get(&id).cloned())
    }

    async fn find_invoice_by_order(&self, order_id: OrderId) -> Result<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .values()
            .find(|i| i.order_id == order_id)
            .cloned())
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        let tables = self.tables.read().await;
        let mut invoices: Vec<_> = tables.invoices.values().cloned().collect();
        invoices.sort_by(|a, b| {
            b.issue_date
                .cmp(&a.issue_date)
                .then(b.invoice_number.cmp(&a.invoice_number))
        });
        Ok(invoices)
    }

    async fn last_invoice_sequence(&self, year: i32) -> Result<Option<u32>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .values()
            .filter(|i| i.invoice_number.year() == year)
            .map(|i| i.invoice_number.sequence())
            .max())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn list_payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<_> = tables
            .payments
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            a.payment_date
                .cmp(&b.payment_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(payments)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let count = changes.len();
        let mut tables = self.tables.write().await;

        // Writes go straight to the tables; a failing change rolls back the
        // ones before it, so only touched rows are ever copied.
        let mut journal = Journal::new();
        for change in changes {
            if let Err(err) = tables.apply(change, &mut journal) {
                while let Some(undo) = journal.pop() {
                    undo(&mut *tables);
                }
                return Err(err);
            }
        }

        tracing::debug!(changes = count, "committed change set");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Currency, Money};
    use domain::ProductParts;

    fn product(sku: &str, stock: i64) -> Product {
        Product::from_parts(ProductParts {
            id: ProductId::new(),
            name: format!("Product {sku}"),
            description: None,
            sku: Sku::parse(sku).unwrap(),
            category_id: None,
            price: Money::from_minor_units(1_000, Currency::EUR),
            stock_quantity: stock,
            min_stock_level: 2,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        })
    }

    #[tokio::test]
    async fn commit_and_read_back() {
        let store = InMemoryStore::new();
        let p = product("ABC-1", 5);
        let mut changes = ChangeSet::new();
        changes.insert_product(&p);
        store.commit(changes).await.unwrap();

        let loaded = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(loaded, p);
        assert!(
            store
                .find_product_by_sku(&Sku::parse("abc-1").unwrap())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn duplicate_sku_is_rejected() {
        let store = InMemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.insert_product(&product("ABC-1", 5));
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.insert_product(&product("ABC-1", 1));
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { entity: "product", .. }));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryStore::new();
        let p = product("ABC-1", 5);
        let mut changes = ChangeSet::new();
        changes.insert_product(&p);
        store.commit(changes).await.unwrap();

        let mut first = p.clone();
        let mut second = p.clone();

        first.increase_stock(1).unwrap();
        let mut changes = ChangeSet::new();
        changes.update_product(&mut first);
        store.commit(changes).await.unwrap();

        second.increase_stock(2).unwrap();
        let mut changes = ChangeSet::new();
        changes.update_product(&mut second);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));

        let stored = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity(), 6);
        assert_eq!(stored.version, Version::new(2));
    }

    #[tokio::test]
    async fn failed_change_set_leaves_no_trace() {
        let store = InMemoryStore::new();
        let a = product("AAA-1", 5);
        let mut changes = ChangeSet::new();
        changes.insert_product(&a);
        store.commit(changes).await.unwrap();

        let b = product("BBB-1", 5);
        let dup = product("AAA-1", 1);
        let mut changes = ChangeSet::new();
        changes.insert_product(&b).insert_product(&dup);
        assert!(store.commit(changes).await.is_err());

        assert!(store.get_product(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_change_set_restores_updated_and_cascaded_rows() {
        let store = InMemoryStore::new();
        let a = product("AAA-1", 5);
        let mut c = product("CCC-1", 5);
        let movement = domain::StockMovement::new(domain::StockMovementParts {
            id: StockMovementId::new(),
            product_id: a.id,
            movement_type: domain::MovementType::In,
            quantity: 5,
            reason: domain::MovementReason::Purchase,
            unit_cost: None,
            reference: None,
            notes: None,
            movement_date: Utc::now(),
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        })
        .unwrap();
        let mut changes = ChangeSet::new();
        changes
            .insert_product(&a)
            .insert_product(&c)
            .insert_stock_movement(&movement);
        store.commit(changes).await.unwrap();

        c.increase_stock(3).unwrap();
        let mut changes = ChangeSet::new();
        changes
            .update_product(&mut c)
            .delete_product(&a)
            .insert_product(&product("CCC-1", 1));
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));

        let kept = store.get_product(c.id).await.unwrap().unwrap();
        assert_eq!(kept.stock_quantity(), 5);
        assert_eq!(kept.version, Version::first());
        assert!(store.get_product(a.id).await.unwrap().is_some());
        assert!(store.get_stock_movement(movement.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let store = InMemoryStore::new();
        let mut p = product("ABC-1", 5);
        let mut changes = ChangeSet::new();
        changes.update_product(&mut p);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_products_paginates_by_name() {
        let store = InMemoryStore::new();
        let mut changes = ChangeSet::new();
        for sku in ["CCC-1", "AAA-1", "BBB-1"] {
            changes.insert_product(&product(sku, 5));
        }
        store.commit(changes).await.unwrap();

        let page = store
            .list_products(ProductQuery::new().offset(1).limit(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sku.as_str(), "BBB-1");
    }

    fn category(name: &str) -> Category {
        Category {
            id: CategoryId::new(),
            name: name.to_string(),
            description: None,
            slug: Slug::from_name(name).unwrap(),
            parent_id: None,
            position: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        }
    }

    #[tokio::test]
    async fn crossed_reparents_cannot_form_a_cycle() {
        let store = InMemoryStore::new();
        let a = category("Alpha");
        let b = category("Beta");
        let mut changes = ChangeSet::new();
        changes.insert_category(&a).insert_category(&b);
        store.commit(changes).await.unwrap();

        // Both moves are built from the same snapshot, so each looks valid alone.
        let mut a_under_b = a.clone();
        a_under_b.parent_id = Some(b.id);
        let mut b_under_a = b.clone();
        b_under_a.parent_id = Some(a.id);

        let mut changes = ChangeSet::new();
        changes.update_category(&mut a_under_b);
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.update_category(&mut b_under_a);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::Cycle { entity: "category", .. }));

        let categories = store.list_categories().await.unwrap();
        let tree = domain::CategoryTree::new(&categories);
        assert_eq!(tree.level(a.id).unwrap(), 1);
        assert_eq!(tree.level(b.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn self_parent_is_a_cycle() {
        let store = InMemoryStore::new();
        let mut a = category("Alpha");
        let mut changes = ChangeSet::new();
        changes.insert_category(&a);
        store.commit(changes).await.unwrap();

        a.parent_id = Some(a.id);
        let mut changes = ChangeSet::new();
        changes.update_category(&mut a);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::Cycle { .. }));
    }
}
