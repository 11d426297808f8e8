use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use common::{
    CategoryId, Currency, CustomerId, InvoiceId, InvoiceLineId, Money, OrderId, OrderItemId,
    PaymentId, ProductId, StockMovementId, Version,
};
use domain::{
    Category, Customer, DocumentNumber, Email, Invoice, InvoiceLine, InvoiceParts, Order,
    OrderItem, OrderParts, Payment, PaymentParts, Product, ProductParts, Sku, Slug,
    StockMovement, StockMovementParts,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Change, ChangeSet, ProductQuery, Result, StoreError,
    store::{
        CategoryRepository, CustomerRepository, InvoiceRepository, OrderRepository,
        PaymentRepository, ProductRepository, StockMovementRepository, Store,
    },
};

const CATEGORY_COLUMNS: &str =
    "id, name, description, slug, parent_id, position, is_active, created_at, updated_at, version";
const PRODUCT_COLUMNS: &str = "id, name, description, sku, category_id, price_minor, currency, \
     stock_quantity, min_stock_level, is_active, created_at, updated_at, version";
const CUSTOMER_COLUMNS: &str = "id, first_name, last_name, email, phone, address, city, \
     postal_code, country, created_at, updated_at, version";
const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity, reason, unit_cost_minor, \
     unit_cost_currency, reference, notes, movement_date, created_at, updated_at, version";
const ORDER_COLUMNS: &str = "id, order_number, customer_id, currency, status, order_date, \
     shipping_date, delivery_date, notes, created_at, updated_at, version";
const INVOICE_COLUMNS: &str = "id, invoice_number, order_id, currency, tax_minor, status, \
     issue_date, due_date, paid_date, notes, created_at, updated_at, version";
const PAYMENT_COLUMNS: &str = "id, invoice_id, amount_minor, currency, status, method, \
     transaction_id, payment_date, notes, created_at, updated_at, version";

/// PostgreSQL-backed store implementation.
///
/// Each [`Store::commit`] runs in one database transaction. Updates and
/// deletes are guarded with `WHERE id = $1 AND version = $2`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` connections.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn order_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.order_id, i.product_id, i.product_name, i.sku, i.quantity,
                   i.unit_price_minor, o.currency
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            WHERE i.order_id = ANY($1)
            ORDER BY i.order_id, i.line_no ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(row_to_order_item(&row)?);
        }
        Ok(items)
    }

    async fn invoice_lines(
        &self,
        invoice_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<InvoiceLine>>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.invoice_id, l.description, l.product_id, l.quantity, l.unit_price_minor, i.currency
            FROM invoice_lines l
            JOIN invoices i ON i.id = l.invoice_id
            WHERE l.invoice_id = ANY($1)
            ORDER BY l.invoice_id, l.line_no ASC
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<InvoiceLine>> = HashMap::new();
        for row in rows {
            let invoice_id: Uuid = row.try_get("invoice_id")?;
            lines
                .entry(invoice_id)
                .or_default()
                .push(row_to_invoice_line(&row)?);
        }
        Ok(lines)
    }

    async fn load_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.order_items(&ids).await?;
        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                row_to_order(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn load_invoices(&self, rows: Vec<PgRow>) -> Result<Vec<Invoice>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut lines = self.invoice_lines(&ids).await?;
        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                row_to_invoice(row, lines.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

fn parse_field<T>(entity: &'static str, id: Uuid, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| StoreError::corrupt(entity, id, e))
}

fn money(entity: &'static str, id: Uuid, minor: i64, currency: &str) -> Result<Money> {
    let currency: Currency = parse_field(entity, id, currency)?;
    Ok(Money::from_minor_units(minor, currency))
}

fn row_to_category(row: &PgRow) -> Result<Category> {
    let id: Uuid = row.try_get("id")?;
    let slug: String = row.try_get("slug")?;
    Ok(Category {
        id: CategoryId::from_uuid(id),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        slug: Slug::parse(&slug).map_err(|e| StoreError::corrupt("category", id, e))?,
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")?
            .map(CategoryId::from_uuid),
        position: row.try_get("position")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    let id: Uuid = row.try_get("id")?;
    let sku: String = row.try_get("sku")?;
    let currency: String = row.try_get("currency")?;
    Ok(Product::from_parts(ProductParts {
        id: ProductId::from_uuid(id),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        sku: Sku::parse(&sku).map_err(|e| StoreError::corrupt("product", id, e))?,
        category_id: row
            .try_get::<Option<Uuid>, _>("category_id")?
            .map(CategoryId::from_uuid),
        price: money("product", id, row.try_get("price_minor")?, &currency)?,
        stock_quantity: row.try_get("stock_quantity")?,
        min_stock_level: row.try_get("min_stock_level")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    }))
}

fn row_to_customer(row: &PgRow) -> Result<Customer> {
    let id: Uuid = row.try_get("id")?;
    let email: String = row.try_get("email")?;
    Ok(Customer {
        id: CustomerId::from_uuid(id),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: Email::parse(&email).map_err(|e| StoreError::corrupt("customer", id, e))?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_movement(row: &PgRow) -> Result<StockMovement> {
    let id: Uuid = row.try_get("id")?;
    let movement_type: String = row.try_get("movement_type")?;
    let reason: String = row.try_get("reason")?;
    let unit_cost_minor: Option<i64> = row.try_get("unit_cost_minor")?;
    let unit_cost_currency: Option<String> = row.try_get("unit_cost_currency")?;
    let unit_cost = match (unit_cost_minor, unit_cost_currency) {
        (Some(minor), Some(currency)) => Some(money("stock movement", id, minor, &currency)?),
        _ => None,
    };
    StockMovement::new(StockMovementParts {
        id: StockMovementId::from_uuid(id),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        movement_type: parse_field("stock movement", id, &movement_type)?,
        quantity: row.try_get("quantity")?,
        reason: parse_field("stock movement", id, &reason)?,
        unit_cost,
        reference: row.try_get("reference")?,
        notes: row.try_get("notes")?,
        movement_date: row.try_get("movement_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
    .map_err(|e| StoreError::corrupt("stock movement", id, e))
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    let id: Uuid = row.try_get("id")?;
    let currency: String = row.try_get("currency")?;
    OrderItem::new(
        OrderItemId::from_uuid(id),
        ProductId::from_uuid(row.try_get("product_id")?),
        row.try_get::<String, _>("product_name")?,
        row.try_get::<String, _>("sku")?,
        row.try_get("quantity")?,
        money("order item", id, row.try_get("unit_price_minor")?, &currency)?,
    )
    .map_err(|e| StoreError::corrupt("order item", id, e))
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let id: Uuid = row.try_get("id")?;
    let number: String = row.try_get("order_number")?;
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    Order::from_parts(OrderParts {
        id: OrderId::from_uuid(id),
        order_number: DocumentNumber::parse(&number)
            .map_err(|e| StoreError::corrupt("order", id, e))?,
        customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
        currency: parse_field("order", id, &currency)?,
        items,
        status: parse_field("order", id, &status)?,
        order_date: row.try_get("order_date")?,
        shipping_date: row.try_get("shipping_date")?,
        delivery_date: row.try_get("delivery_date")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
    .map_err(|e| StoreError::corrupt("order", id, e))
}

fn row_to_invoice_line(row: &PgRow) -> Result<InvoiceLine> {
    let id: Uuid = row.try_get("id")?;
    let currency: String = row.try_get("currency")?;
    InvoiceLine::new(
        InvoiceLineId::from_uuid(id),
        row.try_get::<String, _>("description")?,
        row.try_get::<Option<Uuid>, _>("product_id")?
            .map(ProductId::from_uuid),
        row.try_get("quantity")?,
        money("invoice line", id, row.try_get("unit_price_minor")?, &currency)?,
    )
    .map_err(|e| StoreError::corrupt("invoice line", id, e))
}

fn row_to_invoice(row: &PgRow, lines: Vec<InvoiceLine>) -> Result<Invoice> {
    let id: Uuid = row.try_get("id")?;
    let number: String = row.try_get("invoice_number")?;
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    Invoice::from_parts(InvoiceParts {
        id: InvoiceId::from_uuid(id),
        invoice_number: DocumentNumber::parse(&number)
            .map_err(|e| StoreError::corrupt("invoice", id, e))?,
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        currency: parse_field("invoice", id, &currency)?,
        lines,
        tax_amount: money("invoice", id, row.try_get("tax_minor")?, &currency)?,
        status: parse_field("invoice", id, &status)?,
        issue_date: row.try_get("issue_date")?,
        due_date: row.try_get("due_date")?,
        paid_date: row.try_get("paid_date")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
    .map_err(|e| StoreError::corrupt("invoice", id, e))
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let id: Uuid = row.try_get("id")?;
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    let method: String = row.try_get("method")?;
    Payment::new(PaymentParts {
        id: PaymentId::from_uuid(id),
        invoice_id: InvoiceId::from_uuid(row.try_get("invoice_id")?),
        amount: money("payment", id, row.try_get("amount_minor")?, &currency)?,
        status: parse_field("payment", id, &status)?,
        method: parse_field("payment", id, &method)?,
        transaction_id: row.try_get("transaction_id")?,
        payment_date: row.try_get("payment_date")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
    .map_err(|e| StoreError::corrupt("payment", id, e))
}

/// Maps constraint violations to their store error.
fn write_error(err: sqlx::Error, entity: &'static str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        let key = db_err.constraint().unwrap_or_default().to_string();
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation { entity, key };
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::ReferenceViolation { entity, key };
        }
    }
    StoreError::Database(err)
}

/// Explains why a guarded update or delete touched no row.
async fn missed_row(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
    expected: Version,
) -> StoreError {
    let current: std::result::Result<Option<i64>, sqlx::Error> =
        sqlx::query_scalar(&format!("SELECT version FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await;
    match current {
        Ok(Some(actual)) => StoreError::conflict(entity, id, expected, Version::new(actual)),
        Ok(None) => StoreError::not_found(entity, id),
        Err(e) => StoreError::Database(e),
    }
}

async fn guarded_delete(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
    expected: Version,
) -> Result<()> {
    let result = sqlx::query(&format!(
        "DELETE FROM {table} WHERE id = $1 AND version = $2"
    ))
    .bind(id)
    .bind(expected.as_i64())
    .execute(&mut *conn)
    .await
    .map_err(|e| write_error(e, entity))?;
    if result.rows_affected() == 0 {
        return Err(missed_row(conn, table, entity, id, expected).await);
    }
    Ok(())
}

/// Advisory lock key serializing category reparenting across transactions.
const CATEGORY_TREE_LOCK: i64 = 0x4341_5445_4752_5900;

async fn write_category(
    conn: &mut PgConnection,
    category: &Category,
    expected: Option<Version>,
) -> Result<()> {
    if category.parent_id.is_some() {
        // Held until the transaction ends, so a concurrent move of an
        // ancestor commits first and is visible to the check below.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CATEGORY_TREE_LOCK)
            .execute(&mut *conn)
            .await?;
    }
    let sql = match expected {
        None => {
            r#"
            INSERT INTO categories (id, name, description, slug, parent_id, position, is_active, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#
        }
        Some(_) => {
            r#"
            UPDATE categories
            SET name = $2, description = $3, slug = $4, parent_id = $5, position = $6,
                is_active = $7, created_at = $8, updated_at = $9, version = $10
            WHERE id = $1 AND version = $11
            "#
        }
    };
    let mut query = sqlx::query(sql)
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.slug.as_str())
        .bind(category.parent_id.map(|id| id.as_uuid()))
        .bind(category.position)
        .bind(category.is_active)
        .bind(category.created_at)
        .bind(category.updated_at)
        .bind(category.version.as_i64());
    if let Some(expected) = expected {
        query = query.bind(expected.as_i64());
    }
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "category"))?;
    if let Some(expected) = expected
        && result.rows_affected() == 0
    {
        return Err(missed_row(conn, "categories", "category", category.id.as_uuid(), expected).await);
    }
    if let Some(parent) = category.parent_id {
        check_ancestry(conn, category.id, parent).await?;
    }
    Ok(())
}

/// Fails when walking up from `parent` reaches `id` again.
async fn check_ancestry(
    conn: &mut PgConnection,
    id: CategoryId,
    parent: CategoryId,
) -> Result<()> {
    let closes_loop: bool = sqlx::query_scalar(
        r#"
        WITH RECURSIVE ancestors (id, parent_id) AS (
            SELECT id, parent_id FROM categories WHERE id = $1
            UNION
            SELECT c.id, c.parent_id FROM categories c JOIN ancestors a ON c.id = a.parent_id
        )
        SELECT EXISTS (SELECT 1 FROM ancestors WHERE id = $2)
        "#,
    )
    .bind(parent.as_uuid())
    .bind(id.as_uuid())
    .fetch_one(&mut *conn)
    .await?;
    if closes_loop {
        return Err(StoreError::Cycle {
            entity: "category",
            id: id.to_string(),
        });
    }
    Ok(())
}

async fn write_product(
    conn: &mut PgConnection,
    product: &Product,
    expected: Option<Version>,
) -> Result<()> {
    let sql = match expected {
        None => {
            r#"
            INSERT INTO products (id, name, description, sku, category_id, price_minor, currency,
                                  stock_quantity, min_stock_level, is_active, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        }
        Some(_) => {
            r#"
            UPDATE products
            SET name = $2, description = $3, sku = $4, category_id = $5, price_minor = $6,
                currency = $7, stock_quantity = $8, min_stock_level = $9, is_active = $10,
                created_at = $11, updated_at = $12, version = $13
            WHERE id = $1 AND version = $14
            "#
        }
    };
    let currency = product.price.currency();
    let mut query = sqlx::query(sql)
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.sku.as_str())
        .bind(product.category_id.map(|id| id.as_uuid()))
        .bind(product.price.to_minor_units())
        .bind(currency.as_str())
        .bind(product.stock_quantity())
        .bind(product.min_stock_level())
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(product.version.as_i64());
    if let Some(expected) = expected {
        query = query.bind(expected.as_i64());
    }
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "product"))?;
    if let Some(expected) = expected
        && result.rows_affected() == 0
    {
        return Err(missed_row(conn, "products", "product", product.id.as_uuid(), expected).await);
    }
    Ok(())
}

async fn write_customer(
    conn: &mut PgConnection,
    customer: &Customer,
    expected: Option<Version>,
) -> Result<()> {
    let sql = match expected {
        None => {
            r#"
            INSERT INTO customers (id, first_name, last_name, email, phone, address, city,
                                   postal_code, country, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#
        }
        Some(_) => {
            r#"
            UPDATE customers
            SET first_name = $2, last_name = $3, email = $4, phone = $5, address = $6, city = $7,
                postal_code = $8, country = $9, created_at = $10, updated_at = $11, version = $12
            WHERE id = $1 AND version = $13
            "#
        }
    };
    let mut query = sqlx::query(sql)
        .bind(customer.id.as_uuid())
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(customer.email.as_str())
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.postal_code)
        .bind(&customer.country)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .bind(customer.version.as_i64());
    if let Some(expected) = expected {
        query = query.bind(expected.as_i64());
    }
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "customer"))?;
    if let Some(expected) = expected
        && result.rows_affected() == 0
    {
        return Err(missed_row(conn, "customers", "customer", customer.id.as_uuid(), expected).await);
    }
    Ok(())
}

async fn write_movement(
    conn: &mut PgConnection,
    movement: &StockMovement,
    expected: Option<Version>,
) -> Result<()> {
    let sql = match expected {
        None => {
            r#"
            INSERT INTO stock_movements (id, product_id, movement_type, quantity, reason, unit_cost_minor,
                                         unit_cost_currency, reference, notes, movement_date,
                                         created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        }
        Some(_) => {
            r#"
            UPDATE stock_movements
            SET product_id = $2, movement_type = $3, quantity = $4, reason = $5, unit_cost_minor = $6,
                unit_cost_currency = $7, reference = $8, notes = $9, movement_date = $10,
                created_at = $11, updated_at = $12, version = $13
            WHERE id = $1 AND version = $14
            "#
        }
    };
    let unit_cost = movement.unit_cost();
    let mut query = sqlx::query(sql)
        .bind(movement.id.as_uuid())
        .bind(movement.product_id().as_uuid())
        .bind(movement.movement_type().as_str())
        .bind(movement.quantity())
        .bind(movement.reason.as_str())
        .bind(unit_cost.map(|c| c.to_minor_units()))
        .bind(unit_cost.map(|c| c.currency().as_str().to_string()))
        .bind(&movement.reference)
        .bind(&movement.notes)
        .bind(movement.movement_date)
        .bind(movement.created_at)
        .bind(movement.updated_at)
        .bind(movement.version.as_i64());
    if let Some(expected) = expected {
        query = query.bind(expected.as_i64());
    }
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "stock movement"))?;
    if let Some(expected) = expected
        && result.rows_affected() == 0
    {
        return Err(missed_row(
            conn,
            "stock_movements",
            "stock movement",
            movement.id.as_uuid(),
            expected,
        )
        .await);
    }
    Ok(())
}

async fn write_order(
    conn: &mut PgConnection,
    order: &Order,
    expected: Option<Version>,
) -> Result<()> {
    let sql = match expected {
        None => {
            r#"
            INSERT INTO orders (id, order_number, order_year, order_sequence, customer_id, currency,
                                status, total_minor, order_date, shipping_date, delivery_date, notes,
                                created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#
        }
        Some(_) => {
            r#"
            UPDATE orders
            SET order_number = $2, order_year = $3, order_sequence = $4, customer_id = $5,
                currency = $6, status = $7, total_minor = $8, order_date = $9, shipping_date = $10,
                delivery_date = $11, notes = $12, created_at = $13, updated_at = $14, version = $15
            WHERE id = $1 AND version = $16
            "#
        }
    };
    let currency = order.currency();
    let mut query = sqlx::query(sql)
        .bind(order.id.as_uuid())
        .bind(order.order_number.to_string())
        .bind(order.order_number.year())
        .bind(i64::from(order.order_number.sequence()))
        .bind(order.customer_id.as_uuid())
        .bind(currency.as_str())
        .bind(order.status().as_str())
        .bind(order.total_amount().to_minor_units())
        .bind(order.order_date)
        .bind(order.shipping_date())
        .bind(order.delivery_date())
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version.as_i64());
    if let Some(expected) = expected {
        query = query.bind(expected.as_i64());
    }
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "order"))?;
    if let Some(expected) = expected {
        if result.rows_affected() == 0 {
            return Err(missed_row(conn, "orders", "order", order.id.as_uuid(), expected).await);
        }
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id.as_uuid())
            .execute(&mut *conn)
            .await?;
    }

    for (line_no, item) in order.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, line_no, product_id, product_name, sku, quantity,
                                     unit_price_minor, total_price_minor)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(order.id.as_uuid())
        .bind(line_no as i64)
        .bind(item.product_id.as_uuid())
        .bind(&item.product_name)
        .bind(&item.sku)
        .bind(item.quantity())
        .bind(item.unit_price().to_minor_units())
        .bind(item.total_price().to_minor_units())
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "order item"))?;
    }
    Ok(())
}

async fn write_invoice(
    conn: &mut PgConnection,
    invoice: &Invoice,
    expected: Option<Version>,
) -> Result<()> {
    let sql = match expected {
        None => {
            r#"
            INSERT INTO invoices (id, invoice_number, invoice_year, invoice_sequence, order_id, currency,
                                  net_minor, tax_minor, total_minor, status, issue_date, due_date,
                                  paid_date, notes, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#
        }
        Some(_) => {
            r#"
            UPDATE invoices
            SET invoice_number = $2, invoice_year = $3, invoice_sequence = $4, order_id = $5,
                currency = $6, net_minor = $7, tax_minor = $8, total_minor = $9, status = $10,
                issue_date = $11, due_date = $12, paid_date = $13, notes = $14, created_at = $15,
                updated_at = $16, version = $17
            WHERE id = $1 AND version = $18
            "#
        }
    };
    let currency = invoice.currency();
    let mut query = sqlx::query(sql)
        .bind(invoice.id.as_uuid())
        .bind(invoice.invoice_number.to_string())
        .bind(invoice.invoice_number.year())
        .bind(i64::from(invoice.invoice_number.sequence()))
        .bind(invoice.order_id.as_uuid())
        .bind(currency.as_str())
        .bind(invoice.net_amount().to_minor_units())
        .bind(invoice.tax_amount().to_minor_units())
        .bind(invoice.total_amount().to_minor_units())
        .bind(invoice.status().as_str())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.paid_date())
        .bind(&invoice.notes)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .bind(invoice.version.as_i64());
    if let Some(expected) = expected {
        query = query.bind(expected.as_i64());
    }
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "invoice"))?;
    if let Some(expected) = expected {
        if result.rows_affected() == 0 {
            return Err(missed_row(conn, "invoices", "invoice", invoice.id.as_uuid(), expected).await);
        }
        sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = $1")
            .bind(invoice.id.as_uuid())
            .execute(&mut *conn)
            .await?;
    }

    for (line_no, line) in invoice.lines().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_lines (id, invoice_id, line_no, description, product_id, quantity,
                                       unit_price_minor, total_minor)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(invoice.id.as_uuid())
        .bind(line_no as i64)
        .bind(&line.description)
        .bind(line.product_id.map(|id| id.as_uuid()))
        .bind(line.quantity())
        .bind(line.unit_price().to_minor_units())
        .bind(line.total().to_minor_units())
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "invoice line"))?;
    }
    Ok(())
}

async fn insert_payment(conn: &mut PgConnection, payment: &Payment) -> Result<()> {
    let currency = payment.amount().currency();
    sqlx::query(
        r#"
        INSERT INTO payments (id, invoice_id, amount_minor, currency, status, method, transaction_id,
                              payment_date, notes, created_at, updated_at, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.invoice_id.as_uuid())
    .bind(payment.amount().to_minor_units())
    .bind(currency.as_str())
    .bind(payment.status.as_str())
    .bind(payment.method.as_str())
    .bind(&payment.transaction_id)
    .bind(payment.payment_date)
    .bind(&payment.notes)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .bind(payment.version.as_i64())
    .execute(&mut *conn)
    .await
    .map_err(|e| write_error(e, "payment"))?;
    Ok(())
}

async fn apply(conn: &mut PgConnection, change: Change) -> Result<()> {
    match change {
        Change::InsertCategory(c) => write_category(conn, &c, None).await,
        Change::UpdateCategory { category, expected } => {
            write_category(conn, &category, Some(expected)).await
        }
        Change::DeleteCategory { id, expected } => {
            guarded_delete(conn, "categories", "category", id.as_uuid(), expected).await
        }

        Change::InsertProduct(p) => write_product(conn, &p, None).await,
        Change::UpdateProduct { product, expected } => {
            write_product(conn, &product, Some(expected)).await
        }
        Change::DeleteProduct { id, expected } => {
            guarded_delete(conn, "products", "product", id.as_uuid(), expected).await
        }

        Change::InsertCustomer(c) => write_customer(conn, &c, None).await,
        Change::UpdateCustomer { customer, expected } => {
            write_customer(conn, &customer, Some(expected)).await
        }
        Change::DeleteCustomer { id, expected } => {
            guarded_delete(conn, "customers", "customer", id.as_uuid(), expected).await
        }

        Change::InsertStockMovement(m) => write_movement(conn, &m, None).await,
        Change::UpdateStockMovement { movement, expected } => {
            write_movement(conn, &movement, Some(expected)).await
        }
        Change::DeleteStockMovement { id, expected } => {
            guarded_delete(conn, "stock_movements", "stock movement", id.as_uuid(), expected)
                .await
        }

        Change::InsertOrder(o) => write_order(conn, &o, None).await,
        Change::UpdateOrder { order, expected } => write_order(conn, &order, Some(expected)).await,
        Change::DeleteOrder { id, expected } => {
            guarded_delete(conn, "orders", "order", id.as_uuid(), expected).await
        }

        Change::InsertInvoice(i) => write_invoice(conn, &i, None).await,
        Change::UpdateInvoice { invoice, expected } => {
            write_invoice(conn, &invoice, Some(expected)).await
        }
        Change::DeleteInvoice { id, expected } => {
            guarded_delete(conn, "invoices", "invoice", id.as_uuid(), expected).await
        }

        Change::InsertPayment(p) => insert_payment(conn, &p).await,
    }
}

#[async_trait]
impl CategoryRepository for PostgresStore {
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_category).transpose()
    }

    async fn find_category_by_slug(&self, slug: &Slug) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1"
        ))
        .bind(slug.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_category).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY position ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_category).collect()
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1"
        ))
        .bind(sku.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        let mut sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.active.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND is_active = ${param_count}"));
        }
        if query.low_stock {
            sql.push_str(" AND stock_quantity <= min_stock_level");
        }
        if query.category_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND category_id = ${param_count}"));
        }
        if query.search.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND (LOWER(name) LIKE ${param_count} ESCAPE '\\' OR LOWER(sku) LIKE ${param_count} ESCAPE '\\')"
            ));
        }

        sql.push_str(" ORDER BY name ASC, sku ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(active) = query.active {
            sqlx_query = sqlx_query.bind(active);
        }
        if let Some(category_id) = query.category_id {
            sqlx_query = sqlx_query.bind(category_id.as_uuid());
        }
        if let Some(ref term) = query.search {
            let escaped = term
                .to_lowercase()
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            sqlx_query = sqlx_query.bind(format!("%{escaped}%"));
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_product).collect()
    }
}

#[async_trait]
impl CustomerRepository for PostgresStore {
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    async fn find_customer_by_email(&self, email: &Email) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_customer).collect()
    }
}

#[async_trait]
impl StockMovementRepository for PostgresStore {
    async fn get_stock_movement(&self, id: StockMovementId) -> Result<Option<StockMovement>> {
        let row = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_movement).transpose()
    }

    async fn list_stock_movements(
        &self,
        product_id: Option<ProductId>,
    ) -> Result<Vec<StockMovement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE ($1::uuid IS NULL OR product_id = $1) \
             ORDER BY movement_date DESC, created_at DESC"
        ))
        .bind(product_id.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_movement).collect()
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        Ok(self.load_orders(rows).await?.into_iter().next())
    }

    async fn list_orders(&self, customer_id: Option<CustomerId>) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::uuid IS NULL OR customer_id = $1) \
             ORDER BY order_date DESC, order_number DESC"
        ))
        .bind(customer_id.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;
        self.load_orders(rows).await
    }

    async fn last_order_sequence(&self, year: i32) -> Result<Option<u32>> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(order_sequence) FROM orders WHERE order_year = $1")
                .bind(year)
                .fetch_one(&self.pool)
                .await?;
        max.map(|n| {
            u32::try_from(n).map_err(|e| StoreError::corrupt("order", format!("year {year}"), e))
        })
        .transpose()
    }

    async fn product_has_order_items(&self, product_id: ProductId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)",
        )
        .bind(product_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl InvoiceRepository for PostgresStore {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(self.load_invoices(rows).await?.into_iter().next())
    }

    async fn find_invoice_by_order(&self, order_id: OrderId) -> Result<Option<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(self.load_invoices(rows).await?.into_iter().next())
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY issue_date DESC, invoice_number DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        self.load_invoices(rows).await
    }

    async fn last_invoice_sequence(&self, year: i32) -> Result<Option<u32>> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(invoice_sequence) FROM invoices WHERE invoice_year = $1",
        )
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        max.map(|n| {
            u32::try_from(n)
                .map_err(|e| StoreError::corrupt("invoice", format!("year {year}"), e))
        })
        .transpose()
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn list_payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = $1 \
             ORDER BY payment_date ASC, created_at ASC"
        ))
        .bind(invoice_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_payment).collect()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let count = changes.len();

        // Start a transaction; dropping it on error rolls everything back.
        let mut tx = self.pool.begin().await?;
        for change in changes {
            apply(&mut *tx, change).await?;
        }
        tx.commit().await?;

        tracing::debug!(changes = count, "committed change set");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
