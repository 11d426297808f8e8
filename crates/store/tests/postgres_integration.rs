//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate every table
//! before each test, so they run serially.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{
    CategoryId, Currency, CustomerId, InvoiceId, InvoiceLineId, Money, OrderId, OrderItemId,
    PaymentId, ProductId, StockMovementId, Version,
};
use domain::{
    Category, CategoryTree, Customer, DocumentKind, DocumentNumber, Email, Invoice, InvoiceLine,
    InvoiceParts, InvoiceStatus, MovementReason, MovementType, Order, OrderItem, OrderParts,
    OrderStatus, Payment, PaymentMethod, PaymentParts, PaymentStatus, Product, ProductParts, Sku,
    Slug, StockMovement, StockMovementParts,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CategoryRepository, ChangeSet, CustomerRepository, InvoiceRepository, OrderRepository,
    PaymentRepository, PostgresStore, ProductQuery, ProductRepository, StockMovementRepository,
    Store, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_initial_schema.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and emptied tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE payments, invoice_lines, invoices, order_items, orders, \
         stock_movements, customers, products, categories CASCADE",
    )
    .execute(store.pool())
    .await
    .unwrap();

    store
}

fn eur(minor: i64) -> Money {
    Money::from_minor_units(minor, Currency::EUR)
}

fn product(name: &str, sku: &str, stock: i64) -> Product {
    Product::from_parts(ProductParts {
        id: ProductId::new(),
        name: name.into(),
        description: None,
        sku: Sku::parse(sku).unwrap(),
        category_id: None,
        price: eur(2_500),
        stock_quantity: stock,
        min_stock_level: 5,
        is_active: true,
        created_at: Utc::now(),
        updated_at: None,
        version: Version::first(),
    })
}

fn customer(email: &str) -> Customer {
    Customer {
        id: CustomerId::new(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: Email::parse(email).unwrap(),
        phone: None,
        address: None,
        city: Some("London".into()),
        postal_code: None,
        country: None,
        created_at: Utc::now(),
        updated_at: None,
        version: Version::first(),
    }
}

fn order(customer: &Customer, product: &Product, quantity: i64, sequence: u32) -> Order {
    let item = OrderItem::new(
        OrderItemId::new(),
        product.id,
        product.name.clone(),
        product.sku.as_str(),
        quantity,
        product.price,
    )
    .unwrap();
    Order::from_parts(OrderParts {
        id: OrderId::new(),
        order_number: DocumentNumber::new(DocumentKind::Order, 2026, sequence).unwrap(),
        customer_id: customer.id,
        currency: Currency::EUR,
        items: vec![item],
        status: OrderStatus::Pending,
        order_date: Utc::now(),
        shipping_date: None,
        delivery_date: None,
        notes: None,
        created_at: Utc::now(),
        updated_at: None,
        version: Version::first(),
    })
    .unwrap()
}

fn invoice(order: &Order, sequence: u32) -> Invoice {
    let lines = order
        .items()
        .iter()
        .map(|item| {
            InvoiceLine::new(
                InvoiceLineId::new(),
                item.product_name.clone(),
                Some(item.product_id),
                item.quantity(),
                item.unit_price(),
            )
            .unwrap()
        })
        .collect();
    let issue_date = Utc::now();
    Invoice::from_parts(InvoiceParts {
        id: InvoiceId::new(),
        invoice_number: DocumentNumber::new(DocumentKind::Invoice, 2026, sequence).unwrap(),
        order_id: order.id,
        currency: Currency::EUR,
        lines,
        tax_amount: eur(0),
        status: InvoiceStatus::Sent,
        issue_date,
        due_date: Invoice::default_due_date(issue_date),
        paid_date: None,
        notes: None,
        created_at: issue_date,
        updated_at: None,
        version: Version::first(),
    })
    .unwrap()
}

async fn insert_basics(store: &PostgresStore) -> (Product, Customer) {
    let p = product("Wireless Mouse", "WM-100", 20);
    let c = customer("ada@example.com");
    let mut changes = ChangeSet::new();
    changes.insert_product(&p).insert_customer(&c);
    store.commit(changes).await.unwrap();
    (p, c)
}

mod products {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn insert_and_read_back() {
        let store = get_test_store().await;
        let (p, _) = insert_basics(&store).await;

        let loaded = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(loaded.sku, p.sku);
        assert_eq!(loaded.price, p.price);
        assert_eq!(loaded.stock_quantity(), 20);
        assert_eq!(loaded.min_stock_level(), 5);
        assert_eq!(loaded.version, Version::first());

        let by_sku = store
            .find_product_by_sku(&Sku::parse("wm-100").unwrap())
            .await
            .unwrap();
        assert_eq!(by_sku.map(|p| p.id), Some(p.id));
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_sku_is_a_unique_violation() {
        let store = get_test_store().await;
        insert_basics(&store).await;

        let mut changes = ChangeSet::new();
        changes.insert_product(&product("Other Mouse", "WM-100", 1));
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { key, .. } if key == "products_sku_key"));
    }

    #[tokio::test]
    #[serial]
    async fn stale_update_conflicts() {
        let store = get_test_store().await;
        let (p, _) = insert_basics(&store).await;

        let mut first = p.clone();
        let mut second = p.clone();

        first.decrease_stock(5).unwrap();
        let mut changes = ChangeSet::new();
        changes.update_product(&mut first);
        store.commit(changes).await.unwrap();

        second.decrease_stock(3).unwrap();
        let mut changes = ChangeSet::new();
        changes.update_product(&mut second);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { expected, actual, .. }
                if expected == Version::first() && actual == Version::new(2)
        ));

        let stored = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity(), 15);
    }

    #[tokio::test]
    #[serial]
    async fn failed_commit_rolls_back_every_change() {
        let store = get_test_store().await;
        let (p, _) = insert_basics(&store).await;

        let fresh = product("Keyboard", "KB-1", 3);
        let mut stale = p.clone();
        stale.version = Version::new(7);
        let mut changes = ChangeSet::new();
        changes.insert_product(&fresh).update_product(&mut stale);
        assert!(store.commit(changes).await.is_err());

        assert!(store.get_product(fresh.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn listing_filters_and_escapes_search() {
        let store = get_test_store().await;
        let mut changes = ChangeSet::new();
        changes
            .insert_product(&product("Cable 100%", "CB-1", 2))
            .insert_product(&product("Cable Tester", "CB-2", 50))
            .insert_product(&product("Adapter", "AD_1", 0));
        store.commit(changes).await.unwrap();

        let low = store
            .list_products(ProductQuery::new().low_stock())
            .await
            .unwrap();
        let names: Vec<_> = low.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Adapter", "Cable 100%"]);

        let percent = store
            .list_products(ProductQuery::new().search("100%"))
            .await
            .unwrap();
        assert_eq!(percent.len(), 1);

        let underscore = store
            .list_products(ProductQuery::new().search("d_"))
            .await
            .unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].sku.as_str(), "AD_1");

        let page = store
            .list_products(ProductQuery::new().limit(1).offset(1))
            .await
            .unwrap();
        assert_eq!(page[0].name, "Cable 100%");
    }

    #[tokio::test]
    #[serial]
    async fn deleting_a_product_cascades_its_movements() {
        let store = get_test_store().await;
        let (p, _) = insert_basics(&store).await;

        let movement = StockMovement::new(StockMovementParts {
            id: StockMovementId::new(),
            product_id: p.id,
            movement_type: MovementType::In,
            quantity: 4,
            reason: MovementReason::Purchase,
            unit_cost: Some(eur(900)),
            reference: Some("PO-1".into()),
            notes: None,
            movement_date: Utc::now(),
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        })
        .unwrap();
        let mut changes = ChangeSet::new();
        changes.insert_stock_movement(&movement);
        store.commit(changes).await.unwrap();

        let loaded = store.get_stock_movement(movement.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_cost(), Some(eur(3_600)));
        assert_eq!(loaded.reason, MovementReason::Purchase);

        let mut changes = ChangeSet::new();
        changes.delete_product(&p);
        store.commit(changes).await.unwrap();

        assert!(store.list_stock_movements(None).await.unwrap().is_empty());
    }
}

mod documents {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn order_round_trip_and_item_replacement() {
        let store = get_test_store().await;
        let (p, c) = insert_basics(&store).await;
        let mut o = order(&c, &p, 2, 1);

        let mut changes = ChangeSet::new();
        changes.insert_order(&o);
        store.commit(changes).await.unwrap();

        let loaded = store.get_order(o.id).await.unwrap().unwrap();
        assert_eq!(loaded.order_number.to_string(), "ORD-2026-001");
        assert_eq!(loaded.items().len(), 1);
        assert_eq!(loaded.total_amount(), eur(5_000));

        o.transition_to(OrderStatus::Confirmed, Utc::now()).unwrap();
        o.notes = Some("gift wrap".into());
        let mut changes = ChangeSet::new();
        changes.update_order(&mut o);
        store.commit(changes).await.unwrap();

        let loaded = store.get_order(o.id).await.unwrap().unwrap();
        assert_eq!(loaded.status(), OrderStatus::Confirmed);
        assert_eq!(loaded.notes.as_deref(), Some("gift wrap"));
        assert_eq!(loaded.items().len(), 1);
        assert_eq!(loaded.version, Version::new(2));

        assert_eq!(store.last_order_sequence(2026).await.unwrap(), Some(1));
        assert_eq!(store.last_order_sequence(2025).await.unwrap(), None);
        assert!(store.product_has_order_items(p.id).await.unwrap());
        assert_eq!(store.list_orders(Some(c.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn referenced_rows_cannot_be_deleted() {
        let store = get_test_store().await;
        let (p, c) = insert_basics(&store).await;
        let o = order(&c, &p, 1, 1);
        let mut changes = ChangeSet::new();
        changes.insert_order(&o);
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.delete_product(&p);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::ReferenceViolation { .. }));

        let mut changes = ChangeSet::new();
        changes.delete_customer(&c);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::ReferenceViolation { .. }));

        assert!(store.get_customer(c.id).await.unwrap().is_some());
    }

    #[tokio::test]
    #[serial]
    async fn invoice_with_payment() {
        let store = get_test_store().await;
        let (p, c) = insert_basics(&store).await;
        let o = order(&c, &p, 3, 1);
        let i = invoice(&o, 1);
        let payment = Payment::new(PaymentParts {
            id: PaymentId::new(),
            invoice_id: i.id,
            amount: eur(7_500),
            status: PaymentStatus::Completed,
            method: PaymentMethod::BankTransfer,
            transaction_id: Some("TX-9".into()),
            payment_date: Utc::now(),
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        })
        .unwrap();

        let mut changes = ChangeSet::new();
        changes
            .insert_order(&o)
            .insert_invoice(&i)
            .insert_payment(&payment);
        store.commit(changes).await.unwrap();

        let loaded = store.find_invoice_by_order(o.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, i.id);
        assert_eq!(loaded.lines().len(), 1);
        assert_eq!(loaded.total_amount(), eur(7_500));
        assert_eq!(store.last_invoice_sequence(2026).await.unwrap(), Some(1));

        let payments = store.list_payments(i.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].method, PaymentMethod::BankTransfer);
        assert!(loaded.is_settled_by(&payments).unwrap());

        let second = invoice(&o, 2);
        let mut changes = ChangeSet::new();
        changes.insert_invoice(&second);
        let err = store.commit(changes).await.unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueViolation { key, .. } if key == "invoices_order_id_key")
        );
    }

    #[tokio::test]
    #[serial]
    async fn deleting_unknown_rows_is_not_found() {
        let store = get_test_store().await;
        let c = customer("nobody@example.com");

        let mut changes = ChangeSet::new();
        changes.delete_customer(&c);
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "customer", .. }));
    }

    #[tokio::test]
    #[serial]
    async fn ping_succeeds() {
        let store = get_test_store().await;
        store.ping().await.unwrap();
        assert!(store.list_customers().await.unwrap().is_empty());
    }
}

mod categories {
    use super::*;

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
    #[serial]
    async fn concurrent_crossed_reparents_leave_a_tree() {
        let store = get_test_store().await;
        let a = category("Alpha");
        let b = category("Beta");
        let mut changes = ChangeSet::new();
        changes.insert_category(&a).insert_category(&b);
        store.commit(changes).await.unwrap();

        let mut a_under_b = a.clone();
        a_under_b.parent_id = Some(b.id);
        let mut b_under_a = b.clone();
        b_under_a.parent_id = Some(a.id);
        let mut first = ChangeSet::new();
        first.update_category(&mut a_under_b);
        let mut second = ChangeSet::new();
        second.update_category(&mut b_under_a);

        let (r1, r2) = tokio::join!(store.commit(first), store.commit(second));
        let failures: Vec<_> = [r1, r2].into_iter().filter_map(Result::err).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], StoreError::Cycle { entity: "category", .. }));

        let categories = store.list_categories().await.unwrap();
        let tree = CategoryTree::new(&categories);
        assert!(tree.level(a.id).is_ok());
        assert!(tree.level(b.id).is_ok());
    }
}
