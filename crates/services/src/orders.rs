//! Orders and their fulfillment.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use common::{CustomerId, OrderId, OrderItemId, ProductId, StockMovementId, Version};
use domain::{
    DocumentKind, DocumentNumber, DomainError, MovementReason, MovementType, Order, OrderItem,
    OrderParts, OrderStatus, Product, StockMovement, StockMovementParts,
};
use store::{ChangeSet, Store};

use crate::commands::{NewOrder, OrderChanges, clean};
use crate::error::{Result, ServiceError};

/// Service for orders.
///
/// Moving an order to `shipped` takes the goods out of stock: the order,
/// the products and one `out` movement per product are written in a single
/// commit, so a shortage on any line leaves everything untouched.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Orders, newest first, optionally for one customer.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, customer_id: Option<CustomerId>) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(customer_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Order> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", id))
    }

    /// Places an order.
    ///
    /// Unpriced lines take the product's current price. The order currency
    /// is the currency of the first line; every other line must match.
    #[tracing::instrument(skip(self, input), fields(customer_id = %input.customer_id, items = input.items.len()))]
    pub async fn create(&self, input: NewOrder) -> Result<Order> {
        if input.items.is_empty() {
            return Err(ServiceError::validation("An order needs at least one item"));
        }
        if self.store.get_customer(input.customer_id).await?.is_none() {
            return Err(ServiceError::not_found("customer", input.customer_id));
        }

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let product = self.product(line.product_id).await?;
            items.push(OrderItem::new(
                OrderItemId::new(),
                product.id,
                product.name.clone(),
                product.sku.to_string(),
                line.quantity,
                line.unit_price.unwrap_or(product.price),
            )?);
        }
        let currency = items[0].unit_price().currency();

        let now = Utc::now();
        let last = self.store.last_order_sequence(now.year()).await?;
        let order_number = DocumentNumber::next_after(DocumentKind::Order, now.year(), last)?;

        let mut order = Order::from_parts(OrderParts {
            id: OrderId::new(),
            order_number,
            customer_id: input.customer_id,
            currency,
            items,
            status: OrderStatus::Pending,
            order_date: now,
            shipping_date: None,
            delivery_date: None,
            notes: clean(input.notes),
            created_at: now,
            updated_at: None,
            version: Version::first(),
        })?;
        if let Some(status) = input.status
            && status != OrderStatus::Pending
        {
            order.transition_to(status, now)?;
            order.updated_at = None;
        }

        let mut changes = ChangeSet::new();
        changes.insert_order(&order);
        self.store.commit(changes).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount(),
            "order created"
        );
        Ok(order)
    }

    /// Changes the status and notes of an order. Absent fields are kept.
    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, id: OrderId, input: OrderChanges) -> Result<Order> {
        let mut order = self.get(id).await?;
        let mut changes = ChangeSet::new();
        let now = Utc::now();

        let mut shipped_lines = 0;
        if let Some(next) = input.status
            && order.transition_to(next, now)?
            && next == OrderStatus::Shipped
        {
            shipped_lines = self.take_out_of_stock(&order, now, &mut changes).await?;
        }
        if input.notes.is_some() {
            order.notes = clean(input.notes);
        }
        order.touch();

        changes.update_order(&mut order);
        self.store.commit(changes).await?;
        if shipped_lines > 0 {
            metrics::counter!("stock_movements_total", "type" => "out").increment(shipped_lines);
        }

        tracing::info!(order_id = %id, status = %order.status(), "order updated");
        Ok(order)
    }

    /// Deletes an order and its items. Invoiced orders cannot be deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: OrderId) -> Result<()> {
        let order = self.get(id).await?;
        if let Some(invoice) = self.store.find_invoice_by_order(id).await? {
            return Err(ServiceError::validation(format!(
                "Order {} is invoiced by {} and cannot be deleted",
                order.order_number, invoice.invoice_number
            )));
        }

        let mut changes = ChangeSet::new();
        changes.delete_order(&order);
        self.store.commit(changes).await?;
        Ok(())
    }

    /// Adds the product updates and `out` movements that ship `order`, and
    /// returns the number of movements added.
    async fn take_out_of_stock(
        &self,
        order: &Order,
        at: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> Result<u64> {
        let mut quantities: BTreeMap<ProductId, i64> = BTreeMap::new();
        for item in order.items() {
            let quantity = quantities.entry(item.product_id).or_default();
            *quantity = quantity
                .checked_add(item.quantity())
                .ok_or(DomainError::InvalidQuantity {
                    quantity: item.quantity(),
                    reason: "order quantities overflow when summed",
                })?;
        }

        let movements = quantities.len() as u64;
        for (product_id, quantity) in quantities {
            let mut product = self.product(product_id).await?;
            product.decrease_stock(quantity)?;

            let movement = StockMovement::new(StockMovementParts {
                id: StockMovementId::new(),
                product_id,
                movement_type: MovementType::Out,
                quantity,
                reason: MovementReason::Sale,
                unit_cost: None,
                reference: Some(order.order_number.to_string()),
                notes: None,
                movement_date: at,
                created_at: at,
                updated_at: None,
                version: Version::first(),
            })?;
            changes
                .update_product(&mut product)
                .insert_stock_movement(&movement);
        }
        Ok(movements)
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("product", id))
    }
}
