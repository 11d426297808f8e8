//! Order endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Currency, CustomerId, OrderId, OrderItemId, ProductId, Version};
use domain::{Order, OrderItem, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use services::{NewOrder, NewOrderItem, OrderChanges};
use store::Store;

use crate::dto::{Envelope, MoneyView, money};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery, parse_id};
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub customer_id: Option<CustomerId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Option<Decimal>,
    /// Currency of `unitPrice`; the product's price currency when absent.
    pub currency: Option<Currency>,
}

/// Body of `POST /api/orders`. Totals are always computed server-side, so
/// a client-sent `totalAmount` is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBody {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub items: Vec<ItemBody>,
    pub status: Option<OrderStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderChangesBody {
    pub status: Option<OrderStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub quantity: i64,
    pub unit_price: MoneyView,
    pub total_price: MoneyView,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            sku: item.sku.clone(),
            quantity: item.quantity(),
            unit_price: item.unit_price().into(),
            total_price: item.total_price().into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItemView>,
    pub total_amount: MoneyView,
    pub total_quantity: i64,
    pub order_date: DateTime<Utc>,
    pub shipping_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number.to_string(),
            customer_id: order.customer_id,
            status: order.status(),
            items: order.items().iter().map(OrderItemView::from).collect(),
            total_amount: order.total_amount().into(),
            total_quantity: order.total_quantity(),
            order_date: order.order_date,
            shipping_date: order.shipping_date(),
            delivery_date: order.delivery_date(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            version: order.version,
            notes: order.notes,
        }
    }
}

pub async fn list<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Envelope<Vec<OrderView>>>, ApiError> {
    let orders = state.services.orders.list(query.customer_id).await?;
    let views = orders.into_iter().map(OrderView::from).collect();
    Ok(Envelope::ok(views, "Orders retrieved successfully"))
}

pub async fn get<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<OrderView>>, ApiError> {
    let order = state.services.orders.get(parse_id(&id)?).await?;
    Ok(Envelope::ok(order.into(), "Order retrieved successfully"))
}

pub async fn create<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiJson(body): ApiJson<OrderBody>,
) -> Result<(StatusCode, Json<Envelope<OrderView>>), ApiError> {
    let mut items = Vec::with_capacity(body.items.len());
    for item in body.items {
        let unit_price = match item.unit_price {
            Some(amount) => {
                let currency = match item.currency {
                    Some(currency) => currency,
                    None => {
                        let product = state.services.catalog.get_product(item.product_id).await?;
                        product.price.currency()
                    }
                };
                Some(money(amount, currency)?)
            }
            None => None,
        };
        items.push(NewOrderItem {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price,
        });
    }

    let input = NewOrder {
        customer_id: body.customer_id,
        items,
        status: body.status,
        notes: body.notes,
    };
    let order = state.services.orders.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(order.into(), "Order created successfully"),
    ))
}

pub async fn update<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<OrderChangesBody>,
) -> Result<Json<Envelope<OrderView>>, ApiError> {
    let id = parse_id(&id)?;
    let changes = OrderChanges {
        status: body.status,
        notes: body.notes,
    };
    let order = state.services.orders.update(id, changes).await?;
    Ok(Envelope::ok(order.into(), "Order updated successfully"))
}

pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.services.orders.delete(parse_id(&id)?).await?;
    Ok(Envelope::done("Order deleted successfully"))
}
