//! Stock ledger endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Currency, Money, ProductId, StockMovementId, Version};
use domain::{MovementReason, MovementType, StockMovement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use services::{NewStockMovement, StockMovementChanges};
use store::Store;

use crate::dto::{Envelope, MoneyView, money};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery, parse_id};
use crate::state::{AppState, SharedState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub product_id: Option<ProductId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementBody {
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reason: Option<MovementReason>,
    pub reference: Option<String>,
    pub unit_cost: Option<Decimal>,
    /// Currency of `unitCost`; the product's price currency when absent.
    pub currency: Option<Currency>,
    pub notes: Option<String>,
    pub movement_date: Option<DateTime<Utc>>,
}

/// Body of `PUT /api/stock-movements/{id}`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementChangesBody {
    pub product_id: Option<ProductId>,
    #[serde(rename = "type")]
    pub movement_type: Option<MovementType>,
    pub quantity: Option<i64>,
    pub reason: Option<MovementReason>,
    pub reference: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub currency: Option<Currency>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementView {
    pub id: StockMovementId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reason: MovementReason,
    pub reference: Option<String>,
    pub unit_cost: Option<MoneyView>,
    pub total_cost: Option<MoneyView>,
    pub notes: Option<String>,
    pub movement_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl From<StockMovement> for MovementView {
    fn from(movement: StockMovement) -> Self {
        Self {
            id: movement.id,
            product_id: movement.product_id(),
            movement_type: movement.movement_type(),
            quantity: movement.quantity(),
            unit_cost: movement.unit_cost().map(MoneyView::from),
            total_cost: movement.total_cost().map(MoneyView::from),
            reason: movement.reason,
            reference: movement.reference,
            notes: movement.notes,
            movement_date: movement.movement_date,
            created_at: movement.created_at,
            updated_at: movement.updated_at,
            version: movement.version,
        }
    }
}

/// Converts a unit cost, defaulting its currency to the product's.
async fn unit_cost<S: Store + Clone>(
    state: &AppState<S>,
    product_id: ProductId,
    amount: Option<Decimal>,
    currency: Option<Currency>,
) -> Result<Option<Money>, ApiError> {
    let Some(amount) = amount else {
        return Ok(None);
    };
    let currency = match currency {
        Some(currency) => currency,
        None => state.services.catalog.get_product(product_id).await?.price.currency(),
    };
    Ok(Some(money(amount, currency)?))
}

pub async fn list<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Envelope<Vec<MovementView>>>, ApiError> {
    let movements = state.services.stock.list(query.product_id).await?;
    let views = movements.into_iter().map(MovementView::from).collect();
    Ok(Envelope::ok(views, "Stock movements retrieved successfully"))
}

pub async fn get<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<MovementView>>, ApiError> {
    let movement = state.services.stock.get(parse_id(&id)?).await?;
    Ok(Envelope::ok(movement.into(), "Stock movement retrieved successfully"))
}

pub async fn create<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiJson(body): ApiJson<MovementBody>,
) -> Result<(StatusCode, Json<Envelope<MovementView>>), ApiError> {
    let unit_cost = unit_cost(&state, body.product_id, body.unit_cost, body.currency).await?;
    let input = NewStockMovement {
        product_id: body.product_id,
        movement_type: body.movement_type,
        quantity: body.quantity,
        reason: body.reason,
        reference: body.reference,
        unit_cost,
        notes: body.notes,
        movement_date: body.movement_date,
    };
    let movement = state.services.stock.record(input).await?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(movement.into(), "Stock movement created successfully"),
    ))
}

pub async fn update<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<MovementChangesBody>,
) -> Result<Json<Envelope<MovementView>>, ApiError> {
    let id = parse_id(&id)?;
    let unit_cost = match body.unit_cost {
        Some(_) => {
            let product_id = state.services.stock.get(id).await?.product_id();
            unit_cost(&state, product_id, body.unit_cost, body.currency).await?
        }
        None => None,
    };
    let changes = StockMovementChanges {
        reason: body.reason,
        reference: body.reference,
        notes: body.notes,
        unit_cost,
        product_id: body.product_id,
        movement_type: body.movement_type,
        quantity: body.quantity,
    };
    let movement = state.services.stock.update(id, changes).await?;
    Ok(Envelope::ok(movement.into(), "Stock movement updated successfully"))
}

pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.services.stock.delete(parse_id(&id)?).await?;
    Ok(Envelope::done("Stock movement deleted successfully"))
}
