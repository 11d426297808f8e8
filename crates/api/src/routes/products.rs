//! Product catalog endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CategoryId, Currency, ProductId, Version};
use domain::Product;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use services::ProductInput;
use store::{ProductQuery, Store};

use crate::dto::{Envelope, MoneyView, money};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery, parse_id};
use crate::state::SharedState;

/// Query string of `GET /api/products`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub active: Option<bool>,
    #[serde(default)]
    pub low_stock: bool,
    pub category_id: Option<CategoryId>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<ListQuery> for ProductQuery {
    fn from(q: ListQuery) -> Self {
        let mut query = ProductQuery::new();
        if let Some(active) = q.active {
            query = query.active(active);
        }
        if q.low_stock {
            query = query.low_stock();
        }
        if let Some(category_id) = q.category_id {
            query = query.category(category_id);
        }
        if let Some(search) = q.search {
            query = query.search(search);
        }
        if let Some(limit) = q.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = q.offset {
            query = query.offset(offset);
        }
        query
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBody {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: Option<Currency>,
    /// Zero on create when absent; the current stock is kept on update.
    pub stock: Option<i64>,
    pub min_stock_level: Option<i64>,
    /// Active on create when absent; the current flag is kept on update.
    pub active: Option<bool>,
    pub category_id: Option<CategoryId>,
}

impl ProductBody {
    fn into_input(self, default_currency: Currency) -> Result<ProductInput, ApiError> {
        let price = money(self.price, self.currency.unwrap_or(default_currency))?;
        Ok(ProductInput {
            name: self.name,
            sku: self.sku,
            description: self.description,
            price,
            stock: self.stock,
            min_stock_level: self.min_stock_level,
            is_active: self.active,
            category_id: self.category_id,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub price: MoneyView,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
    pub is_active: bool,
    pub is_available: bool,
    pub is_low_stock: bool,
    pub is_out_of_stock: bool,
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            sku: product.sku.as_str().to_string(),
            price: product.price.into(),
            stock_quantity: product.stock_quantity(),
            min_stock_level: product.min_stock_level(),
            is_available: product.is_available(),
            is_low_stock: product.is_low_stock(),
            is_out_of_stock: product.is_out_of_stock(),
            is_active: product.is_active,
            category_id: product.category_id,
            created_at: product.created_at,
            updated_at: product.updated_at,
            version: product.version,
            description: product.description,
            name: product.name,
        }
    }
}

pub async fn list<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Envelope<Vec<ProductView>>>, ApiError> {
    let products = state.services.catalog.list_products(query.into()).await?;
    let views = products.into_iter().map(ProductView::from).collect();
    Ok(Envelope::ok(views, "Products retrieved successfully"))
}

pub async fn get<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ProductView>>, ApiError> {
    let product = state.services.catalog.get_product(parse_id(&id)?).await?;
    Ok(Envelope::ok(product.into(), "Product retrieved successfully"))
}

pub async fn create<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiJson(body): ApiJson<ProductBody>,
) -> Result<(StatusCode, Json<Envelope<ProductView>>), ApiError> {
    let input = body.into_input(state.default_currency)?;
    let product = state.services.catalog.create_product(input).await?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(product.into(), "Product created successfully"),
    ))
}

pub async fn update<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ProductBody>,
) -> Result<Json<Envelope<ProductView>>, ApiError> {
    let id = parse_id(&id)?;
    let input = body.into_input(state.default_currency)?;
    let product = state.services.catalog.update_product(id, input).await?;
    Ok(Envelope::ok(product.into(), "Product updated successfully"))
}

pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.services.catalog.delete_product(parse_id(&id)?).await?;
    Ok(Envelope::done("Product deleted successfully"))
}
