//! Customer endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CustomerId, Version};
use domain::Customer;
use serde::{Deserialize, Serialize};
use services::CustomerInput;
use store::Store;

use crate::dto::Envelope;
use crate::error::ApiError;
use crate::extract::{ApiJson, parse_id};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBody {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl From<CustomerBody> for CustomerInput {
    fn from(body: CustomerBody) -> Self {
        Self {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            phone: body.phone,
            address: body.address,
            city: body.city,
            postal_code: body.postal_code,
            country: body.country,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl From<Customer> for CustomerView {
    fn from(customer: Customer) -> Self {
        Self {
            id: customer.id,
            full_name: customer.full_name(),
            email: customer.email.as_str().to_string(),
            first_name: customer.first_name,
            last_name: customer.last_name,
            phone: customer.phone,
            address: customer.address,
            city: customer.city,
            postal_code: customer.postal_code,
            country: customer.country,
            created_at: customer.created_at,
            updated_at: customer.updated_at,
            version: customer.version,
        }
    }
}

pub async fn list<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<Envelope<Vec<CustomerView>>>, ApiError> {
    let customers = state.services.customers.list().await?;
    let views = customers.into_iter().map(CustomerView::from).collect();
    Ok(Envelope::ok(views, "Customers retrieved successfully"))
}

pub async fn get<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<CustomerView>>, ApiError> {
    let customer = state.services.customers.get(parse_id(&id)?).await?;
    Ok(Envelope::ok(customer.into(), "Customer retrieved successfully"))
}

pub async fn create<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiJson(body): ApiJson<CustomerBody>,
) -> Result<(StatusCode, Json<Envelope<CustomerView>>), ApiError> {
    let customer = state.services.customers.create(body.into()).await?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(customer.into(), "Customer created successfully"),
    ))
}

pub async fn update<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CustomerBody>,
) -> Result<Json<Envelope<CustomerView>>, ApiError> {
    let id = parse_id(&id)?;
    let customer = state.services.customers.update(id, body.into()).await?;
    Ok(Envelope::ok(customer.into(), "Customer updated successfully"))
}

pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.services.customers.delete(parse_id(&id)?).await?;
    Ok(Envelope::done("Customer deleted successfully"))
}
