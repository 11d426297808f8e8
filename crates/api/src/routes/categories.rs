//! Category hierarchy endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CategoryId, Version};
use serde::{Deserialize, Serialize};
use services::{CategoryDetails, CategoryInput};
use store::Store;

use crate::dto::Envelope;
use crate::error::ApiError;
use crate::extract::{ApiJson, parse_id};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBody {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub position: i32,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl From<CategoryBody> for CategoryInput {
    fn from(body: CategoryBody) -> Self {
        Self {
            name: body.name,
            slug: body.slug,
            description: body.description,
            parent_id: body.parent_id,
            position: body.position,
            is_active: body.active,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub position: i32,
    pub is_active: bool,
    /// Depth in the tree; root categories are at level 0.
    pub level: usize,
    /// Names from the root down, joined with `" > "`.
    pub full_path: String,
    pub is_leaf: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl From<CategoryDetails> for CategoryView {
    fn from(details: CategoryDetails) -> Self {
        let c = details.category;
        Self {
            id: c.id,
            slug: c.slug.as_str().to_string(),
            name: c.name,
            description: c.description,
            parent_id: c.parent_id,
            position: c.position,
            is_active: c.is_active,
            level: details.level,
            full_path: details.full_path,
            is_leaf: details.is_leaf,
            created_at: c.created_at,
            updated_at: c.updated_at,
            version: c.version,
        }
    }
}

pub async fn list<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
) -> Result<Json<Envelope<Vec<CategoryView>>>, ApiError> {
    let categories = state.services.catalog.list_categories().await?;
    let views = categories.into_iter().map(CategoryView::from).collect();
    Ok(Envelope::ok(views, "Categories retrieved successfully"))
}

pub async fn get<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<CategoryView>>, ApiError> {
    let category = state.services.catalog.get_category(parse_id(&id)?).await?;
    Ok(Envelope::ok(category.into(), "Category retrieved successfully"))
}

pub async fn create<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    ApiJson(body): ApiJson<CategoryBody>,
) -> Result<(StatusCode, Json<Envelope<CategoryView>>), ApiError> {
    let category = state.services.catalog.create_category(body.into()).await?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(category.into(), "Category created successfully"),
    ))
}

pub async fn update<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CategoryBody>,
) -> Result<Json<Envelope<CategoryView>>, ApiError> {
    let id = parse_id(&id)?;
    let category = state.services.catalog.update_category(id, body.into()).await?;
    Ok(Envelope::ok(category.into(), "Category updated successfully"))
}

pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state.services.catalog.delete_category(parse_id(&id)?).await?;
    Ok(Envelope::done("Category deleted successfully"))
}
