use axum::{Extension, Json};

use crate::auth::Principal;
use crate::dto::Envelope;

/// Returns the principal the bearer token resolved to.
pub async fn me(Extension(principal): Extension<Principal>) -> Json<Envelope<Principal>> {
    Envelope::ok(principal, "Authenticated")
}
