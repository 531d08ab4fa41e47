//! Directory listings with boost ranking applied.

use axum::Json;
use axum::extract::State;

use crate::boosts::{ItemType, apply_boosts};
use crate::catalog::{ApiListing, AppListing};
use crate::errors::ApiError;
use crate::state::SharedState;

pub async fn list_apps(
    State(state): State<SharedState>,
) -> Result<Json<Vec<AppListing>>, ApiError> {
    let mut apps = state.catalog.list_apps().await?;
    let boosts = state.boosts.active_boosts().await?;
    apply_boosts(&mut apps, &boosts, ItemType::App);
    Ok(Json(apps))
}

pub async fn list_apis(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ApiListing>>, ApiError> {
    let mut apis = state.catalog.list_apis().await?;
    let boosts = state.boosts.active_boosts().await?;
    apply_boosts(&mut apis, &boosts, ItemType::Api);
    Ok(Json(apis))
}
