use super::error::ApiError;
use super::state::{AppState, MaybeUser, User};
use crate::error::ScanError;
use crate::menu::{MenuItem, MenuItemCandidate, MenuItemUpdate, NewMenuItem};
use crate::quota::UsageSnapshot;
use crate::ratings::{ItemSummary, TastingLog, TastingRecord};
use crate::reconcile::{apply_reconciliation, reconcile, BatchReport, Reconciliation};
use crate::store::{MenuItemStore, TastingStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

type AppResult<T> = Result<T, ApiError>;

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ── AI extraction and quota ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiMenuRequest {
    #[serde(default)]
    image_base64: Option<String>,
}

pub async fn gemini_menu_handler(
    State(state): State<Arc<AppState>>,
    User(account): User,
    Json(payload): Json<GeminiMenuRequest>,
) -> AppResult<Json<Vec<MenuItemCandidate>>> {
    let image = payload
        .image_base64
        .ok_or_else(|| ApiError::BadRequest("imageBase64 is required".into()))?;
    let items = state.ai.extract(&account, &image).await?;
    Ok(Json(items))
}

pub async fn usage_handler(
    State(state): State<Arc<AppState>>,
    MaybeUser(account): MaybeUser,
) -> AppResult<Json<UsageSnapshot>> {
    Ok(Json(state.ai.quota().snapshot(account.as_ref())?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    user_id: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    success: bool,
}

pub async fn admin_reset_handler(
    State(state): State<Arc<AppState>>,
    MaybeUser(account): MaybeUser,
    Json(payload): Json<ResetRequest>,
) -> Json<SuccessResponse> {
    let success = match account {
        Some(admin) => reset_succeeded(state.ai.quota().reset(&admin, &payload.user_id), &payload.user_id),
        None => false,
    };
    Json(SuccessResponse { success })
}

/// Non-admins get a quiet `false`; store failures are logged before the same answer.
fn reset_succeeded(result: Result<(), ScanError>, user_id: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(ScanError::Forbidden(_)) => false,
        Err(e) => {
            warn!("Usage reset for {} failed: {}", user_id, e);
            false
        }
    }
}

// ── Menu items ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantQuery {
    #[serde(default)]
    restaurant_id: Option<String>,
}

pub async fn list_items_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RestaurantQuery>,
) -> AppResult<Json<Vec<MenuItem>>> {
    let restaurant_id = query
        .restaurant_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing restaurantId".into()))?;
    Ok(Json(state.store.list_menu_items(&restaurant_id)?))
}

pub async fn create_item_handler(
    State(state): State<Arc<AppState>>,
    User(account): User,
    Json(item): Json<NewMenuItem>,
) -> AppResult<impl IntoResponse> {
    let created = state.store.create_menu_item(&item, Some(&account.id))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_item_handler(
    State(state): State<Arc<AppState>>,
    User(_account): User,
    Json(update): Json<MenuItemUpdate>,
) -> AppResult<Json<MenuItem>> {
    if update.id.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing fields".into()));
    }
    Ok(Json(state.store.replace_menu_item(&update)?))
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    id: String,
}

pub async fn delete_item_handler(
    State(state): State<Arc<AppState>>,
    User(_account): User,
    Json(payload): Json<DeleteRequest>,
) -> AppResult<StatusCode> {
    if payload.id.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing id".into()));
    }
    state.store.delete_menu_item(&payload.id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatesRequest {
    #[serde(default)]
    restaurant_id: String,
    #[serde(default)]
    candidates: Vec<MenuItemCandidate>,
}

impl CandidatesRequest {
    fn restaurant_id(&self) -> AppResult<&str> {
        let id = self.restaurant_id.trim();
        if id.is_empty() {
            return Err(ApiError::BadRequest("Missing restaurantId".into()));
        }
        Ok(id)
    }
}

pub async fn reconcile_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CandidatesRequest>,
) -> AppResult<Json<Reconciliation>> {
    let existing = state.store.list_menu_items(payload.restaurant_id()?)?;
    Ok(Json(reconcile(&payload.candidates, &existing)))
}

pub async fn batch_handler(
    State(state): State<Arc<AppState>>,
    User(account): User,
    Json(payload): Json<CandidatesRequest>,
) -> AppResult<Json<BatchReport>> {
    let restaurant_id = payload.restaurant_id()?;
    let existing = state.store.list_menu_items(restaurant_id)?;
    let reconciliation = reconcile(&payload.candidates, &existing);
    let report = apply_reconciliation(
        state.store.as_ref(),
        restaurant_id,
        &account.id,
        &reconciliation,
        state.config.progress_callback.as_ref(),
    )?;
    Ok(Json(report))
}

// ── Restaurant views and tastings ────────────────────────────────────────

pub async fn restaurant_menu_handler(
    State(state): State<Arc<AppState>>,
    Path(restaurant_id): Path<String>,
) -> AppResult<Json<Vec<ItemSummary>>> {
    Ok(Json(state.store.menu_summaries(&restaurant_id)?))
}

pub async fn restaurant_tastings_handler(
    State(state): State<Arc<AppState>>,
    User(account): User,
    Path(restaurant_id): Path<String>,
) -> AppResult<Json<TastingLog>> {
    Ok(Json(state.store.tasting_log(&account.id, &restaurant_id)?))
}

pub async fn put_tasting_handler(
    State(state): State<Arc<AppState>>,
    User(account): User,
    Path(item_id): Path<String>,
    Json(record): Json<TastingRecord>,
) -> AppResult<Json<TastingRecord>> {
    Ok(Json(state.store.put_tasting(&account.id, &item_id, &record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn reset_outcome_only_succeeds_on_ok() {
        assert!(reset_succeeded(Ok(()), "u1"));
        assert!(!reset_succeeded(Err(ScanError::Forbidden("admin only".into())), "u1"));
        assert!(!reset_succeeded(Err(ScanError::Store(StoreError::Poisoned)), "u1"));
    }
}
