// REST API endpoints for the drink menu

mod error;

pub use error::ApiError;

use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
    http::HeaderMap,
    response::Json,
    routing::{get, patch},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AuthorizationGate, DELETE_DRINKS, GET_DRINKS_DETAIL, PATCH_DRINKS, POST_DRINKS};
use crate::drinks::{DrinkStore, DrinkUpdate, NewDrink};

/// Shared handles for the request handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AuthorizationGate>,
    pub store: Arc<DrinkStore>,
}

impl AppState {
    pub fn new(gate: AuthorizationGate, store: DrinkStore) -> Self {
        Self {
            gate: Arc::new(gate),
            store: Arc::new(store),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/drinks", get(list_drinks).post(create_drink))
        .route("/drinks-detail", get(list_drinks_detail))
        .route("/drinks/{id}", patch(update_drink).delete(delete_drink))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("no such route".to_string())
}

async fn list_drinks(State(state): State<AppState>) -> Json<Value> {
    let drinks: Vec<Value> = state.store.list().await.iter().map(|d| d.short()).collect();
    Json(json!({ "success": true, "drinks": drinks }))
}

async fn list_drinks_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let _claims = state.gate.authorize(GET_DRINKS_DETAIL, &headers).await?;

    let drinks: Vec<Value> = state.store.list().await.iter().map(|d| d.long()).collect();
    Ok(Json(json!({ "success": true, "drinks": drinks })))
}

async fn create_drink(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<NewDrink>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    // Authorization is decided before the body is looked at.
    let claims = state.gate.authorize(POST_DRINKS, &headers).await?;
    let Json(new) = payload?;

    let drink = state.store.create(new).await?;
    info!("Drink {} created by {}", drink.id, claims.subject());

    Ok(Json(json!({ "success": true, "drinks": [drink.long()] })))
}

async fn update_drink(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<DrinkUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = state.gate.authorize(PATCH_DRINKS, &headers).await?;
    let Path(id) = id?;
    let Json(update) = payload?;

    let drink = state.store.update(id, update).await?;
    info!("Drink {} updated by {}", id, claims.subject());

    Ok(Json(json!({ "success": true, "drinks": [drink.long()] })))
}

async fn delete_drink(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = state.gate.authorize(DELETE_DRINKS, &headers).await?;
    let Path(id) = id?;

    state.store.delete(id).await?;
    info!("Drink {} deleted by {}", id, claims.subject());

    Ok(Json(json!({ "success": true, "delete": id })))
}
