// HTTP surface: one POST endpoint per dataset, JSON in, wire payload out.
pub mod error;

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::dataset::market::{DEFAULT_DRIVER, earliest_date};
use crate::dataset::{Dataset, EconData, MarketData, OverlayData, WirePayload};
use crate::series::Periodicity;
use crate::source::{EconSource, InstrumentMetaStore, MarketSource};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub econ: Arc<dyn EconSource>,
    pub market: Arc<dyn MarketSource>,
    pub instruments: Arc<dyn InstrumentMetaStore>,
}

#[derive(Debug, Deserialize)]
pub struct EconRequest {
    pub series_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarketRequest {
    pub symbols: Vec<String>,
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    #[serde(default)]
    pub transformations: Option<Vec<Periodicity>>,
}

#[derive(Debug, Deserialize)]
pub struct OverlayRequest {
    pub econ_ids: Vec<String>,
    pub market_symbols: Vec<String>,
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub transformations: Option<Vec<Periodicity>>,
}

/// Drops blank identifiers (and surrounding whitespace).
fn clean_ids(ids: Vec<String>) -> Vec<String> {
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

fn default_transformations(requested: Option<Vec<Periodicity>>) -> Vec<Periodicity> {
    requested.unwrap_or_else(|| vec![Periodicity::YoY])
}

async fn econdata(
    State(state): State<AppState>,
    payload: Result<Json<EconRequest>, JsonRejection>,
) -> Result<Json<WirePayload>, ApiError> {
    let Json(request) = payload?;
    let ids = clean_ids(request.series_ids);
    info!("📨 /econdata for {:?}", ids);

    let mut data = EconData::new(ids).load(state.econ.as_ref()).await?;
    data.apply_transformations()?;
    Ok(Json(data.to_wire()))
}

async fn marketdata(
    State(state): State<AppState>,
    payload: Result<Json<MarketRequest>, JsonRejection>,
) -> Result<Json<WirePayload>, ApiError> {
    let Json(request) = payload?;
    let symbols = clean_ids(request.symbols);
    info!("📨 /marketdata for {:?}", symbols);

    let mut data = MarketData::new(symbols, request.from_date.unwrap_or_else(earliest_date))
        .with_transformations(default_transformations(request.transformations))
        .load(state.market.as_ref(), state.instruments.as_ref())
        .await?;
    data.apply_transformations()?;
    Ok(Json(data.to_wire()))
}

async fn overlay(
    State(state): State<AppState>,
    payload: Result<Json<OverlayRequest>, JsonRejection>,
) -> Result<Json<WirePayload>, ApiError> {
    let Json(request) = payload?;
    let econ_ids = clean_ids(request.econ_ids);
    let symbols = clean_ids(request.market_symbols);
    info!("📨 /overlay for {:?} + {:?}", econ_ids, symbols);

    let mut data = OverlayData::new(econ_ids, symbols, request.from_date.unwrap_or_else(earliest_date))
        .with_driver(request.driver.unwrap_or_else(|| DEFAULT_DRIVER.to_string()))
        .with_transformations(default_transformations(request.transformations))
        .load(state.econ.as_ref(), state.market.as_ref(), state.instruments.as_ref())
        .await?;
    data.apply_transformations()?;
    Ok(Json(data.to_wire()))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/econdata", post(econdata))
        .route("/marketdata", post(marketdata))
        .route("/overlay", post(overlay))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
