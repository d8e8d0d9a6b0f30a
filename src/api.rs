//! JSON API over the listing store.
//!
//! Every handler blocks its request until the work is done; store and
//! scrape work runs on the blocking pool.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::common_scraper::{ingest_and_store, IngestionOptions, DEFAULT_PAGES};
use crate::error::AppError;
use crate::models::ListingRecord;
use crate::scrapers::SourceProvider;
use crate::store::{GroupField, Store};

pub const MAX_PAGES: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub provider: Arc<dyn SourceProvider>,
    pub next_scheduled_run: Option<Arc<Mutex<Option<DateTime<Utc>>>>>,
}

impl AppState {
    pub fn new(store: Arc<Store>, provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            store,
            provider,
            next_scheduled_run: None,
        }
    }

    pub fn with_schedule(mut self, next_run: Arc<Mutex<Option<DateTime<Utc>>>>) -> Self {
        self.next_scheduled_run = Some(next_run);
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapeRequest {
    #[serde(default)]
    pub source_key: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub message: String,
    /// Newly inserted listings.
    pub data_count: usize,
    /// Listings found on the fetched pages, new or not.
    pub found_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub total: u64,
    pub statistics: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub total: u64,
    pub next_scheduled_run: Option<DateTime<Utc>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape", post(scrape_handler))
        .route("/houses", get(houses_handler))
        .route("/statistics", get(statistics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")
}

async fn scrape_handler(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Json<ScrapeResponse>, AppError> {
    let request = match payload {
        Ok(Json(request)) => request,
        // No JSON body at all reads as an empty request.
        Err(JsonRejection::MissingJsonContentType(_)) => ScrapeRequest::default(),
        Err(rejection) => return Err(AppError::validation(rejection.body_text())),
    };
    let source_key = request
        .source_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AppError::validation("source_key is required"))?;
    let pages = request.pages.unwrap_or(DEFAULT_PAGES);
    if !(1..=MAX_PAGES).contains(&pages) {
        return Err(AppError::validation(format!(
            "pages must be between 1 and {}, got {}",
            MAX_PAGES, pages
        )));
    }

    info!("Scrape requested for {} ({} pages)", source_key, pages);
    let outcome = tokio::task::spawn_blocking(move || {
        let source = state.provider.open(&source_key)?;
        ingest_and_store(
            &state.store,
            source.as_ref(),
            &IngestionOptions::with_pages(pages),
            None,
        )
    })
    .await??;

    let message = if outcome.found == 0 {
        "No listings found.".to_string()
    } else {
        format!(
            "Scraped and saved: {} new of {} found.",
            outcome.inserted, outcome.found
        )
    };
    info!("{}", message);

    Ok(Json(ScrapeResponse {
        message,
        data_count: outcome.inserted,
        found_count: outcome.found,
    }))
}

async fn houses_handler(State(state): State<AppState>) -> Result<Json<Vec<ListingRecord>>, AppError> {
    let houses = tokio::task::spawn_blocking(move || state.store.list_all()).await??;
    Ok(Json(houses))
}

async fn statistics_handler(
    State(state): State<AppState>,
) -> Result<Json<StatisticsResponse>, AppError> {
    let (total, statistics) =
        tokio::task::spawn_blocking(move || state.store.group_summary(GroupField::RoomType))
            .await??;

    Ok(Json(StatisticsResponse { total, statistics }))
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let next_scheduled_run = state
        .next_scheduled_run
        .as_ref()
        .and_then(|cell| cell.lock().ok().and_then(|next| *next));
    let store = state.store.clone();
    let total = tokio::task::spawn_blocking(move || store.count()).await??;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        total,
        next_scheduled_run,
    }))
}
