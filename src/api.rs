use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{crawler::pipeline::TickerPipeline, declare::Tickers, logging};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TickerPipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/quote", get(load_quotes))
        .route("/quotes", get(load_quotes))
        .route("/quote/{ticker}", get(load_quote))
        .with_state(state)
}

#[derive(Deserialize, Default)]
struct QuotesQuery {
    #[serde(default)]
    tickers: Option<String>,
}

impl QuotesQuery {
    /// 以逗號分隔的代號，空白的片段略過
    fn tickers(&self) -> Vec<String> {
        self.tickers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

async fn load_quotes(State(state): State<AppState>, Query(query): Query<QuotesQuery>) -> Response {
    let tickers = query.tickers();
    if tickers.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    respond(&state, Tickers::Many(tickers)).await
}

/// 查詢字串帶有代號時優先使用，否則以路徑上的單一代號查詢
async fn load_quote(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<QuotesQuery>,
) -> Response {
    let tickers = query.tickers();
    if !tickers.is_empty() {
        return respond(&state, Tickers::Many(tickers)).await;
    }

    let ticker = ticker.trim();
    if ticker.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    respond(&state, Tickers::from(ticker)).await
}

async fn respond(state: &AppState, tickers: Tickers) -> Response {
    let single = tickers.is_single();

    let batch = match state.pipeline.load_batch(tickers).await {
        Ok(batch) => batch,
        Err(why) => {
            logging::error_file_async(format!("Failed to load_batch because {:?}", why));
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !single {
        return (StatusCode::OK, Json(batch)).into_response();
    }

    match batch.into_records().into_iter().next().flatten() {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
