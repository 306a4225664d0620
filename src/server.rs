//! HTTP facade for the browser-extension backend
//!
//! Thin axum layer over the pipeline and trading clients. Every response is a
//! `{"success": bool, ...}` envelope; upstream failures map to non-200 with an
//! `error` string instead of propagating as 500 panics.

use crate::client::clob::Side;
use crate::client::PolymarketClient;
use crate::pipeline::{Pipeline, PipelineOutcome};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub client: Arc<PolymarketClient>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze-tweet", post(analyze_tweet))
        .route("/api/trade", post(trade))
        .route("/api/positions", get(positions))
        .route("/api/closed-positions", get(closed_positions))
        .route("/api/prices", get(prices))
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn failure(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({"success": false, "error": error.into()})),
    )
}

#[derive(Debug, Deserialize)]
struct AnalyzeTweetRequest {
    tweet_text: Option<String>,
    author: Option<String>,
    top_n: Option<usize>,
}

async fn analyze_tweet(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeTweetRequest>,
) -> impl IntoResponse {
    let tweet_text = match req.tweet_text {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return failure(
                StatusCode::BAD_REQUEST,
                "Missing tweet_text in request body",
            )
        }
    };
    let top_n = req.top_n.unwrap_or(5);

    tracing::info!(
        "analyzing tweet from {:?}: {:?}",
        req.author,
        tweet_text.chars().take(100).collect::<String>()
    );

    let outcome = state
        .pipeline
        .process(&tweet_text, req.author.as_deref(), top_n)
        .await;

    let report = match outcome {
        PipelineOutcome::Report(report) => report,
        PipelineOutcome::Failed(f) => {
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Pipeline error: {}", f.error),
            );
        }
    };

    if report.top_relevant_markets.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "error": "No relevant markets found for this tweet content",
                "debug_info": {
                    "search_query": report.sentiment_analysis.search_query,
                    "sentiment_score": report.sentiment_analysis.sentiment_score.unwrap_or(0.0),
                }
            })),
        );
    }

    let mut body = match serde_json::to_value(&report) {
        Ok(Value::Object(map)) => map,
        _ => {
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to serialize analysis report",
            )
        }
    };
    body.insert("success".to_string(), Value::Bool(true));
    (StatusCode::OK, Json(Value::Object(body)))
}

#[derive(Debug, Deserialize)]
struct TradeRequest {
    side: String,
    amount: Decimal,
    market_id: Option<String>,
    yes_token_id: Option<String>,
    no_token_id: Option<String>,
}

async fn trade(
    State(state): State<AppState>,
    Json(req): Json<TradeRequest>,
) -> impl IntoResponse {
    let (yes_token, no_token) = match (&req.yes_token_id, &req.no_token_id) {
        (Some(yes), Some(no)) => (yes.clone(), no.clone()),
        _ => {
            return failure(
                StatusCode::BAD_REQUEST,
                format!(
                    "Token IDs required for real trading. YES: {:?}, NO: {:?}",
                    req.yes_token_id, req.no_token_id
                ),
            )
        }
    };

    let clob = match &state.client.clob {
        Some(clob) => clob,
        None => {
            return failure(
                StatusCode::SERVICE_UNAVAILABLE,
                "Trading not configured: no private key",
            )
        }
    };

    // The extension always buys: YES buys the yes token, NO buys the no token
    let token_id = match req.side.as_str() {
        "YES" => yes_token,
        "NO" => no_token,
        other => {
            return failure(
                StatusCode::BAD_REQUEST,
                format!("Invalid side {:?}, expected YES or NO", other),
            )
        }
    };

    tracing::info!(
        "trade request: {} ${} on token {}",
        req.side,
        req.amount,
        token_id
    );

    let result = async {
        clob.initialize().await?;
        clob.place_market_order(&token_id, Side::Buy, req.amount).await
    }
    .await;

    match result {
        Ok(order) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "order_result": order,
                "side": req.side,
                "amount": req.amount,
                "market_id": req.market_id,
                "token_id": token_id,
                "message": format!("Successfully placed {} order for ${}", req.side, req.amount),
            })),
        ),
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Trade failed: {}", e),
        ),
    }
}

async fn positions(State(state): State<AppState>) -> impl IntoResponse {
    fetch_positions(&state, false).await
}

async fn closed_positions(State(state): State<AppState>) -> impl IntoResponse {
    fetch_positions(&state, true).await
}

async fn fetch_positions(state: &AppState, closed: bool) -> (StatusCode, Json<Value>) {
    let user = match state.client.funder_address() {
        Some(addr) => addr.to_string(),
        None => {
            return failure(
                StatusCode::SERVICE_UNAVAILABLE,
                "No funder address configured",
            )
        }
    };

    let result = if closed {
        state.client.data.get_closed_positions(&user).await
    } else {
        state.client.data.get_positions(&user).await
    };

    match result {
        Ok(positions) => (
            StatusCode::OK,
            Json(json!({"success": true, "positions": positions})),
        ),
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error fetching positions: {}", e),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct PricesQuery {
    yes_token_id: Option<String>,
    no_token_id: Option<String>,
}

async fn prices(
    State(state): State<AppState>,
    Query(query): Query<PricesQuery>,
) -> impl IntoResponse {
    let (yes_token, no_token) = match (query.yes_token_id, query.no_token_id) {
        (Some(yes), Some(no)) => (yes, no),
        _ => {
            return failure(
                StatusCode::BAD_REQUEST,
                "yes_token_id and no_token_id query parameters required",
            )
        }
    };

    let clob = match &state.client.clob {
        Some(clob) => clob,
        None => {
            return failure(
                StatusCode::SERVICE_UNAVAILABLE,
                "Trading not configured: no private key",
            )
        }
    };

    let yes_price = clob.get_price(&yes_token, Side::Buy).await;
    let no_price = clob.get_price(&no_token, Side::Buy).await;

    match (yes_price, no_price) {
        (Ok(yes), Ok(no)) => (
            StatusCode::OK,
            Json(json!({"success": true, "yes_price": yes, "no_price": no})),
        ),
        (Err(e), _) | (_, Err(e)) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Price lookup failed: {}", e),
        ),
    }
}
