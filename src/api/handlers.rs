//! Endpoint handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tracing::{error, info};

use super::types::*;
use super::{
    ApiError, AppState, ALL_TRADES_LIMIT, ALL_TRADES_LOOKBACK_SECS, EVENTS_LOOKBACK_SECS,
    REGISTER_TIMES_LIMIT, USER_TRADES_LIMIT,
};
use crate::error::{RejectReason, Rejection};
use crate::events::hour_partition;
use crate::types::{MinerRegistration, Role, TokenEvent, TokenPrice, TradeSubmission};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn invalid_input(detail: impl Into<String>) -> ApiError {
    ApiError(Rejection::new(RejectReason::InvalidInput, detail))
}

fn internal(operation: &str, e: impl std::fmt::Display) -> ApiError {
    error!(operation, error = %e, "Request failed");
    ApiError(Rejection::new(
        RejectReason::InternalFailure,
        format!("{operation} failed"),
    ))
}

/// Signature, address binding and query rate limit shared by the signed reads
async fn authorize(state: &AppState, q: &SignedQuery) -> Result<(), ApiError> {
    state
        .identity
        .authenticate(q.signing_message().as_bytes(), &q.pub_key, &q.sig)?;
    state.identity.check_address_matches(&q.pub_key, &q.user_id)?;
    state.limiter.check_query(&q.pub_key).await?;
    Ok(())
}

async fn require_validator(state: &AppState, address: &str) -> Result<(), ApiError> {
    if state.identity.role_of(address).await? != Role::Validator {
        return Err(ApiError(Rejection::new(
            RejectReason::ValidatorRequired,
            "validator has no access",
        )));
    }
    Ok(())
}

/// POST /createtrade
pub async fn create_trade(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TradeSubmission>, JsonRejection>,
) -> ApiResult<CreateTradeResponse> {
    let Json(submission) = payload.map_err(|e| invalid_input(e.body_text()))?;
    info!(
        miner = %submission.miner_id,
        token = %submission.token,
        nonce = submission.nonce,
        action = %submission.position_manager,
        "Trade submission"
    );

    let accepted = state.validator.submit(submission).await?;
    Ok(Json(ApiResponse::success(
        "create trade success",
        accepted.into(),
    )))
}

/// GET /getusertrades - the caller's own latest trades
pub async fn get_user_trades(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> ApiResult<Vec<TradeView>> {
    let Query(q) = query.map_err(|e| invalid_input(e.body_text()))?;
    authorize(&state, &q).await?;

    let trades = state
        .trades
        .trades_by_miner(&q.user_id, USER_TRADES_LIMIT)
        .await
        .map_err(|e| internal("get user trades", e))?;

    Ok(Json(ApiResponse::success(
        "get user trades success",
        trades.into_iter().map(TradeView::from).collect(),
    )))
}

/// GET /getalltrades - validators only
pub async fn get_all_trades(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> ApiResult<Vec<TradeView>> {
    let Query(q) = query.map_err(|e| invalid_input(e.body_text()))?;
    authorize(&state, &q).await?;
    require_validator(&state, &q.user_id).await?;

    let since = q
        .tradetime
        .unwrap_or_else(|| state.clock.unix() - ALL_TRADES_LOOKBACK_SECS);
    let trades = state
        .trades
        .trades_since(since, ALL_TRADES_LIMIT)
        .await
        .map_err(|e| internal("get all trades", e))?;

    Ok(Json(ApiResponse::success(
        "get all trades success",
        trades.into_iter().map(TradeView::from).collect(),
    )))
}

/// GET /getregistertime - validators only; registrations at or after
/// `starttime`, newest first
pub async fn get_register_time(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> ApiResult<Vec<MinerRegistration>> {
    let Query(q) = query.map_err(|e| invalid_input(e.body_text()))?;
    authorize(&state, &q).await?;
    require_validator(&state, &q.user_id).await?;

    let since = q.starttime.as_deref().unwrap_or_default();
    let registrations = state
        .registry
        .register_times(since, REGISTER_TIMES_LIMIT)
        .await
        .map_err(|e| internal("get register time", e))?;

    Ok(Json(ApiResponse::success(
        "get register time success",
        registrations,
    )))
}

/// GET /getlatestprice
pub async fn get_latest_price(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> ApiResult<Vec<TokenPrice>> {
    let Query(q) = query.map_err(|e| invalid_input(e.body_text()))?;
    authorize(&state, &q).await?;

    let prices = state
        .oracle
        .latest_prices(&state.tokens, q.latesttime)
        .await
        .map_err(|e| internal("get latest price", e))?;

    Ok(Json(ApiResponse::success("get latest price success", prices)))
}

/// GET /getallevents?start=&end= (unix seconds, truncated to the hour)
pub async fn get_all_events(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EventRangeQuery>, QueryRejection>,
) -> ApiResult<Vec<TokenEvent>> {
    let Query(q) = query.map_err(|e| invalid_input(e.body_text()))?;
    let now = state.clock.unix();
    let start = q.start.unwrap_or(now - EVENTS_LOOKBACK_SECS);
    let end = q.end.unwrap_or(now);

    let to_pt = |ts: i64| {
        Utc.timestamp_opt(ts, 0)
            .single()
            .map(hour_partition)
            .ok_or_else(|| invalid_input(format!("invalid timestamp {ts}")))
    };
    let (start_pt, end_pt) = (to_pt(start)?, to_pt(end)?);

    let events = state
        .events
        .events_between(&start_pt, &end_pt, &state.chains, &state.tokens)
        .await
        .map_err(|e| internal("get all events", e))?;

    Ok(Json(ApiResponse::success("get all events success", events)))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(
        "ok",
        HealthResponse {
            status: "ok".to_string(),
            event_subscribers: state.broadcaster.subscriber_count(),
            timestamp: state.clock.unix(),
        },
    ))
}
