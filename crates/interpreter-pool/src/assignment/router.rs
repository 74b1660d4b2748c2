use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{BookingId, MeetingType};
use super::policy::{PolicyUpdate, PriorityUpdate};
use super::pool::BookingStore;
use super::service::AssignmentService;
use crate::error::AppError;

type SharedService<S> = State<Arc<AssignmentService<S>>>;

/// Admin endpoints over the pool, the policy store, and the scheduler.
pub fn pool_router<S>(service: Arc<AssignmentService<S>>) -> Router
where
    S: BookingStore + 'static,
{
    Router::new()
        .route("/api/v1/pool/stats", get(stats_handler::<S>))
        .route("/api/v1/pool/entries", get(entries_handler::<S>))
        .route("/api/v1/pool/status", get(status_handler::<S>))
        .route("/api/v1/pool/health", get(health_handler::<S>))
        .route("/api/v1/pool/process", post(process_handler::<S>))
        .route("/api/v1/pool/retry", post(retry_handler::<S>))
        .route(
            "/api/v1/policy",
            get(policy_handler::<S>).put(update_policy_handler::<S>),
        )
        .route("/api/v1/policy/priorities", get(priorities_handler::<S>))
        .route(
            "/api/v1/policy/priorities/:meeting_type",
            put(update_priority_handler::<S>),
        )
        .route(
            "/api/v1/bookings/:booking_id/admit",
            post(admit_handler::<S>),
        )
        .route(
            "/api/v1/bookings/:booking_id/pool",
            delete(remove_handler::<S>),
        )
        .route(
            "/api/v1/bookings/:booking_id/candidates",
            get(candidates_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProcessRequest {
    booking_ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RetryRequest {
    operator_override: bool,
}

pub(crate) async fn stats_handler<S>(State(service): SharedService<S>) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let stats = service.pool_stats(Utc::now())?;
    Ok(Json(stats).into_response())
}

pub(crate) async fn entries_handler<S>(
    State(service): SharedService<S>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let entries = service.pool_entries(Utc::now())?;
    Ok(Json(entries).into_response())
}

pub(crate) async fn status_handler<S>(State(service): SharedService<S>) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let scheduler = service.scheduler().get_status(Utc::now())?;
    let statistics = service.scheduler().get_daily_processing_statistics();
    let payload = json!({
        "scheduler": scheduler,
        "statistics": statistics,
    });
    Ok(Json(payload).into_response())
}

pub(crate) async fn health_handler<S>(State(service): SharedService<S>) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let report = service.health_check(Utc::now())?;
    let status = if report.is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)).into_response())
}

pub(crate) async fn process_handler<S>(
    State(service): SharedService<S>,
    request: Option<Json<ProcessRequest>>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let now = Utc::now();
    let booking_ids = request.and_then(|Json(request)| request.booking_ids);

    match booking_ids {
        Some(ids) => {
            let ids: Vec<BookingId> = ids.into_iter().map(BookingId).collect();
            let outcomes =
                on_blocking_pool(service, move |service| Ok(service.process_bookings(&ids, now)))
                    .await?;
            Ok(Json(json!({ "outcomes": outcomes })).into_response())
        }
        None => {
            let summary =
                on_blocking_pool(service, move |service| Ok(service.process_now(now)?)).await?;
            Ok(Json(summary).into_response())
        }
    }
}

pub(crate) async fn retry_handler<S>(
    State(service): SharedService<S>,
    request: Option<Json<RetryRequest>>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let operator_override = request.map_or(false, |Json(request)| request.operator_override);
    let now = Utc::now();
    let requeued = on_blocking_pool(service, move |service| {
        Ok(service.retry_failed(operator_override, now)?)
    })
    .await?;
    Ok(Json(json!({ "requeued": requeued })).into_response())
}

/// Pool runs hold store locks for a whole batch; they run off the async workers.
async fn on_blocking_pool<S, T>(
    service: Arc<AssignmentService<S>>,
    work: impl FnOnce(&AssignmentService<S>) -> Result<T, AppError> + Send + 'static,
) -> Result<T, AppError>
where
    S: BookingStore + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&service)).await?
}

pub(crate) async fn policy_handler<S>(State(service): SharedService<S>) -> Response
where
    S: BookingStore + 'static,
{
    Json(service.load_policy().as_ref().clone()).into_response()
}

pub(crate) async fn update_policy_handler<S>(
    State(service): SharedService<S>,
    Json(update): Json<PolicyUpdate>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let policy = service.update_policy(&update, Utc::now())?;
    Ok(Json(policy.as_ref().clone()).into_response())
}

pub(crate) async fn priorities_handler<S>(State(service): SharedService<S>) -> Response
where
    S: BookingStore + 'static,
{
    Json(service.priorities()).into_response()
}

pub(crate) async fn update_priority_handler<S>(
    State(service): SharedService<S>,
    Path(meeting_type): Path<String>,
    Json(update): Json<PriorityUpdate>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let meeting_type: MeetingType = meeting_type.parse()?;
    let row = service.update_priority(meeting_type, update)?;
    Ok(Json(row).into_response())
}

pub(crate) async fn admit_handler<S>(
    State(service): SharedService<S>,
    Path(booking_id): Path<String>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let outcome = service.admit_booking(&BookingId(booking_id), Utc::now())?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

pub(crate) async fn remove_handler<S>(
    State(service): SharedService<S>,
    Path(booking_id): Path<String>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let id = BookingId(booking_id);
    let removed = service.remove_from_pool(&id)?;
    Ok(Json(json!({ "booking_id": id, "removed": removed })).into_response())
}

pub(crate) async fn candidates_handler<S>(
    State(service): SharedService<S>,
    Path(booking_id): Path<String>,
) -> Result<Response, AppError>
where
    S: BookingStore + 'static,
{
    let candidates = service.preview_candidates(&BookingId(booking_id), Utc::now())?;
    Ok(Json(candidates).into_response())
}
