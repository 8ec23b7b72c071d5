//! Ingest and query handlers.
//!
//! Five ingest/read surface forms, all reducing to the same bulk update on
//! the layered store. JSON bodies are parsed by hand from the buffered
//! bytes so every malformed payload maps to 400 regardless of how it is
//! malformed.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::state::AppState;
use metrion_common::metric::{merge_batch, Metric, MetricKind, ValidateError};
use metrion_storage::StorageError;

/// Uniform status body for errors and batch acknowledgements.
#[derive(Serialize, ToSchema)]
pub struct StatusBody {
    pub status: String,
    pub message: String,
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(StatusBody {
            status: "error".to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn ok_response(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(StatusBody {
            status: "ok".to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn storage_error(e: StorageError) -> Response {
    tracing::error!(error = %e, "storage failure");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
}

fn validation_response(e: ValidateError) -> Response {
    let status = match e {
        ValidateError::EmptyId => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    error_response(status, &e.to_string())
}

/// Applies one validated envelope and echoes it back with the post-apply
/// payload (counters echo their new total).
async fn apply_single(state: &AppState, metric: Metric) -> Result<Metric, Response> {
    match metric.kind {
        MetricKind::Gauge => {
            let value = metric.value.unwrap_or(0.0);
            state
                .storage
                .set_gauge(&metric.id, value)
                .await
                .map_err(storage_error)?;
            Ok(Metric::gauge(metric.id, value))
        }
        MetricKind::Counter => {
            let delta = metric.delta.unwrap_or(0);
            state
                .storage
                .add_counter(&metric.id, delta)
                .await
                .map_err(storage_error)?;
            let total = state
                .storage
                .counter(&metric.id)
                .await
                .map_err(storage_error)?
                .unwrap_or(delta);
            Ok(Metric::counter(metric.id, total))
        }
    }
}

/// JSON routes, documented in the OpenAPI spec.
pub fn json_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(update_json))
        .routes(routes!(updates_json))
        .routes(routes!(value_json))
}

/// Text, URL-form and infrastructure routes.
pub fn plain_routes() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/", axum::routing::get(index))
        .route("/ping", axum::routing::get(ping))
        .route(
            "/update/:kind/:name/:value",
            axum::routing::post(update_url),
        )
        .route("/value/:kind/:name", axum::routing::get(value_url))
}

/// Single update, JSON envelope form.
#[utoipa::path(
    post,
    path = "/update",
    tag = "Ingest",
    request_body = Metric,
    responses(
        (status = 200, description = "Envelope applied; echoes the stored state", body = Metric),
        (status = 400, description = "Validation failure", body = StatusBody),
        (status = 404, description = "Empty metric id", body = StatusBody),
        (status = 500, description = "Persistence failure", body = StatusBody)
    )
)]
async fn update_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(metric) => metric,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("invalid json: {e}")),
    };
    if let Err(e) = metric.validate() {
        return validation_response(e);
    }
    match apply_single(&state, metric).await {
        Ok(echo) => (StatusCode::OK, Json(echo)).into_response(),
        Err(response) => response,
    }
}

/// Batch update, JSON array form.
#[utoipa::path(
    post,
    path = "/updates",
    tag = "Ingest",
    request_body = Vec<Metric>,
    responses(
        (status = 200, description = "Batch applied", body = StatusBody),
        (status = 400, description = "Validation failure", body = StatusBody),
        (status = 500, description = "Persistence failure", body = StatusBody)
    )
)]
async fn updates_json(State(state): State<AppState>, body: Bytes) -> Response {
    let batch: Vec<Metric> = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("invalid json: {e}")),
    };
    let merged = match merge_batch(&batch) {
        Ok(merged) => merged,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    // the two namespaces are independent; application order between the
    // kind maps does not matter
    if let Err(e) = state.storage.set_gauges(&merged.gauges).await {
        return storage_error(e);
    }
    if let Err(e) = state.storage.add_counters(&merged.counters).await {
        return storage_error(e);
    }

    ok_response(&format!("{} metrics applied", merged.len()))
}

/// Single read, JSON envelope form: `id` and `type` in, populated envelope
/// out.
#[utoipa::path(
    post,
    path = "/value",
    tag = "Query",
    request_body = Metric,
    responses(
        (status = 200, description = "Metric found", body = Metric),
        (status = 400, description = "Malformed request", body = StatusBody),
        (status = 404, description = "Unknown metric", body = StatusBody)
    )
)]
async fn value_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(metric) => metric,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("invalid json: {e}")),
    };
    if metric.id.is_empty() {
        return error_response(StatusCode::NOT_FOUND, "metric id must not be empty");
    }

    let found = match metric.kind {
        MetricKind::Gauge => match state.storage.gauge(&metric.id).await {
            Ok(value) => value.map(|v| Metric::gauge(metric.id.clone(), v)),
            Err(e) => return storage_error(e),
        },
        MetricKind::Counter => match state.storage.counter(&metric.id).await {
            Ok(value) => value.map(|v| Metric::counter(metric.id.clone(), v)),
            Err(e) => return storage_error(e),
        },
    };

    match found {
        Some(populated) => (StatusCode::OK, Json(populated)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metric not found"),
    }
}

/// Single update, URL form: `POST /update/{type}/{name}/{value}`.
async fn update_url(
    State(state): State<AppState>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> Response {
    let metric = match Metric::from_url_parts(&kind, &name, &raw) {
        Ok(metric) => metric,
        Err(e) => return validation_response(e),
    };
    match apply_single(&state, metric).await {
        Ok(echo) => (StatusCode::OK, echo.format_value()).into_response(),
        Err(response) => response,
    }
}

/// Single read, URL form: `GET /value/{type}/{name}`.
async fn value_url(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return validation_response(e),
    };

    let found = match kind {
        MetricKind::Gauge => match state.storage.gauge(&name).await {
            Ok(value) => value.map(|v| Metric::gauge(name.clone(), v)),
            Err(e) => return storage_error(e),
        },
        MetricKind::Counter => match state.storage.counter(&name).await {
            Ok(value) => value.map(|v| Metric::counter(name.clone(), v)),
            Err(e) => return storage_error(e),
        },
    };

    match found {
        Some(metric) => (StatusCode::OK, metric.format_value()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metric not found"),
    }
}

/// Durable back-end probe, bounded at ten seconds.
async fn ping(State(state): State<AppState>) -> Response {
    match tokio::time::timeout(Duration::from_secs(10), state.storage.ping()).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "storage ping failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unreachable")
        }
        Err(_) => {
            tracing::error!("storage ping timed out");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage ping timed out")
        }
    }
}

/// Metrics dashboard: one HTML table per kind.
async fn index(State(state): State<AppState>) -> Response {
    let gauges = match state.storage.gauges().await {
        Ok(gauges) => gauges,
        Err(e) => return storage_error(e),
    };
    let counters = match state.storage.counters().await {
        Ok(counters) => counters,
        Err(e) => return storage_error(e),
    };

    let mut gauges: Vec<_> = gauges.into_iter().collect();
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    let mut counters: Vec<_> = counters.into_iter().collect();
    counters.sort_by(|a, b| a.0.cmp(&b.0));

    let mut page = String::from(
        "<!DOCTYPE html><html><head><title>metrion</title></head><body><h1>metrion</h1>",
    );
    page.push_str(&format!(
        "<p>up since {}</p>",
        state.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    page.push_str("<h2>gauges</h2><table>");
    for (name, value) in gauges {
        page.push_str(&format!("<tr><td>{name}</td><td>{value}</td></tr>"));
    }
    page.push_str("</table><h2>counters</h2><table>");
    for (name, value) in counters {
        page.push_str(&format!("<tr><td>{name}</td><td>{value}</td></tr>"));
    }
    page.push_str("</table></body></html>");

    Html(page).into_response()
}
