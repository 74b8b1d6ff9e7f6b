//! 系统信息 handlers
//!
//! - GET /health
//! - GET /api/drivers
//! - GET /api/metrics

use crate::AppState;
use crate::utils::response::driver_to_dto;
use api_contract::{ApiResponse, DriverDto, MetricsSnapshotDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gw_telemetry::metrics;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// 已注册驱动的参数模式与地址说明。
pub async fn list_drivers(State(state): State<AppState>) -> Response {
    let data: Vec<DriverDto> = state
        .scheduler
        .drivers()
        .into_iter()
        .map(driver_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            polls: snapshot.polls,
            read_failures: snapshot.read_failures,
            expression_failures: snapshot.expression_failures,
            connect_failures: snapshot.connect_failures,
            reconnects: snapshot.reconnects,
            writes_succeeded: snapshot.writes_succeeded,
            writes_failed: snapshot.writes_failed,
            writes_rejected: snapshot.writes_rejected,
            write_latency_ms_total: snapshot.write_latency_ms_total,
            write_latency_ms_count: snapshot.write_latency_ms_count,
            telemetry_published: snapshot.telemetry_published,
            rpc_requests: snapshot.rpc_requests,
        })),
    )
        .into_response()
}
