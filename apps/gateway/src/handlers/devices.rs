//! 设备 handlers
//!
//! - GET /api/devices
//! - GET /api/devices/{id}
//! - POST /api/devices/{id}/start
//! - POST /api/devices/{id}/stop
//! - GET /api/devices/{id}/snapshot
//! - GET /api/snapshot

use crate::AppState;
use crate::utils::response::{
    not_found_error, runtime_error, status_to_dto, telemetry_to_dto,
};
use api_contract::{ApiResponse, DeviceStatusDto, TelemetryDto};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

/// 路径参数提取器
#[derive(serde::Deserialize)]
pub struct DevicePath {
    pub(crate) device_id: String,
}

pub async fn list_devices(State(state): State<AppState>) -> Response {
    let data: Vec<DeviceStatusDto> = state
        .scheduler
        .statuses()
        .await
        .into_iter()
        .map(status_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub async fn get_device(State(state): State<AppState>, Path(path): Path<DevicePath>) -> Response {
    match state.scheduler.device_status(&path.device_id).await {
        Some(status) => {
            (StatusCode::OK, Json(ApiResponse::success(status_to_dto(status)))).into_response()
        }
        None => not_found_error(),
    }
}

/// 启动设备；驱动装配失败时返回 400 并保留停止原因。
pub async fn start_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    if let Err(err) = state.scheduler.start_device(&path.device_id).await {
        return runtime_error(err);
    }
    info!(target: "gw.api", device_id = %path.device_id, "device_start_requested");
    get_device(State(state), Path(path)).await
}

pub async fn stop_device(State(state): State<AppState>, Path(path): Path<DevicePath>) -> Response {
    if let Err(err) = state.scheduler.stop_device(&path.device_id).await {
        return runtime_error(err);
    }
    info!(target: "gw.api", device_id = %path.device_id, "device_stop_requested");
    get_device(State(state), Path(path)).await
}

pub async fn get_device_snapshot(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    match state.scheduler.device_snapshot(&path.device_id).await {
        Some(records) => {
            let data: Vec<TelemetryDto> = records.into_iter().map(telemetry_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        None => not_found_error(),
    }
}

/// 全部设备的当前采样。
pub async fn get_snapshot(State(state): State<AppState>) -> Response {
    let data: Vec<TelemetryDto> = state
        .scheduler
        .snapshot()
        .await
        .into_iter()
        .map(telemetry_to_dto)
        .collect();
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}
