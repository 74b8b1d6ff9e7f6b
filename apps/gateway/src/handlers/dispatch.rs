//! 变量写入 handler
//!
//! - POST /api/devices/{id}/dispatch

use crate::AppState;
use crate::handlers::devices::DevicePath;
use crate::utils::response::{bad_request_error, not_found_error, rpc_response_to_dto};
use api_contract::{ApiResponse, DispatchRequest};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::RpcRequest;
use gw_driver::json_to_value;

/// 写入变量
///
/// 设备不存在返回 404；写入被拒绝（只读、未连接等）仍返回 200，结果见 `success`/`description`。
pub async fn dispatch(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Json(req): Json<DispatchRequest>,
) -> Response {
    let variable = req.variable.trim();
    if variable.is_empty() {
        return bad_request_error("variable is required");
    }
    let device_id = path.device_id;
    if state.scheduler.device_status(&device_id).await.is_none() {
        return not_found_error();
    }
    let request = RpcRequest {
        request_id: req
            .request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        device_id,
        variable: variable.to_string(),
        value: json_to_value(&req.value),
        method: req.method.filter(|method| !method.trim().is_empty()),
    };
    let response = state.scheduler.dispatch_request(request).await;
    (
        StatusCode::OK,
        Json(ApiResponse::success(rpc_response_to_dto(response))),
    )
        .into_response()
}
