//! 写入审计 handlers
//!
//! - GET /api/rpc-logs

use crate::AppState;
use crate::utils::response::{rpc_log_to_dto, storage_error};
use api_contract::{ApiResponse, RpcLogDto, RpcLogQuery};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// 查询写入审计
///
/// 查询参数:
///   - deviceId: 可选，按设备过滤
///   - fromMs / toMs: 可选，开始时间窗口（毫秒）
///   - limit: 可选，返回数量限制（默认 100）
pub async fn list_rpc_logs(
    State(state): State<AppState>,
    Query(query): Query<RpcLogQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(100).max(0);
    let device_id = query.device_id.as_deref().filter(|id| !id.is_empty());
    match state
        .audit
        .list_rpc_logs(device_id, query.from_ms, query.to_ms, limit)
        .await
    {
        Ok(items) => {
            let data: Vec<RpcLogDto> = items.into_iter().map(rpc_log_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}
