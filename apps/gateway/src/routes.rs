//! 路由定义
//!
//! - 健康检查：/health
//! - 设备状态：/api/devices, /api/devices/:device_id
//! - 启停：/api/devices/:device_id/start, /api/devices/:device_id/stop
//! - 采样快照：/api/snapshot, /api/devices/:device_id/snapshot
//! - 变量写入：/api/devices/:device_id/dispatch
//! - 写入审计：/api/rpc-logs
//! - 驱动描述：/api/drivers
//! - 计数器：/api/metrics

use super::AppState;
use super::handlers::*;
use super::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// 创建完整路由（含请求追踪中间件）。
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", create_api_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/:device_id", get(get_device))
        .route("/devices/:device_id/start", post(start_device))
        .route("/devices/:device_id/stop", post(stop_device))
        .route("/devices/:device_id/snapshot", get(get_device_snapshot))
        .route("/devices/:device_id/dispatch", post(dispatch))
        .route("/snapshot", get(get_snapshot))
        .route("/rpc-logs", get(list_rpc_logs))
        .route("/drivers", get(list_drivers))
        .route("/metrics", get(get_metrics))
}
