//! 稳定的 DTO 与 API 响应契约。
//!
//! 字段统一 camelCase；变量值以 JSON 原生类型表示（字节数组为数字数组）。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 变量写入请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub variable: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, alias = "request_id")]
    pub request_id: Option<String>,
}

/// 变量写入结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponseDto {
    pub request_id: String,
    pub device_id: String,
    pub variable: String,
    pub success: bool,
    pub description: String,
    pub echoed_value: serde_json::Value,
    pub timestamp_ms: i64,
}

/// 设备运行状态。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusDto {
    pub device_id: String,
    pub device_name: String,
    pub driver: String,
    pub state: String,
    pub reason: Option<String>,
    pub since_ms: i64,
}

/// 变量采样。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryDto {
    pub device_id: String,
    pub device_name: String,
    pub variable: String,
    pub alias: Option<String>,
    pub value: serde_json::Value,
    pub cooked_value: serde_json::Value,
    pub status: String,
    pub timestamp_ms: i64,
    pub message: Option<String>,
}

/// 写入审计查询参数。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLogQuery {
    pub device_id: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: Option<i64>,
}

/// 写入审计记录。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLogDto {
    pub log_id: String,
    pub request_id: String,
    pub device_id: String,
    pub variable: String,
    pub method: String,
    pub params: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub success: bool,
    pub description: String,
}

/// 驱动参数声明。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverParameterDto {
    pub name: String,
    pub kind: String,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub description: String,
}

/// 地址语法说明。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDefinitionDto {
    pub name: String,
    pub description: String,
    pub data_type: String,
    pub unit: Option<String>,
    pub address_format: String,
}

/// 驱动描述。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDto {
    pub type_tag: String,
    pub version: String,
    pub description: String,
    pub parameters: Vec<DriverParameterDto>,
    pub address_definitions: Vec<AddressDefinitionDto>,
}

/// 运行时计数器快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub polls: u64,
    pub read_failures: u64,
    pub expression_failures: u64,
    pub connect_failures: u64,
    pub reconnects: u64,
    pub writes_succeeded: u64,
    pub writes_failed: u64,
    pub writes_rejected: u64,
    pub write_latency_ms_total: u64,
    pub write_latency_ms_count: u64,
    pub telemetry_published: u64,
    pub rpc_requests: u64,
}
