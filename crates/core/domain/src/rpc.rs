use crate::data::{StatusType, Value};
use serde::{Deserialize, Serialize};

/// 变量写入请求。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub request_id: String,
    pub device_id: String,
    pub variable: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub method: Option<String>,
}

/// 变量写入结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub request_id: String,
    pub device_id: String,
    pub variable: String,
    pub success: bool,
    pub description: String,
    pub echoed_value: Value,
    pub timestamp_ms: i64,
}

impl RpcResponse {
    pub fn new(request: &RpcRequest, success: bool, description: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id.clone(),
            device_id: request.device_id.clone(),
            variable: request.variable.clone(),
            success,
            description: description.into(),
            echoed_value: request.value.clone(),
            timestamp_ms: crate::now_epoch_ms(),
        }
    }
}

/// 写入审计记录（只追加）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub log_id: String,
    pub request_id: String,
    pub device_id: String,
    pub variable: String,
    pub method: String,
    /// 请求参数（JSON 序列化）。
    pub params: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub success: bool,
    pub description: String,
}

/// 遥测输出元组。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub device_id: String,
    pub device_name: String,
    pub variable: String,
    pub alias: Option<String>,
    pub value: Value,
    pub cooked_value: Value,
    pub status: StatusType,
    pub timestamp_ms: i64,
    pub message: Option<String>,
}
