//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：bad_request_error, not_found_error, runtime_error, storage_error
//! - DTO 转换：status_to_dto, telemetry_to_dto, rpc_response_to_dto, rpc_log_to_dto, driver_to_dto

use api_contract::{
    AddressDefinitionDto, ApiResponse, DeviceStatusDto, DispatchResponseDto, DriverDto,
    DriverParameterDto, RpcLogDto, TelemetryDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{RpcLog, RpcResponse, TelemetryRecord, Value};
use gw_driver::{DriverDescriptor, DriverError, ParameterKind};
use gw_runtime::{DeviceStatusView, RuntimeError};
use gw_storage::StorageError;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "not found")),
    )
        .into_response()
}

/// 运行时错误响应
pub fn runtime_error(err: RuntimeError) -> Response {
    match err {
        RuntimeError::DeviceNotFound(_) => not_found_error(),
        RuntimeError::NotRunnable(_)
        | RuntimeError::Driver(DriverError::NotFound(_) | DriverError::InvalidConfig(_)) => {
            bad_request_error(err.to_string())
        }
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error("INTERNAL.ERROR", other.to_string())),
        )
            .into_response(),
    }
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    let message = err.to_string();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
    )
        .into_response()
}

/// 变量值转 JSON（字节数组为数字数组）
pub fn value_to_json(value: &Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// DeviceStatusView 转 DeviceStatusDto
pub fn status_to_dto(view: DeviceStatusView) -> DeviceStatusDto {
    DeviceStatusDto {
        device_id: view.device_id,
        device_name: view.device_name,
        driver: view.driver,
        state: view.state.to_string(),
        reason: view.reason,
        since_ms: view.since_ms,
    }
}

/// TelemetryRecord 转 TelemetryDto
pub fn telemetry_to_dto(record: TelemetryRecord) -> TelemetryDto {
    TelemetryDto {
        value: value_to_json(&record.value),
        cooked_value: value_to_json(&record.cooked_value),
        status: record.status.to_string(),
        device_id: record.device_id,
        device_name: record.device_name,
        variable: record.variable,
        alias: record.alias,
        timestamp_ms: record.timestamp_ms,
        message: record.message,
    }
}

/// RpcResponse 转 DispatchResponseDto
pub fn rpc_response_to_dto(response: RpcResponse) -> DispatchResponseDto {
    DispatchResponseDto {
        echoed_value: value_to_json(&response.echoed_value),
        request_id: response.request_id,
        device_id: response.device_id,
        variable: response.variable,
        success: response.success,
        description: response.description,
        timestamp_ms: response.timestamp_ms,
    }
}

/// RpcLog 转 RpcLogDto
pub fn rpc_log_to_dto(record: RpcLog) -> RpcLogDto {
    RpcLogDto {
        log_id: record.log_id,
        request_id: record.request_id,
        device_id: record.device_id,
        variable: record.variable,
        method: record.method,
        params: record.params,
        start_ms: record.start_ms,
        end_ms: record.end_ms,
        success: record.success,
        description: record.description,
    }
}

/// DriverDescriptor 转 DriverDto
pub fn driver_to_dto(descriptor: DriverDescriptor) -> DriverDto {
    DriverDto {
        type_tag: descriptor.type_tag,
        version: descriptor.version,
        description: descriptor.description,
        parameters: descriptor
            .parameters
            .into_iter()
            .map(|spec| DriverParameterDto {
                kind: match spec.kind {
                    ParameterKind::String => "string",
                    ParameterKind::Number => "number",
                    ParameterKind::Bool => "bool",
                }
                .to_string(),
                default: spec
                    .default
                    .and_then(|value| serde_json::to_value(value).ok()),
                name: spec.name,
                required: spec.required,
                description: spec.description,
            })
            .collect(),
        address_definitions: descriptor
            .address_definitions
            .into_iter()
            .map(|(name, definition)| AddressDefinitionDto {
                name,
                description: definition.description,
                data_type: definition.data_type.to_string(),
                unit: definition.unit,
                address_format: definition.address_format,
            })
            .collect(),
    }
}
