//! 驱动契约
//!
//! 每种协议实现 [`Driver`]，运行时只依赖这里定义的能力：
//!
//! - `connect` / `close` / `is_connected`：连接生命周期，失败通过返回值报告
//! - `read`：单变量读取，错误转换为 `Bad` 采样，不向上传播
//! - `write`：控制写入，不支持写入的驱动返回确定的失败结果
//! - `address_definitions`：地址语法说明（可选）
//! - `subscribe`：事件驱动变量的推送通道（可选）

use async_trait::async_trait;
use domain::{DataType, EndianType, StatusType, Value, now_epoch_ms};
use gw_protocol::ProtocolError;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// 不支持写入时的固定描述。
pub const WRITE_NOT_SUPPORTED: &str = "write not supported by driver";

/// 单变量 IO 参数。
#[derive(Debug, Clone, PartialEq)]
pub struct IoArg {
    pub address: String,
    pub data_type: DataType,
    pub endian: EndianType,
    /// 变量配置的协议读写方法（如 `ReadHoldingRegister`），未配置时由驱动自行决定。
    pub method: Option<String>,
}

impl IoArg {
    pub fn new(address: impl Into<String>, data_type: DataType, endian: EndianType) -> Self {
        Self {
            address: address.into(),
            data_type,
            endian,
            method: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// 驱动读取结果。
#[derive(Debug, Clone, PartialEq)]
pub struct DriverReading {
    pub value: Value,
    pub status: StatusType,
    pub message: Option<String>,
    pub timestamp_ms: i64,
}

impl DriverReading {
    pub fn good(value: Value) -> Self {
        Self {
            value,
            status: StatusType::Good,
            message: None,
            timestamp_ms: now_epoch_ms(),
        }
    }

    pub fn bad(message: impl Into<String>) -> Self {
        Self {
            value: Value::Null,
            status: StatusType::Bad,
            message: Some(message.into()),
            timestamp_ms: now_epoch_ms(),
        }
    }

    pub fn uncertain(value: Value, message: impl Into<String>) -> Self {
        Self {
            value,
            status: StatusType::Uncertain,
            message: Some(message.into()),
            timestamp_ms: now_epoch_ms(),
        }
    }
}

impl From<Result<Value, ProtocolError>> for DriverReading {
    fn from(result: Result<Value, ProtocolError>) -> Self {
        match result {
            Ok(value) => Self::good(value),
            Err(err) => Self::bad(err.to_string()),
        }
    }
}

/// 驱动写入结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub success: bool,
    pub description: String,
}

impl WriteResponse {
    pub fn ok(description: impl Into<String>) -> Self {
        Self {
            success: true,
            description: description.into(),
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
        }
    }

    pub fn unsupported() -> Self {
        Self::failed(WRITE_NOT_SUPPORTED)
    }
}

/// 地址语法说明。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDefinition {
    pub description: String,
    pub data_type: DataType,
    pub unit: Option<String>,
    pub address_format: String,
}

impl AddressDefinition {
    pub fn new(description: &str, data_type: DataType, address_format: &str) -> Self {
        Self {
            description: description.to_string(),
            data_type,
            unit: None,
            address_format: address_format.to_string(),
        }
    }
}

/// 驱动推送的变量更新（事件驱动变量）。
#[derive(Debug, Clone, PartialEq)]
pub struct DriverEvent {
    pub address: String,
    pub reading: DriverReading,
}

/// 驱动事件接收端。
pub type DriverEvents = mpsc::UnboundedReceiver<DriverEvent>;

/// 协议驱动。
///
/// 方法取 `&mut self`：运行时通过单一 IO 槽位保证同一实例上不会并发读写。
#[async_trait]
pub trait Driver: Send {
    /// 建立连接；幂等（先关闭已有连接），失败返回 false。
    async fn connect(&mut self) -> bool;

    /// 释放连接；已关闭时调用也安全。
    async fn close(&mut self) -> bool;

    /// 当前连接状态（与最近一次读取成败无关）。
    fn is_connected(&self) -> bool;

    /// 读取单个变量。
    async fn read(&mut self, arg: &IoArg) -> DriverReading;

    /// 写入单个变量。
    ///
    /// `method` 为变量配置的协议方法；变量未配置时为请求方法（默认 `write`）。
    async fn write(
        &mut self,
        _request_id: &str,
        _method: &str,
        _arg: &IoArg,
        _value: &Value,
    ) -> WriteResponse {
        WriteResponse::unsupported()
    }

    /// 地址语法说明。
    fn address_definitions(&self) -> Option<BTreeMap<String, AddressDefinition>> {
        None
    }

    /// 订阅事件驱动变量；不支持推送的驱动返回 `None`。
    fn subscribe(&mut self, _targets: Vec<IoArg>) -> Option<DriverEvents> {
        None
    }
}
