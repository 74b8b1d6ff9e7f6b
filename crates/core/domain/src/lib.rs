//! 网关领域模型：设备、变量、采样值与控制审计记录。
//!
//! 所有能力模块共享这些类型，领域层本身不依赖任何运行时。

pub mod data;
pub mod device;
pub mod rpc;

pub use data::{DataType, EndianType, ProtectType, Sample, StatusType, Value};
pub use device::{DeviceConfig, DeviceKind, ParamValue, VariableConfig};
pub use rpc::{RpcLog, RpcRequest, RpcResponse, TelemetryRecord};

/// 当前时间（Unix 毫秒）。
pub fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
