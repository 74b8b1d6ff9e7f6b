//! # 上行链路模块
//!
//! 网关与上位平台之间的 MQTT 通道：
//!
//! - 遥测上报：定时取调度器快照，只发布有变化的采样，
//!   topic 为 `{prefix}/telemetry/{deviceName}`
//! - 远程写入：订阅 `{prefix}/rpc/request/#`，请求经调度器写入设备，
//!   结果发布到 `{prefix}/rpc/response/{requestId}`
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let (publisher, eventloop) = MqttTelemetryPublisher::connect(mqtt_config.clone())?;
//! let telemetry = spawn_telemetry_loop(scheduler.clone(), Arc::new(publisher), interval, cancel.clone());
//! let rpc = spawn_rpc_listener(mqtt_config, scheduler.clone(), cancel.clone());
//! ```

mod error;
mod mqtt;
mod publisher;
mod rpc;
mod topics;

pub use error::UplinkError;
pub use mqtt::{MqttTelemetryPublisher, MqttUplinkConfig, spawn_rpc_listener};
pub use publisher::{
    ChangeTracker, NoopPublisher, TelemetryBatch, TelemetryPublisher, spawn_telemetry_loop,
};
pub use rpc::{RpcRequestPayload, parse_rpc_request};
pub use topics::{request_id_from_topic, rpc_request_filter, rpc_response_topic, telemetry_topic};
