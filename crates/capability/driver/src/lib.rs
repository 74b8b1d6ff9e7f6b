//! 驱动能力模块
//!
//! 定义网关与具体协议之间的边界：
//!
//! - [`Driver`]：驱动契约（连接、读、写、地址说明、事件订阅）
//! - [`DriverDescriptor`]：驱动元数据与参数模式，实例化前校验设备参数
//! - [`DriverRegistry`]：类型标签 → 工厂，进程启动时显式注册
//! - 内置驱动：`TcpParser`（被动接收报文）、`FramedTcp`（问答式帧协议）、`Simulator`（模拟设备）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let registry = DriverRegistry::with_builtin();
//! let mut driver = registry.create(&device, DriverContext::new(&device, cancel))?;
//! if driver.connect().await {
//!     let reading = driver.read(&IoArg::new("0,2", DataType::Uint16, EndianType::BigEndian)).await;
//! }
//! ```

mod contract;
mod convert;
mod descriptor;
pub mod drivers;
mod error;
mod registry;

pub use contract::{
    AddressDefinition, Driver, DriverEvent, DriverEvents, DriverReading, IoArg,
    WRITE_NOT_SUPPORTED, WriteResponse,
};
pub use convert::{coerce, json_to_value};
pub use descriptor::{DriverDescriptor, DriverParams, ParameterKind, ParameterSpec};
pub use error::DriverError;
pub use registry::{DriverContext, DriverFactory, DriverRegistry};
