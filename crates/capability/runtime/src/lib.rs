//! # 采集运行时模块
//!
//! 把驱动契约组装成长期运行的采集任务：
//!
//! - [`DeviceRuntime`]：单设备状态机（连接 → 轮询 → 断线重连 → 停止），
//!   轮询与写入通过单一 IO 槽位互斥
//! - [`SampleCache`]：变量最新采样，失败时保留上次的值
//! - [`GatewayScheduler`]：按设备 ID 管理全部运行时，路由写入请求
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let scheduler = GatewayScheduler::new(
//!     Arc::new(DriverRegistry::with_builtin()),
//!     Arc::new(InMemoryAuditLogStore::new()),
//!     RuntimeConfig::default(),
//! );
//! scheduler.register_devices(devices).await;
//! scheduler.start_all().await;
//! let response = scheduler.dispatch("boiler-1", "setpoint", Value::Float(21.5)).await;
//! ```

mod cache;
mod device;
mod error;
mod scheduler;
mod state;

pub use cache::SampleCache;
pub use device::{DEFAULT_WRITE_METHOD, DeviceRuntime};
pub use error::RuntimeError;
pub use scheduler::{DeviceStatusView, GatewayScheduler};
pub use state::{RuntimeConfig, RuntimeState, RuntimeStatus};
