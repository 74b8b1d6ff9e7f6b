//! Handlers 模块

pub mod devices;
pub mod dispatch;
pub mod rpc_logs;
pub mod system;

pub use devices::*;
pub use dispatch::*;
pub use rpc_logs::*;
pub use system::*;
