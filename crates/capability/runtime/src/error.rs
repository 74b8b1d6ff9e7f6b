use gw_driver::DriverError;

/// 运行时与调度错误；写入路径上渲染为 `RpcResponse.description`。
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("variable is read-only: {0}")]
    ProtectedVariable(String),
    #[error("variable not found: {0}")]
    VariableNotFound(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("runtime not started: {0}")]
    RuntimeNotStarted(String),
    #[error("device not connected: {0}")]
    NotConnected(String),
    #[error("device is a group and cannot run: {0}")]
    NotRunnable(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
}
