use gw_protocol::ProtocolError;

/// 驱动装配错误。
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("driver not found: {0}")]
    NotFound(String),
    #[error("invalid driver config: {0}")]
    InvalidConfig(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
