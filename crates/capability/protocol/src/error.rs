//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 地址表达式格式错误
    #[error("address format error: {0}")]
    AddressFormat(String),

    /// 偏移或长度超出缓冲区
    #[error("out of range: start {start} + length {length} exceeds buffer size {available}")]
    OutOfRange {
        start: usize,
        length: usize,
        available: usize,
    },

    /// 值无法表示为目标数据类型
    #[error("type conversion error: {0}")]
    TypeConversion(String),

    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 响应帧校验失败
    #[error("protocol validation error: {0}")]
    ProtocolValidation(String),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 通道关闭
    #[error("channel closed")]
    ChannelClosed,
}
