//! # 协议通用能力模块
//!
//! 各协议驱动共享的底层能力：
//! - **字节地址**：`<start>,<length>[,<extra>]` / `<byte>.<bit>` 地址解析与类型编解码
//! - **响应匹配**：十六进制前缀、`regex:`、`json:` 三类规则
//! - **帧校验**：起止标记 + 加和校验
//! - **命令关联**：请求/响应关联、超时与重试
//! - **字节传输**：单次读取即一帧的 TCP 传输，以及按编解码器切帧的 `Framed` 传输
//!
//! ## 架构设计
//!
//! ```text
//! Driver (字节流协议)            Driver (帧式请求/响应协议)
//!       │                               │
//!       ▼                               ▼
//! ByteAddress::decode          CommandCorrelator::execute
//!                                       │
//!                          ┌────────────┼─────────────┐
//!                          ▼            ▼             ▼
//!                   ByteTransport  ResponsePattern  FrameValidator
//! ```

pub mod address;
mod checksum;
mod correlator;
mod error;
mod pattern;
mod transport;

pub use address::{ByteAddress, SpanLength, hex_string, parse_hex};
pub use checksum::{ETX, FramedChecksumValidator, STX, additive_checksum};
pub use correlator::{
    AcceptAll, CommandCorrelator, CommandDefinition, CommandResponse, ERROR_CANCELLED,
    ERROR_NO_MATCH, ERROR_TIMEOUT, FrameValidator,
};
pub use error::ProtocolError;
pub use pattern::{JsonPath, PatternMatch, ResponsePattern};
pub use transport::{ByteTransport, FramedTransport, TcpTransport};
