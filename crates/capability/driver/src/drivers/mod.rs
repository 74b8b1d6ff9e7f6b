//! 内置驱动

mod framed_tcp;
mod simulator;
mod tcp_parser;

pub use framed_tcp::{
    CMD_READ, CMD_WRITE, FRAMED_TCP_TYPE, FramedTcpConfig, FramedTcpDriver, FramedTcpValidator,
    encode_frame, split_payload,
};
pub use simulator::{SIMULATOR_TYPE, SimulatorConfig, SimulatorDriver};
pub use tcp_parser::{TCP_PARSER_TYPE, TcpParserConfig, TcpParserDriver, decode_frame};
