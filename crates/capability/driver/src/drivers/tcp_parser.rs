//! TCP 报文解析驱动
//!
//! 设备主动上送报文，驱动只负责接收并缓存最近一帧，读取时按地址从缓存帧中解析：
//!
//! - 字节地址（`0,4`、`2.3` 等）：按 [`ByteAddress`] 规则解码
//! - `json:<path>`：把帧视为 JSON 文本，按路径取值后转换为目标类型
//!
//! 接收在后台任务中进行，帧缓存与订阅表由接收任务与调用方共享，用互斥锁保护。

use crate::contract::{
    AddressDefinition, Driver, DriverEvent, DriverEvents, DriverReading, IoArg,
};
use crate::convert::{coerce, json_to_value};
use crate::descriptor::{DriverDescriptor, DriverParams, ParameterSpec};
use crate::error::DriverError;
use crate::registry::DriverContext;
use async_trait::async_trait;
use domain::{DataType, ParamValue};
use gw_protocol::{ByteAddress, JsonPath};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const TCP_PARSER_TYPE: &str = "TcpParser";

const JSON_PREFIX: &str = "json:";
const RECEIVE_BUFFER: usize = 4096;

/// TCP 解析驱动配置。
#[derive(Debug, Clone)]
pub struct TcpParserConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// 短于该长度的帧直接丢弃。
    pub min_frame_len: usize,
}

struct Subscription {
    targets: Vec<IoArg>,
    sender: mpsc::UnboundedSender<DriverEvent>,
}

#[derive(Default)]
struct ParserShared {
    connected: AtomicBool,
    latest: Mutex<Option<Vec<u8>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ParserShared {
    fn latest(&self) -> Option<Vec<u8>> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    fn reset(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }

    fn publish(&self, frame: Vec<u8>) {
        if let Ok(mut subscription) = self.subscription.lock() {
            let closed = subscription.as_ref().is_some_and(|subscription| {
                subscription.targets.iter().any(|target| {
                    let event = DriverEvent {
                        address: target.address.clone(),
                        reading: decode_frame(&frame, target),
                    };
                    subscription.sender.send(event).is_err()
                })
            });
            if closed {
                *subscription = None;
            }
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(frame);
        }
    }
}

/// 从一帧中按地址取值。
pub fn decode_frame(frame: &[u8], arg: &IoArg) -> DriverReading {
    if let Some(path) = arg.address.strip_prefix(JSON_PREFIX) {
        let document: serde_json::Value = match serde_json::from_slice(frame) {
            Ok(document) => document,
            Err(err) => return DriverReading::bad(format!("frame is not json: {}", err)),
        };
        let selector = match JsonPath::parse(path) {
            Ok(selector) => selector,
            Err(err) => return DriverReading::bad(err.to_string()),
        };
        return match selector.select(&document) {
            Some(node) => coerce(&json_to_value(node), arg.data_type).into(),
            None => DriverReading::bad(format!("json path '{}' not found", path)),
        };
    }
    ByteAddress::parse(&arg.address)
        .and_then(|address| address.decode(frame, arg.data_type, arg.endian))
        .into()
}

/// TCP 报文解析驱动。
pub struct TcpParserDriver {
    ctx: DriverContext,
    config: TcpParserConfig,
    shared: Arc<ParserShared>,
    receiver: Option<(CancellationToken, JoinHandle<()>)>,
}

impl TcpParserDriver {
    pub fn new(ctx: DriverContext, config: TcpParserConfig) -> Self {
        Self {
            ctx,
            config,
            shared: Arc::new(ParserShared::default()),
            receiver: None,
        }
    }

    pub fn from_params(ctx: DriverContext, params: &DriverParams) -> Result<Self, DriverError> {
        let config = TcpParserConfig {
            host: params.str("host")?.to_string(),
            port: params.u16("port")?,
            connect_timeout_ms: params.u64("connect_timeout_ms")?,
            min_frame_len: params.u64("min_frame_len")? as usize,
        };
        Ok(Self::new(ctx, config))
    }

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor {
            type_tag: TCP_PARSER_TYPE.to_string(),
            version: "1.0".to_string(),
            description: "Receives device-pushed TCP frames and decodes variables from the latest frame"
                .to_string(),
            parameters: vec![
                ParameterSpec::string("host", "Device host").required(),
                ParameterSpec::number("port", "Device TCP port").required(),
                ParameterSpec::number("connect_timeout_ms", "Connect timeout in milliseconds")
                    .with_default(ParamValue::Number(5000.0)),
                ParameterSpec::number("min_frame_len", "Frames shorter than this are dropped")
                    .with_default(ParamValue::Number(1.0)),
            ],
            address_definitions: Self::definitions(),
        }
    }

    fn definitions() -> BTreeMap<String, AddressDefinition> {
        BTreeMap::from([
            (
                "Bytes".to_string(),
                AddressDefinition::new(
                    "Byte span of the latest frame; -1 length reads to the end, third field sets decimals or text encoding",
                    DataType::Uint16,
                    "<start>,<length>[,<extra>]",
                ),
            ),
            (
                "Bit".to_string(),
                AddressDefinition::new("Single bit of one byte (0 = LSB)", DataType::Bool, "<byte>.<bit>"),
            ),
            (
                "Json".to_string(),
                AddressDefinition::new(
                    "Field of a JSON frame",
                    DataType::Double,
                    "json:<path>, e.g. json:$.data.values[0]",
                ),
            ),
        ])
    }
}

async fn receive_loop(
    mut stream: TcpStream,
    shared: Arc<ParserShared>,
    device_id: String,
    min_frame_len: usize,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; RECEIVE_BUFFER];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read(&mut buffer) => read,
        };
        match read {
            Ok(0) => {
                info!(target: "gw.driver", device_id = %device_id, "tcp_parser_peer_closed");
                break;
            }
            Ok(len) if len < min_frame_len => {
                debug!(target: "gw.driver", device_id = %device_id, frame_len = len, "frame_too_short");
            }
            Ok(len) => shared.publish(buffer[..len].to_vec()),
            Err(err) => {
                warn!(target: "gw.driver", device_id = %device_id, error = %err, "tcp_parser_receive_failed");
                break;
            }
        }
    }
    shared.connected.store(false, Ordering::SeqCst);
}

#[async_trait]
impl Driver for TcpParserDriver {
    async fn connect(&mut self) -> bool {
        self.close().await;
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!(target: "gw.driver", device_id = %self.ctx.device_id, addr = %addr, error = %err, "tcp_parser_connect_failed");
                return false;
            }
            Err(_) => {
                warn!(target: "gw.driver", device_id = %self.ctx.device_id, addr = %addr, "tcp_parser_connect_timeout");
                return false;
            }
        };

        self.shared.connected.store(true, Ordering::SeqCst);
        let cancel = self.ctx.cancel.child_token();
        let task = tokio::spawn(receive_loop(
            stream,
            self.shared.clone(),
            self.ctx.device_id.clone(),
            self.config.min_frame_len,
            cancel.clone(),
        ));
        self.receiver = Some((cancel, task));
        info!(target: "gw.driver", device_id = %self.ctx.device_id, addr = %addr, "tcp_parser_connected");
        true
    }

    async fn close(&mut self) -> bool {
        if let Some((cancel, task)) = self.receiver.take() {
            cancel.cancel();
            let _ = task.await;
        }
        self.shared.reset();
        true
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn read(&mut self, arg: &IoArg) -> DriverReading {
        if !self.is_connected() {
            return DriverReading::bad("not connected");
        }
        match self.shared.latest() {
            Some(frame) => decode_frame(&frame, arg),
            None => DriverReading::bad("no frame received"),
        }
    }

    fn address_definitions(&self) -> Option<BTreeMap<String, AddressDefinition>> {
        Some(Self::definitions())
    }

    fn subscribe(&mut self, targets: Vec<IoArg>) -> Option<DriverEvents> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut subscription) = self.shared.subscription.lock() {
            *subscription = Some(Subscription { targets, sender });
        }
        Some(receiver)
    }
}

impl Drop for TcpParserDriver {
    fn drop(&mut self) {
        if let Some((cancel, task)) = self.receiver.take() {
            cancel.cancel();
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{EndianType, StatusType, Value};

    #[test]
    fn test_decode_byte_and_json_addresses() {
        let frame = [0x01, 0x02, 0xFF];
        let reading = decode_frame(&frame, &IoArg::new("0,2", DataType::Uint16, EndianType::BigEndian));
        assert_eq!(reading.value, Value::UInt(0x0102));

        let json = br#"{"data":{"values":[21.5,22.0]}}"#;
        let reading = decode_frame(
            json,
            &IoArg::new("json:$.data.values[0]", DataType::Double, EndianType::BigEndian),
        );
        assert_eq!(reading.value, Value::Float(21.5));

        let missing = decode_frame(
            json,
            &IoArg::new("json:data.nope", DataType::Double, EndianType::BigEndian),
        );
        assert_eq!(missing.status, StatusType::Bad);

        let short = decode_frame(&frame, &IoArg::new("2,4", DataType::Int32, EndianType::BigEndian));
        assert_eq!(short.status, StatusType::Bad);
    }
}
