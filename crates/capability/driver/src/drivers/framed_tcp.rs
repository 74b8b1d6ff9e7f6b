//! 定长帧问答式 TCP 驱动
//!
//! 网关主动发起请求，设备逐条应答。帧格式：
//!
//! ```text
//! STX | CMD | STATUS | LEN | DATA[LEN] | CRC | ETX
//! ```
//!
//! - `CMD`：`0x01` 读，`0x02` 写；应答沿用请求的 `CMD`
//! - `STATUS`：请求固定为 0，应答非 0 表示设备拒绝
//! - `DATA`：ASCII 文本；读请求为变量地址，写请求为 `地址=值`，读应答为值文本
//! - `CRC`：`CMD..DATA` 的加和校验
//!
//! 帧边界由 [`FramedTcpCodec`] 按 `LEN` 字段判断，TCP 分包与粘包都在解码器中处理；
//! 请求/应答的匹配、重试与校验由 [`CommandCorrelator`] 完成。

use crate::contract::{AddressDefinition, Driver, DriverReading, IoArg, WriteResponse};
use crate::convert::coerce;
use crate::descriptor::{DriverDescriptor, DriverParams, ParameterSpec};
use crate::error::DriverError;
use crate::registry::DriverContext;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use domain::{DataType, ParamValue, Value};
use gw_protocol::{
    ByteTransport, CommandCorrelator, CommandDefinition, ETX, FrameValidator,
    FramedChecksumValidator, FramedTransport, ProtocolError, STX, additive_checksum, hex_string,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

pub const FRAMED_TCP_TYPE: &str = "FramedTcp";

pub const CMD_READ: u8 = 0x01;
pub const CMD_WRITE: u8 = 0x02;

/// 帧头（STX、CMD、STATUS、LEN）长度。
const HEADER_LEN: usize = 4;
/// 帧尾（CRC、ETX）长度。
const TRAILER_LEN: usize = 2;

/// 组帧。数据超过 255 字节时报错。
pub fn encode_frame(cmd: u8, status: u8, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u8::try_from(data.len()).map_err(|_| {
        ProtocolError::TypeConversion(format!("frame payload too long: {} bytes", data.len()))
    })?;
    let mut frame = Vec::with_capacity(HEADER_LEN + data.len() + TRAILER_LEN);
    frame.extend_from_slice(&[STX, cmd, status, len]);
    frame.extend_from_slice(data);
    frame.push(additive_checksum(&frame[1..]));
    frame.push(ETX);
    Ok(frame)
}

/// 拆出应答的 STATUS 与 DATA（帧已通过 [`FramedTcpValidator`] 校验）。
pub fn split_payload(frame: &[u8]) -> (u8, &[u8]) {
    let status = frame.get(2).copied().unwrap_or_default();
    let end = frame.len().saturating_sub(TRAILER_LEN).max(HEADER_LEN);
    (status, frame.get(HEADER_LEN..end).unwrap_or_default())
}

/// 起止标记、加和校验与 LEN 字段一致性校验。
#[derive(Debug, Clone)]
pub struct FramedTcpValidator {
    checksum: FramedChecksumValidator,
}

impl Default for FramedTcpValidator {
    fn default() -> Self {
        Self {
            checksum: FramedChecksumValidator {
                min_len: HEADER_LEN + TRAILER_LEN,
                ..FramedChecksumValidator::stx_etx()
            },
        }
    }
}

impl FrameValidator for FramedTcpValidator {
    fn validate(&self, frame: &[u8]) -> Result<(), ProtocolError> {
        self.checksum.validate(frame)?;
        let declared = usize::from(frame[3]);
        let actual = frame.len() - HEADER_LEN - TRAILER_LEN;
        if declared != actual {
            return Err(ProtocolError::ProtocolValidation(format!(
                "length field {} does not match payload {}",
                declared, actual
            )));
        }
        Ok(())
    }
}

/// 按 `LEN` 字段切帧的编解码器。
///
/// STX 之前的字节丢弃；帧未收全时返回 `Ok(None)` 等待后续数据；
/// 按 LEN 算出的末字节不是 ETX 时跳过当前 STX 重新同步。
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedTcpCodec;

impl Decoder for FramedTcpCodec {
    type Item = Vec<u8>;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(start) = src.iter().position(|&b| b == STX) else {
                if !src.is_empty() {
                    debug!(target: "gw.protocol", skipped = src.len(), "framed_tcp_garbage_skipped");
                    src.clear();
                }
                return Ok(None);
            };
            if start > 0 {
                debug!(target: "gw.protocol", skipped = start, "framed_tcp_garbage_skipped");
                src.advance(start);
            }
            if src.len() < HEADER_LEN {
                return Ok(None);
            }
            let total = HEADER_LEN + usize::from(src[3]) + TRAILER_LEN;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }
            if src[total - 1] != ETX {
                src.advance(1);
                continue;
            }
            return Ok(Some(src.split_to(total).to_vec()));
        }
    }
}

impl Encoder<Vec<u8>> for FramedTcpCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// 问答驱动配置。
#[derive(Debug, Clone)]
pub struct FramedTcpConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub retry_count: u32,
    pub retry_interval_ms: u64,
}

/// 传输出错即标记链路失效，`is_connected` 随之变为 false。
struct Link {
    transport: FramedTransport<FramedTcpCodec>,
    broken: bool,
}

#[async_trait]
impl ByteTransport for Link {
    async fn send(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let result = self.transport.send(data).await;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    async fn recv(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let result = self.transport.recv().await;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    async fn discard_pending(&mut self) -> usize {
        self.transport.discard_pending().await
    }
}

/// 问答式 TCP 驱动。
pub struct FramedTcpDriver {
    ctx: DriverContext,
    config: FramedTcpConfig,
    correlator: CommandCorrelator,
    link: Option<Link>,
}

impl FramedTcpDriver {
    pub fn new(ctx: DriverContext, config: FramedTcpConfig) -> Self {
        let correlator = CommandCorrelator::with_validator(FramedTcpValidator::default())
            .with_cancellation(ctx.cancel.clone());
        Self {
            ctx,
            config,
            correlator,
            link: None,
        }
    }

    pub fn from_params(ctx: DriverContext, params: &DriverParams) -> Result<Self, DriverError> {
        let retry_count = u32::try_from(params.u64("retry_count")?).map_err(|_| {
            DriverError::InvalidConfig("parameter 'retry_count' out of range".to_string())
        })?;
        let config = FramedTcpConfig {
            host: params.str("host")?.to_string(),
            port: params.u16("port")?,
            connect_timeout_ms: params.u64("connect_timeout_ms")?,
            response_timeout_ms: params.u64("response_timeout_ms")?,
            retry_count,
            retry_interval_ms: params.u64("retry_interval_ms")?,
        };
        Ok(Self::new(ctx, config))
    }

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor {
            type_tag: FRAMED_TCP_TYPE.to_string(),
            version: "1.0".to_string(),
            description: "Request/response driver for STX/ETX framed devices with additive checksum"
                .to_string(),
            parameters: vec![
                ParameterSpec::string("host", "Device host").required(),
                ParameterSpec::number("port", "Device TCP port").required(),
                ParameterSpec::number("connect_timeout_ms", "Connect timeout in milliseconds")
                    .with_default(ParamValue::Number(3000.0)),
                ParameterSpec::number("response_timeout_ms", "Per-attempt response timeout")
                    .with_default(ParamValue::Number(1000.0)),
                ParameterSpec::number("retry_count", "Retries after the first attempt")
                    .with_default(ParamValue::Number(2.0)),
                ParameterSpec::number("retry_interval_ms", "Delay between attempts")
                    .with_default(ParamValue::Number(200.0)),
            ],
            address_definitions: Self::definitions(),
        }
    }

    fn definitions() -> BTreeMap<String, AddressDefinition> {
        BTreeMap::from([(
            "Register".to_string(),
            AddressDefinition::new(
                "Named register; the device answers with the value as ASCII text",
                DataType::Double,
                "<register name>",
            ),
        )])
    }

    fn command(&self, cmd: u8, data: &[u8]) -> Result<CommandDefinition, ProtocolError> {
        let frame = encode_frame(cmd, 0, data)?;
        Ok(CommandDefinition::new(frame, hex_string(&[STX, cmd]))
            .with_timeout(Duration::from_millis(self.config.response_timeout_ms))
            .with_retry(
                self.config.retry_count,
                Duration::from_millis(self.config.retry_interval_ms),
            ))
    }

    /// 发送请求并返回应答 DATA；设备状态非 0 视为失败。
    async fn exchange(&mut self, cmd: u8, data: &[u8]) -> Result<Vec<u8>, String> {
        let command = self.command(cmd, data).map_err(|err| err.to_string())?;
        let Some(link) = self.link.as_mut().filter(|link| !link.broken) else {
            return Err("not connected".to_string());
        };
        let response = self.correlator.execute(link, &command).await;
        if !response.success {
            return Err(response.error.unwrap_or_else(|| "request failed".to_string()));
        }
        let frame = response.raw_data.unwrap_or_default();
        let (status, payload) = split_payload(&frame);
        if status != 0 {
            return Err(format!("device rejected request, status {:02X}", status));
        }
        Ok(payload.to_vec())
    }
}

#[async_trait]
impl Driver for FramedTcpDriver {
    async fn connect(&mut self) -> bool {
        self.close().await;
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        match FramedTransport::connect(&self.config.host, self.config.port, timeout, FramedTcpCodec)
            .await
        {
            Ok(transport) => {
                self.link = Some(Link {
                    transport,
                    broken: false,
                });
                info!(
                    target: "gw.driver",
                    device_id = %self.ctx.device_id,
                    host = %self.config.host,
                    port = self.config.port,
                    "framed_tcp_connected"
                );
                true
            }
            Err(err) => {
                warn!(
                    target: "gw.driver",
                    device_id = %self.ctx.device_id,
                    error = %err,
                    "framed_tcp_connect_failed"
                );
                false
            }
        }
    }

    async fn close(&mut self) -> bool {
        if let Some(mut link) = self.link.take() {
            let _ = link.transport.shutdown().await;
        }
        true
    }

    fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.broken)
    }

    async fn read(&mut self, arg: &IoArg) -> DriverReading {
        match self.exchange(CMD_READ, arg.address.as_bytes()).await {
            Ok(payload) => {
                let text = String::from_utf8_lossy(&payload).trim().to_string();
                coerce(&Value::String(text), arg.data_type).into()
            }
            Err(message) => DriverReading::bad(message),
        }
    }

    async fn write(
        &mut self,
        request_id: &str,
        method: &str,
        arg: &IoArg,
        value: &Value,
    ) -> WriteResponse {
        if method != "write" {
            return WriteResponse::failed(format!("method '{}' not supported", method));
        }
        let value = match coerce(value, arg.data_type) {
            Ok(value) => value,
            Err(err) => return WriteResponse::failed(err.to_string()),
        };
        let data = format!("{}={}", arg.address, value);
        match self.exchange(CMD_WRITE, data.as_bytes()).await {
            Ok(_) => {
                info!(
                    target: "gw.driver",
                    device_id = %self.ctx.device_id,
                    request_id = %request_id,
                    address = %arg.address,
                    "framed_tcp_write_acknowledged"
                );
                WriteResponse::ok("write acknowledged")
            }
            Err(message) => WriteResponse::failed(message),
        }
    }

    fn address_definitions(&self) -> Option<BTreeMap<String, AddressDefinition>> {
        Some(Self::definitions())
    }
}
