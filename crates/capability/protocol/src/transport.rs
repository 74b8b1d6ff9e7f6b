//! 字节传输抽象
//!
//! 命令关联器只依赖 [`ByteTransport`]，具体链路（TCP、串口等）由驱动提供。
//!
//! - [`TcpTransport`]：一次读取即一帧，适合报文之间有明显间隔的设备
//! - [`FramedTransport`]：由编解码器从字节流中切出完整帧，处理分包与粘包

use crate::error::ProtocolError;
use async_trait::async_trait;
use futures::{FutureExt, SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::debug;

/// 默认单次读取缓冲大小。
const DEFAULT_READ_BUFFER: usize = 4096;

/// 双向字节传输。
///
/// `recv` 必须可安全取消（被丢弃时不丢失已读取的数据），关联器依赖这一点实现超时。
#[async_trait]
pub trait ByteTransport: Send {
    /// 发送完整数据。
    async fn send(&mut self, data: &[u8]) -> Result<(), ProtocolError>;

    /// 接收下一帧数据。
    async fn recv(&mut self) -> Result<Vec<u8>, ProtocolError>;

    /// 丢弃已到达但尚未读取的帧，返回丢弃的帧数。发送新命令前调用。
    async fn discard_pending(&mut self) -> usize {
        0
    }
}

/// TCP 传输：一次读取即视为一帧。
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    read_buffer: usize,
}

impl TcpTransport {
    /// 建立连接（带超时）。
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ProtocolError> {
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connect to {}", addr)))?
            .map_err(|err| ProtocolError::Connection(format!("{}: {}", addr, err)))?;
        let _ = stream.set_nodelay(true);
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }

    /// 关闭写半部。
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl ByteTransport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut buffer = vec![0u8; self.read_buffer];
        let read = self.stream.read(&mut buffer).await?;
        if read == 0 {
            return Err(ProtocolError::Connection("peer closed connection".to_string()));
        }
        buffer.truncate(read);
        Ok(buffer)
    }
}

/// 基于编解码器的 TCP 传输。
///
/// 解码器负责判断帧边界；半帧留在读缓冲中等待后续数据，多帧依次返回。
pub struct FramedTransport<C> {
    framed: Framed<TcpStream, C>,
}

impl<C> FramedTransport<C>
where
    C: Decoder<Item = Vec<u8>, Error = ProtocolError>
        + Encoder<Vec<u8>, Error = ProtocolError>
        + Send
        + Unpin,
{
    /// 建立连接（带超时）。
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        codec: C,
    ) -> Result<Self, ProtocolError> {
        let transport = TcpTransport::connect(host, port, timeout).await?;
        Ok(Self::from_stream(transport.stream, codec))
    }

    pub fn from_stream(stream: TcpStream, codec: C) -> Self {
        Self {
            framed: Framed::new(stream, codec),
        }
    }

    /// 关闭写半部。
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<C> ByteTransport for FramedTransport<C>
where
    C: Decoder<Item = Vec<u8>, Error = ProtocolError>
        + Encoder<Vec<u8>, Error = ProtocolError>
        + Send
        + Unpin,
{
    async fn send(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.framed.send(data.to_vec()).await
    }

    async fn recv(&mut self) -> Result<Vec<u8>, ProtocolError> {
        match self.framed.next().await {
            Some(frame) => frame,
            None => Err(ProtocolError::Connection(
                "peer closed connection".to_string(),
            )),
        }
    }

    async fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        // 只取立即可得的帧，不等待
        while let Some(Some(Ok(frame))) = self.framed.next().now_or_never() {
            discarded += 1;
            debug!(target: "gw.protocol", frame_len = frame.len(), "stale_frame_discarded");
        }
        discarded
    }
}
