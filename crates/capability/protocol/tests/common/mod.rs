use async_trait::async_trait;
use gw_protocol::{ByteTransport, ProtocolError};
use std::collections::VecDeque;
use std::time::Duration;

/// 按脚本回放响应的传输：每次 send 之后依次吐出对应的一组帧。
#[derive(Default)]
pub struct ScriptedTransport {
    replies: VecDeque<Vec<(Duration, Vec<u8>)>>,
    pending: VecDeque<(Duration, Vec<u8>)>,
    pub sent: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为下一次 send 追加一组回复帧。
    pub fn reply(mut self, frames: Vec<(u64, Vec<u8>)>) -> Self {
        self.replies.push_back(
            frames
                .into_iter()
                .map(|(delay_ms, frame)| (Duration::from_millis(delay_ms), frame))
                .collect(),
        );
        self
    }
}

#[async_trait]
impl ByteTransport for ScriptedTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.sent.push(data.to_vec());
        if let Some(frames) = self.replies.pop_front() {
            self.pending.extend(frames);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<u8>, ProtocolError> {
        match self.pending.pop_front() {
            Some((delay, frame)) => {
                tokio::time::sleep(delay).await;
                Ok(frame)
            }
            None => std::future::pending().await,
        }
    }
}

/// 构造 `STX | body | CRC | ETX` 帧。
pub fn stx_frame(body: &[u8]) -> Vec<u8> {
    let mut frame = vec![gw_protocol::STX];
    frame.extend_from_slice(body);
    frame.push(gw_protocol::additive_checksum(body));
    frame.push(gw_protocol::ETX);
    frame
}
