//! 命令关联器
//!
//! 在已打开的字节传输上完成一次"请求 → 匹配响应"交互：
//!
//! 1. 发送命令数据
//! 2. 等待入站帧，直到匹配响应规则或单次超时（不匹配的帧视为无关流量丢弃）
//! 3. 匹配后交给 [`FrameValidator`] 做结构校验，校验失败的帧同样丢弃并继续等待
//! 4. 超时 / 无匹配时按 `retry_interval` 重试 `retry_count` 次
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let correlator = CommandCorrelator::with_validator(FramedChecksumValidator::stx_etx());
//! let command = CommandDefinition::new(frame, "02-01").with_timeout(Duration::from_millis(500));
//! let response = correlator.execute(&mut transport, &command).await;
//! if response.success { /* response.raw_data */ }
//! ```

use crate::error::ProtocolError;
use crate::pattern::ResponsePattern;
use crate::transport::ByteTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 超时且未收到任何帧。
pub const ERROR_TIMEOUT: &str = "timeout";
/// 收到帧但均不匹配。
pub const ERROR_NO_MATCH: &str = "no match";
/// 等待期间被取消。
pub const ERROR_CANCELLED: &str = "cancelled";

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_interval() -> Duration {
    Duration::from_millis(1000)
}

/// 命令定义（单次调用有效）。
#[derive(Debug, Clone)]
pub struct CommandDefinition {
    pub command_id: String,
    pub data: Vec<u8>,
    pub response_pattern: String,
    pub timeout: Duration,
    /// 首次尝试之外的重试次数。
    pub retry_count: u32,
    pub retry_interval: Duration,
}

impl CommandDefinition {
    pub fn new(data: impl Into<Vec<u8>>, response_pattern: impl Into<String>) -> Self {
        Self {
            command_id: uuid::Uuid::new_v4().to_string(),
            data: data.into(),
            response_pattern: response_pattern.into(),
            timeout: default_timeout(),
            retry_count: default_retry_count(),
            retry_interval: default_retry_interval(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry_count: u32, retry_interval: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_interval = retry_interval;
        self
    }
}

/// 命令执行结果。
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub command_id: String,
    pub success: bool,
    pub raw_data: Option<Vec<u8>>,
    pub parsed_data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time: Duration,
    /// 实际尝试次数（含首次）。
    pub attempts: u32,
}

/// 响应帧结构校验（起止标记、校验和等）。
pub trait FrameValidator: Send + Sync {
    fn validate(&self, frame: &[u8]) -> Result<(), ProtocolError>;
}

/// 不做额外校验。
#[derive(Debug, Default)]
pub struct AcceptAll;

impl FrameValidator for AcceptAll {
    fn validate(&self, _frame: &[u8]) -> Result<(), ProtocolError> {
        Ok(())
    }
}

enum Attempt {
    Matched {
        frame: Vec<u8>,
        parsed: Option<serde_json::Value>,
    },
    Failed(String),
    Cancelled,
}

/// 命令关联器。
#[derive(Clone)]
pub struct CommandCorrelator {
    validator: Arc<dyn FrameValidator>,
    cancel: CancellationToken,
}

impl Default for CommandCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self {
            validator: Arc::new(AcceptAll),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_validator(validator: impl FrameValidator + 'static) -> Self {
        Self {
            validator: Arc::new(validator),
            cancel: CancellationToken::new(),
        }
    }

    /// 绑定取消信号；取消后等待立即结束。
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 执行命令并等待匹配响应。
    pub async fn execute<T>(&self, transport: &mut T, command: &CommandDefinition) -> CommandResponse
    where
        T: ByteTransport + ?Sized,
    {
        let started_at = Instant::now();
        let finish = |success: bool,
                      raw_data: Option<Vec<u8>>,
                      parsed_data: Option<serde_json::Value>,
                      error: Option<String>,
                      attempts: u32| CommandResponse {
            command_id: command.command_id.clone(),
            success,
            raw_data,
            parsed_data,
            error,
            execution_time: started_at.elapsed(),
            attempts,
        };

        let pattern = match ResponsePattern::parse(&command.response_pattern) {
            Ok(pattern) => pattern,
            Err(err) => return finish(false, None, None, Some(err.to_string()), 0),
        };

        let mut last_error = ERROR_TIMEOUT.to_string();
        let mut attempts = 0;
        while attempts <= command.retry_count {
            if attempts > 0 {
                debug!(
                    target: "gw.protocol",
                    command_id = %command.command_id,
                    attempt = attempts + 1,
                    reason = %last_error,
                    "command_retry"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return finish(false, None, None, Some(ERROR_CANCELLED.to_string()), attempts);
                    }
                    _ = tokio::time::sleep(command.retry_interval) => {}
                }
            }
            attempts += 1;
            match self.attempt(transport, command, &pattern).await {
                Attempt::Matched { frame, parsed } => {
                    return finish(true, Some(frame), parsed, None, attempts);
                }
                Attempt::Failed(reason) => last_error = reason,
                Attempt::Cancelled => {
                    return finish(false, None, None, Some(ERROR_CANCELLED.to_string()), attempts);
                }
            }
        }

        warn!(
            target: "gw.protocol",
            command_id = %command.command_id,
            attempts = attempts,
            error = %last_error,
            "command_failed"
        );
        finish(false, None, None, Some(last_error), attempts)
    }

    async fn attempt<T>(
        &self,
        transport: &mut T,
        command: &CommandDefinition,
        pattern: &ResponsePattern,
    ) -> Attempt
    where
        T: ByteTransport + ?Sized,
    {
        // 上一条命令超时后迟到的应答不能被本条命令匹配
        let stale = transport.discard_pending().await;
        if stale > 0 {
            debug!(
                target: "gw.protocol",
                command_id = %command.command_id,
                stale,
                "stale_frames_discarded"
            );
        }
        if let Err(err) = transport.send(&command.data).await {
            return Attempt::Failed(err.to_string());
        }

        let deadline = Instant::now() + command.timeout;
        let mut received_any = false;
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return Attempt::Cancelled,
                received = tokio::time::timeout_at(deadline, transport.recv()) => received,
            };
            let frame = match received {
                Err(_) if received_any => return Attempt::Failed(ERROR_NO_MATCH.to_string()),
                Err(_) => return Attempt::Failed(ERROR_TIMEOUT.to_string()),
                Ok(Err(err)) => return Attempt::Failed(err.to_string()),
                Ok(Ok(frame)) => frame,
            };
            received_any = true;

            let Some(matched) = pattern.matches(&frame) else {
                debug!(
                    target: "gw.protocol",
                    command_id = %command.command_id,
                    frame_len = frame.len(),
                    "frame_discarded"
                );
                continue;
            };
            match self.validator.validate(&frame) {
                Ok(()) => {
                    return Attempt::Matched {
                        frame,
                        parsed: matched.parsed,
                    }
                }
                Err(err) => {
                    debug!(
                        target: "gw.protocol",
                        command_id = %command.command_id,
                        error = %err,
                        "frame_rejected"
                    );
                }
            }
        }
    }
}
