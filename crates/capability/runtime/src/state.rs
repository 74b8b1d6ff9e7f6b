//! 运行状态与运行参数。

use domain::now_epoch_ms;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// 设备运行状态机：`Stopped → Connecting → Polling ⇄ Reconnecting → Stopped`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Stopped,
    Connecting,
    Polling,
    Reconnecting,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RuntimeState::Stopped => "stopped",
            RuntimeState::Connecting => "connecting",
            RuntimeState::Polling => "polling",
            RuntimeState::Reconnecting => "reconnecting",
        };
        f.write_str(text)
    }
}

/// 状态与原因（停止原因、最近一次连接失败等）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub state: RuntimeState,
    pub reason: Option<String>,
    pub since_ms: i64,
}

impl RuntimeStatus {
    pub fn new(state: RuntimeState, reason: Option<String>) -> Self {
        Self {
            state,
            reason,
            since_ms: now_epoch_ms(),
        }
    }

    pub fn stopped() -> Self {
        Self::new(RuntimeState::Stopped, None)
    }
}

/// 全部设备共用的运行参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 重连初始间隔（实际取与设备 `min_period` 的较大值）。
    pub reconnect_interval: Duration,
    /// 重连间隔上限。
    pub reconnect_max: Duration,
    /// 单次驱动调用的保护超时。
    pub io_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(1000),
            reconnect_max: Duration::from_millis(30_000),
            io_timeout: Duration::from_millis(10_000),
        }
    }
}

impl RuntimeConfig {
    pub(crate) fn backoff(&self, min_period: Duration) -> Backoff {
        let initial = self.reconnect_interval.max(min_period);
        Backoff {
            initial,
            current: initial,
            max: self.reconnect_max.max(initial),
        }
    }
}

/// 指数退避：每次翻倍直至上限，连接成功后复位。
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_starts_at_min_period_and_caps() {
        let config = RuntimeConfig {
            reconnect_interval: Duration::from_millis(100),
            reconnect_max: Duration::from_millis(500),
            io_timeout: Duration::from_millis(1000),
        };
        let mut backoff = config.backoff(Duration::from_millis(200));
        let delays: Vec<u128> = (0..4).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![200, 400, 500, 500]);
        backoff.reset();
        assert_eq!(backoff.next_delay().as_millis(), 200);
    }

    #[test]
    fn test_backoff_max_never_below_initial() {
        let config = RuntimeConfig {
            reconnect_interval: Duration::from_millis(100),
            reconnect_max: Duration::from_millis(50),
            io_timeout: Duration::from_millis(1000),
        };
        let mut backoff = config.backoff(Duration::from_millis(10));
        assert_eq!(backoff.next_delay().as_millis(), 100);
        assert_eq!(backoff.next_delay().as_millis(), 100);
    }
}
