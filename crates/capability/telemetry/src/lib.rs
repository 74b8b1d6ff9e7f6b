//! 追踪初始化、请求 ID 生成与运行时计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub read_failures: u64,
    pub expression_failures: u64,
    pub connect_failures: u64,
    pub reconnects: u64,
    pub writes_succeeded: u64,
    pub writes_failed: u64,
    pub writes_rejected: u64,
    pub write_latency_ms_total: u64,
    pub write_latency_ms_count: u64,
    pub telemetry_published: u64,
    pub rpc_requests: u64,
}

/// 网关运行时计数器。
pub struct TelemetryMetrics {
    polls: AtomicU64,
    read_failures: AtomicU64,
    expression_failures: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,
    writes_succeeded: AtomicU64,
    writes_failed: AtomicU64,
    writes_rejected: AtomicU64,
    write_latency_ms_total: AtomicU64,
    write_latency_ms_count: AtomicU64,
    telemetry_published: AtomicU64,
    rpc_requests: AtomicU64,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            expression_failures: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            writes_succeeded: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            writes_rejected: AtomicU64::new(0),
            write_latency_ms_total: AtomicU64::new(0),
            write_latency_ms_count: AtomicU64::new(0),
            telemetry_published: AtomicU64::new(0),
            rpc_requests: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            expression_failures: self.expression_failures.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            writes_succeeded: self.writes_succeeded.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            writes_rejected: self.writes_rejected.load(Ordering::Relaxed),
            write_latency_ms_total: self.write_latency_ms_total.load(Ordering::Relaxed),
            write_latency_ms_count: self.write_latency_ms_count.load(Ordering::Relaxed),
            telemetry_published: self.telemetry_published.load(Ordering::Relaxed),
            rpc_requests: self.rpc_requests.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可由 `RUST_LOG` 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录一次变量轮询。
pub fn record_poll() {
    metrics().polls.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次读取失败（Bad 采样）。
pub fn record_read_failure() {
    metrics().read_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次表达式求值失败。
pub fn record_expression_failure() {
    metrics().expression_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次连接失败。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次重连成功。
pub fn record_reconnect() {
    metrics().reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入结果与耗时（毫秒）。
pub fn record_write(success: bool, latency_ms: u64) {
    let metrics = metrics();
    if success {
        metrics.writes_succeeded.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.writes_failed.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .write_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .write_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一次在到达驱动前被拒绝的写入。
pub fn record_write_rejected() {
    metrics().writes_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录上送的遥测条数。
pub fn record_telemetry_published(count: u64) {
    metrics()
        .telemetry_published
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录一次收到的 RPC 请求。
pub fn record_rpc_request() {
    metrics().rpc_requests.fetch_add(1, Ordering::Relaxed);
}
