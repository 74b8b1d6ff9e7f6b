//! 设备运行时
//!
//! 每个设备一个长期运行的任务，独占一个驱动实例：
//!
//! 1. `Connecting`：调用 `connect`，失败进入 `Reconnecting` 并按退避间隔重试
//! 2. `Polling`：逐个轮询到期变量（距上次读取 ≥ `min_period`），经表达式得到工程值后写入缓存
//! 3. 读取后发现连接已断开，或一轮读取全部失败 → 关闭驱动并进入 `Reconnecting`
//! 4. `stop`：取消等待、等待在途 IO 结束、关闭驱动 → `Stopped`
//!
//! 驱动放在单一 IO 槽位（异步互斥锁）中，轮询与写入在同一设备上互斥，不同设备完全并行。

use crate::cache::SampleCache;
use crate::error::RuntimeError;
use crate::state::{RuntimeConfig, RuntimeState, RuntimeStatus};
use domain::{
    DeviceConfig, DeviceKind, RpcLog, RpcRequest, RpcResponse, StatusType, TelemetryRecord,
    VariableConfig, now_epoch_ms,
};
use gw_driver::{
    Driver, DriverContext, DriverEvent, DriverEvents, DriverReading, DriverRegistry, IoArg,
    WriteResponse,
};
use gw_normalize::{Expression, ValueHistory};
use gw_storage::AuditLogStore;
use gw_telemetry::{
    record_connect_failure, record_expression_failure, record_poll, record_read_failure,
    record_reconnect, record_write, record_write_rejected,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 未指定方法时的写入方法名。
pub const DEFAULT_WRITE_METHOD: &str = "write";

type DriverSlot = Arc<Mutex<Option<Box<dyn Driver>>>>;

/// 单个变量的轮询计划。
struct PlannedVariable {
    name: String,
    arg: IoArg,
    expression: Option<Result<Expression, String>>,
    history: ValueHistory,
    last_polled: Option<Instant>,
    last_read_good: bool,
}

impl PlannedVariable {
    fn new(variable: &VariableConfig) -> Self {
        let expression = variable
            .expression
            .as_deref()
            .map(str::trim)
            .filter(|source| !source.is_empty())
            .map(|source| {
                Expression::compile(source).map_err(|err| format!("expression error: {}", err))
            });
        Self {
            name: variable.name.clone(),
            arg: io_arg(variable),
            expression,
            history: ValueHistory::default(),
            last_polled: None,
            last_read_good: false,
        }
    }
}

fn io_arg(variable: &VariableConfig) -> IoArg {
    let arg = IoArg::new(variable.address.clone(), variable.data_type, variable.endian);
    match variable.method.as_deref().map(str::trim) {
        Some(method) if !method.is_empty() => arg.with_method(method),
        _ => arg,
    }
}

enum PollExit {
    Cancelled,
    Disconnected(String),
}

/// 运行任务与外部调用共享的部分。
struct RuntimeInner {
    device: DeviceConfig,
    config: RuntimeConfig,
    slot: DriverSlot,
    cache: SampleCache,
    status: watch::Sender<RuntimeStatus>,
    audit: Arc<dyn AuditLogStore>,
}

impl RuntimeInner {
    fn min_period(&self) -> Duration {
        Duration::from_millis(self.device.min_period_ms.max(1))
    }

    fn set_status(&self, state: RuntimeState, reason: Option<String>) {
        self.status.send_replace(RuntimeStatus::new(state, reason));
    }

    /// 参与轮询的变量：可读且非事件驱动。
    fn polled_variables(&self) -> Vec<PlannedVariable> {
        self.device
            .variables
            .iter()
            .filter(|variable| variable.protect.readable() && !variable.is_trigger)
            .map(PlannedVariable::new)
            .collect()
    }

    fn trigger_variables(&self) -> Vec<PlannedVariable> {
        self.device
            .variables
            .iter()
            .filter(|variable| variable.protect.readable() && variable.is_trigger)
            .map(PlannedVariable::new)
            .collect()
    }

    async fn connect(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let Some(driver) = slot.as_mut() else {
            return false;
        };
        tokio::time::timeout(self.config.io_timeout, driver.connect())
            .await
            .unwrap_or(false)
    }

    async fn subscribe(&self, triggers: &[PlannedVariable]) -> Option<DriverEvents> {
        if triggers.is_empty() {
            return None;
        }
        let mut slot = self.slot.lock().await;
        let driver = slot.as_mut()?;
        let targets = triggers.iter().map(|variable| variable.arg.clone()).collect();
        let events = driver.subscribe(targets);
        if events.is_none() {
            warn!(
                target: "gw.runtime",
                device_id = %self.device.id,
                triggers = triggers.len(),
                "driver_has_no_event_path"
            );
        }
        events
    }

    async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(driver) = slot.as_mut() {
            let _ = tokio::time::timeout(self.config.io_timeout, driver.close()).await;
        }
    }

    async fn connected(&self) -> bool {
        let slot = self.slot.lock().await;
        slot.as_ref().is_some_and(|driver| driver.is_connected())
    }

    /// 读取一个变量，返回读数与读取后的连接状态。
    async fn read(&self, arg: &IoArg) -> (DriverReading, bool) {
        let mut slot = self.slot.lock().await;
        let Some(driver) = slot.as_mut() else {
            return (DriverReading::bad("runtime not started"), false);
        };
        let reading = match tokio::time::timeout(self.config.io_timeout, driver.read(arg)).await {
            Ok(reading) => reading,
            Err(_) => DriverReading::bad(format!(
                "read timed out after {} ms",
                self.config.io_timeout.as_millis()
            )),
        };
        (reading, driver.is_connected())
    }

    /// 读数 → 表达式 → 缓存。
    fn apply(&self, variable: &mut PlannedVariable, reading: DriverReading) {
        record_poll();
        variable.last_read_good = reading.status == StatusType::Good;
        if reading.status == StatusType::Bad {
            record_read_failure();
            let message = reading
                .message
                .unwrap_or_else(|| "read failed".to_string());
            debug!(
                target: "gw.runtime",
                device_id = %self.device.id,
                variable = %variable.name,
                message = %message,
                "variable_read_failed"
            );
            self.cache.mark_bad(&variable.name, message);
            return;
        }

        let cooked = match &variable.expression {
            None => Ok(reading.value.clone()),
            Some(Ok(expression)) => expression
                .evaluate(&reading.value, &variable.history)
                .map_err(|err| err.to_string()),
            Some(Err(message)) => Err(message.clone()),
        };
        variable.history.push(reading.value.clone());
        match cooked {
            Ok(cooked) => self.cache.update(
                &variable.name,
                reading.value,
                cooked,
                reading.status,
                reading.timestamp_ms,
                reading.message,
            ),
            Err(message) => {
                record_expression_failure();
                self.cache.mark_bad(&variable.name, message);
            }
        }
    }

    fn apply_event(&self, triggers: &mut [PlannedVariable], event: DriverEvent) {
        let mut matched = false;
        for variable in triggers
            .iter_mut()
            .filter(|variable| variable.arg.address == event.address)
        {
            matched = true;
            self.apply(variable, event.reading.clone());
        }
        if !matched {
            debug!(
                target: "gw.runtime",
                device_id = %self.device.id,
                address = %event.address,
                "event_without_variable"
            );
        }
    }

    async fn poll(
        &self,
        cancel: &CancellationToken,
        variables: &mut [PlannedVariable],
        triggers: &mut [PlannedVariable],
        events: &mut Option<DriverEvents>,
    ) -> PollExit {
        let min_period = self.min_period();
        let cmd_period = Duration::from_millis(self.device.cmd_period_ms);
        loop {
            let mut read_in_cycle = false;
            for variable in variables.iter_mut() {
                if cancel.is_cancelled() {
                    return PollExit::Cancelled;
                }
                let due = variable
                    .last_polled
                    .is_none_or(|at| at.elapsed() >= min_period);
                if !due {
                    continue;
                }
                if read_in_cycle && !cmd_period.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return PollExit::Cancelled,
                        _ = tokio::time::sleep(cmd_period) => {}
                    }
                }
                read_in_cycle = true;
                variable.last_polled = Some(Instant::now());
                let (reading, connected) = self.read(&variable.arg).await;
                let reason = reading.message.clone();
                self.apply(variable, reading);
                if !connected {
                    return PollExit::Disconnected(
                        reason.unwrap_or_else(|| "connection lost".to_string()),
                    );
                }
            }
            if !read_in_cycle && !self.connected().await {
                return PollExit::Disconnected("connection lost".to_string());
            }
            // 连接仍在但全部变量读取失败：链路可能半开，重建连接
            if read_in_cycle && variables.iter().all(|variable| !variable.last_read_good) {
                return PollExit::Disconnected("all variables failed to read".to_string());
            }

            let next_due = variables
                .iter()
                .filter_map(|variable| variable.last_polled.map(|at| at + min_period))
                .min()
                .unwrap_or_else(|| Instant::now() + min_period);
            tokio::select! {
                _ = cancel.cancelled() => return PollExit::Cancelled,
                _ = tokio::time::sleep_until(next_due) => {}
                event = next_event(events) => match event {
                    Some(event) => self.apply_event(triggers, event),
                    None => *events = None,
                },
            }
        }
    }
}

async fn next_event(events: &mut Option<DriverEvents>) -> Option<DriverEvent> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn run(inner: Arc<RuntimeInner>, cancel: CancellationToken) {
    let device_id = inner.device.id.clone();
    let mut variables = inner.polled_variables();
    let mut triggers = inner.trigger_variables();
    let mut backoff = inner.config.backoff(inner.min_period());
    let mut reconnecting = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        if inner.connect().await {
            if reconnecting {
                record_reconnect();
            }
            backoff.reset();
            inner.set_status(RuntimeState::Polling, None);
            info!(target: "gw.runtime", device_id = %device_id, "device_connected");

            let mut events = inner.subscribe(&triggers).await;
            match inner
                .poll(&cancel, &mut variables, &mut triggers, &mut events)
                .await
            {
                PollExit::Cancelled => break,
                PollExit::Disconnected(reason) => {
                    warn!(
                        target: "gw.runtime",
                        device_id = %device_id,
                        reason = %reason,
                        "device_disconnected"
                    );
                    inner.close().await;
                    inner.set_status(RuntimeState::Reconnecting, Some(reason));
                }
            }
        } else {
            record_connect_failure();
            if cancel.is_cancelled() {
                break;
            }
            let delay = backoff.next_delay();
            warn!(
                target: "gw.runtime",
                device_id = %device_id,
                retry_in_ms = delay.as_millis() as u64,
                "device_connect_failed"
            );
            inner.set_status(
                RuntimeState::Reconnecting,
                Some(format!("connect failed, retry in {} ms", delay.as_millis())),
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        reconnecting = true;
    }
    debug!(target: "gw.runtime", device_id = %device_id, "poll_loop_exited");
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 设备运行时。
pub struct DeviceRuntime {
    inner: Arc<RuntimeInner>,
    registry: Arc<DriverRegistry>,
    task: Mutex<Option<RunningTask>>,
}

impl DeviceRuntime {
    pub fn new(
        device: DeviceConfig,
        registry: Arc<DriverRegistry>,
        audit: Arc<dyn AuditLogStore>,
        config: RuntimeConfig,
    ) -> Self {
        let (status, _) = watch::channel(RuntimeStatus::stopped());
        Self {
            inner: Arc::new(RuntimeInner {
                device,
                config,
                slot: Arc::new(Mutex::new(None)),
                cache: SampleCache::new(),
                status,
                audit,
            }),
            registry,
            task: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.inner.device
    }

    pub fn status(&self) -> RuntimeStatus {
        self.inner.status.borrow().clone()
    }

    /// 订阅状态变化。
    pub fn watch_status(&self) -> watch::Receiver<RuntimeStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.status().state != RuntimeState::Stopped
    }

    pub fn cache(&self) -> &SampleCache {
        &self.inner.cache
    }

    /// 实例化驱动并启动轮询任务；已在运行时直接返回。
    ///
    /// 驱动类型未知或参数非法时保持 `Stopped` 并记录原因。
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            return Ok(());
        }
        let device = &self.inner.device;
        if device.kind != DeviceKind::Device {
            return Err(RuntimeError::NotRunnable(device.id.clone()));
        }

        let cancel = CancellationToken::new();
        let driver = match self
            .registry
            .create(device, DriverContext::new(device, cancel.clone()))
        {
            Ok(driver) => driver,
            Err(err) => {
                warn!(
                    target: "gw.runtime",
                    device_id = %device.id,
                    driver = %device.driver,
                    error = %err,
                    "device_start_failed"
                );
                self.inner
                    .set_status(RuntimeState::Stopped, Some(err.to_string()));
                return Err(err.into());
            }
        };
        *self.inner.slot.lock().await = Some(driver);
        self.inner.cache.reset(
            device
                .variables
                .iter()
                .filter(|variable| variable.protect.readable())
                .map(|variable| variable.name.as_str()),
        );
        self.inner.set_status(RuntimeState::Connecting, None);
        info!(
            target: "gw.runtime",
            device_id = %device.id,
            driver = %device.driver,
            "device_started"
        );

        let handle = tokio::spawn(run(self.inner.clone(), cancel.clone()));
        *task = Some(RunningTask { cancel, handle });
        Ok(())
    }

    /// 停止轮询并关闭驱动；在途读写允许完成（受 IO 保护超时约束）。
    pub async fn stop(&self) {
        let running = self.task.lock().await.take();
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(err) = running.handle.await {
                warn!(
                    target: "gw.runtime",
                    device_id = %self.inner.device.id,
                    error = %err,
                    "poll_task_join_failed"
                );
            }
        }
        let driver = self.inner.slot.lock().await.take();
        if let Some(mut driver) = driver {
            let _ = tokio::time::timeout(self.inner.config.io_timeout, driver.close()).await;
        }
        if self.is_running() {
            info!(target: "gw.runtime", device_id = %self.inner.device.id, "device_stopped");
        }
        self.inner.set_status(RuntimeState::Stopped, None);
    }

    /// 执行写入请求并记录审计日志。
    pub async fn write(&self, request: RpcRequest) -> RpcResponse {
        let start_ms = now_epoch_ms();
        let clock = Instant::now();
        let method = request
            .method
            .clone()
            .filter(|method| !method.is_empty())
            .unwrap_or_else(|| DEFAULT_WRITE_METHOD.to_string());

        let outcome = self.try_write(&request, &method).await;
        let (success, description) = match outcome {
            Ok(response) => {
                record_write(response.success, clock.elapsed().as_millis() as u64);
                (response.success, response.description)
            }
            Err(err) => {
                record_write_rejected();
                (false, err.to_string())
            }
        };
        info!(
            target: "gw.runtime",
            device_id = %request.device_id,
            request_id = %request.request_id,
            variable = %request.variable,
            success = success,
            description = %description,
            "variable_write"
        );
        append_rpc_log(
            self.inner.audit.as_ref(),
            &self.inner.device.id,
            &request,
            &method,
            start_ms,
            success,
            &description,
        )
        .await;
        RpcResponse::new(&request, success, description)
    }

    async fn try_write(
        &self,
        request: &RpcRequest,
        method: &str,
    ) -> Result<WriteResponse, RuntimeError> {
        let device = &self.inner.device;
        let variable = device
            .addressed_variable(&request.device_id, &request.variable)
            .ok_or_else(|| RuntimeError::VariableNotFound(request.variable.clone()))?;
        if !variable.protect.writable() {
            return Err(RuntimeError::ProtectedVariable(variable.name.clone()));
        }
        let arg = io_arg(variable);

        let mut slot = self.inner.slot.lock().await;
        let driver = slot
            .as_mut()
            .ok_or_else(|| RuntimeError::RuntimeNotStarted(device.id.clone()))?;
        if !driver.is_connected() {
            return Err(RuntimeError::NotConnected(device.id.clone()));
        }
        let method = arg.method.as_deref().unwrap_or(method);
        let write = driver.write(&request.request_id, method, &arg, &request.value);
        match tokio::time::timeout(self.inner.config.io_timeout, write).await {
            Ok(response) => Ok(response),
            Err(_) => Ok(WriteResponse::failed(format!(
                "write timed out after {} ms",
                self.inner.config.io_timeout.as_millis()
            ))),
        }
    }

    /// 当前采样（按变量配置顺序，不含只写变量）。
    pub fn telemetry(&self) -> Vec<TelemetryRecord> {
        let device = &self.inner.device;
        let samples = self.inner.cache.snapshot();
        device
            .variables
            .iter()
            .filter_map(|variable| {
                let sample = samples.get(&variable.name)?;
                Some(TelemetryRecord {
                    device_id: device.id.clone(),
                    device_name: device.name.clone(),
                    variable: variable.name.clone(),
                    alias: variable.alias.clone(),
                    value: sample.value.clone(),
                    cooked_value: sample.cooked_value.clone(),
                    status: sample.status,
                    timestamp_ms: sample.timestamp_ms,
                    message: sample.message.clone(),
                })
            })
            .collect()
    }
}

/// 追加一条写入审计；存储失败只告警，不影响写入结果。
///
/// `device_id` 为实际执行写入的设备，按别名寻址时与请求中的不同。
pub(crate) async fn append_rpc_log(
    audit: &dyn AuditLogStore,
    device_id: &str,
    request: &RpcRequest,
    method: &str,
    start_ms: i64,
    success: bool,
    description: &str,
) {
    let record = RpcLog {
        log_id: uuid::Uuid::new_v4().to_string(),
        request_id: request.request_id.clone(),
        device_id: device_id.to_string(),
        variable: request.variable.clone(),
        method: method.to_string(),
        params: serde_json::to_string(&request.value).unwrap_or_default(),
        start_ms,
        end_ms: now_epoch_ms(),
        success,
        description: description.to_string(),
    };
    if let Err(err) = audit.append_rpc_log(record).await {
        warn!(
            target: "gw.runtime",
            request_id = %request.request_id,
            error = %err,
            "rpc_log_append_failed"
        );
    }
}
