//! 网关调度器
//!
//! 按设备 ID 持有全部 [`DeviceRuntime`]，只做查找与委派，不做阻塞 IO。
//! 单个设备启动失败（驱动未知、参数非法）只体现在该设备的状态上，不影响其他设备。

use crate::device::{DEFAULT_WRITE_METHOD, DeviceRuntime, append_rpc_log};
use crate::error::RuntimeError;
use crate::state::{RuntimeConfig, RuntimeState};
use domain::{DeviceConfig, RpcRequest, RpcResponse, TelemetryRecord, Value, now_epoch_ms};
use gw_driver::{DriverDescriptor, DriverRegistry};
use gw_storage::AuditLogStore;
use gw_telemetry::record_write_rejected;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// 设备运行概况。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusView {
    pub device_id: String,
    pub device_name: String,
    pub driver: String,
    pub state: RuntimeState,
    pub reason: Option<String>,
    pub since_ms: i64,
}

impl DeviceStatusView {
    fn of(runtime: &DeviceRuntime) -> Self {
        let device = runtime.device();
        let status = runtime.status();
        Self {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            driver: device.driver.clone(),
            state: status.state,
            reason: status.reason,
            since_ms: status.since_ms,
        }
    }
}

/// 网关调度器。
pub struct GatewayScheduler {
    registry: Arc<DriverRegistry>,
    audit: Arc<dyn AuditLogStore>,
    config: RuntimeConfig,
    runtimes: RwLock<BTreeMap<String, Arc<DeviceRuntime>>>,
}

impl GatewayScheduler {
    pub fn new(
        registry: Arc<DriverRegistry>,
        audit: Arc<dyn AuditLogStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            audit,
            config,
            runtimes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn audit(&self) -> Arc<dyn AuditLogStore> {
        self.audit.clone()
    }

    fn build(&self, device: DeviceConfig) -> Arc<DeviceRuntime> {
        Arc::new(DeviceRuntime::new(
            device,
            self.registry.clone(),
            self.audit.clone(),
            self.config,
        ))
    }

    async fn runtime(&self, device_id: &str) -> Option<Arc<DeviceRuntime>> {
        self.runtimes.read().await.get(device_id).cloned()
    }

    /// 写入路由：先按设备 ID，再按变量别名。
    async fn addressed_runtime(&self, addressed: &str) -> Option<Arc<DeviceRuntime>> {
        let runtimes = self.runtimes.read().await;
        runtimes.get(addressed).cloned().or_else(|| {
            runtimes
                .values()
                .find(|runtime| runtime.device().has_alias(addressed))
                .cloned()
        })
    }

    /// 登记设备（不启动）；分组节点只用于组织，不登记。
    pub async fn register_devices(&self, devices: Vec<DeviceConfig>) {
        let mut runtimes = self.runtimes.write().await;
        for device in devices {
            if device.kind != domain::DeviceKind::Device {
                debug!(target: "gw.scheduler", device_id = %device.id, "group_skipped");
                continue;
            }
            runtimes.insert(device.id.clone(), self.build(device));
        }
    }

    /// 启动全部自动启动的设备；失败只记录在对应设备的状态上。
    pub async fn start_all(&self) {
        let runtimes: Vec<Arc<DeviceRuntime>> =
            self.runtimes.read().await.values().cloned().collect();
        let mut started = 0usize;
        for runtime in runtimes {
            if !runtime.device().is_runnable() {
                continue;
            }
            match runtime.start().await {
                Ok(()) => started += 1,
                Err(err) => warn!(
                    target: "gw.scheduler",
                    device_id = %runtime.device().id,
                    error = %err,
                    "device_not_started"
                ),
            }
        }
        info!(target: "gw.scheduler", started = started, "scheduler_started");
    }

    /// 并行停止全部设备。
    pub async fn stop_all(&self) {
        let runtimes: Vec<Arc<DeviceRuntime>> =
            self.runtimes.read().await.values().cloned().collect();
        let mut tasks = JoinSet::new();
        for runtime in runtimes {
            tasks.spawn(async move { runtime.stop().await });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                warn!(target: "gw.scheduler", error = %err, "device_stop_failed");
            }
        }
        info!(target: "gw.scheduler", "scheduler_stopped");
    }

    pub async fn start_device(&self, device_id: &str) -> Result<(), RuntimeError> {
        let runtime = self
            .runtime(device_id)
            .await
            .ok_or_else(|| RuntimeError::DeviceNotFound(device_id.to_string()))?;
        runtime.start().await
    }

    pub async fn stop_device(&self, device_id: &str) -> Result<(), RuntimeError> {
        let runtime = self
            .runtime(device_id)
            .await
            .ok_or_else(|| RuntimeError::DeviceNotFound(device_id.to_string()))?;
        runtime.stop().await;
        Ok(())
    }

    /// 新增或替换设备：停止旧运行时，按新配置重建，自动启动的设备随即启动。
    pub async fn upsert_device(&self, device: DeviceConfig) -> Result<(), RuntimeError> {
        if device.kind != domain::DeviceKind::Device {
            return Err(RuntimeError::NotRunnable(device.id));
        }
        let device_id = device.id.clone();
        let runtime = self.build(device);
        let previous = self
            .runtimes
            .write()
            .await
            .insert(device_id.clone(), runtime.clone());
        if let Some(previous) = previous {
            previous.stop().await;
        }
        info!(target: "gw.scheduler", device_id = %device_id, "device_upserted");
        if runtime.device().is_runnable() {
            runtime.start().await?;
        }
        Ok(())
    }

    pub async fn remove_device(&self, device_id: &str) -> Result<(), RuntimeError> {
        let runtime = self
            .runtimes
            .write()
            .await
            .remove(device_id)
            .ok_or_else(|| RuntimeError::DeviceNotFound(device_id.to_string()))?;
        runtime.stop().await;
        info!(target: "gw.scheduler", device_id = %device_id, "device_removed");
        Ok(())
    }

    /// 按设备、变量写入值（自动生成请求 ID）。
    pub async fn dispatch(&self, device_id: &str, variable: &str, value: Value) -> RpcResponse {
        self.dispatch_request(RpcRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            variable: variable.to_string(),
            value,
            method: None,
        })
        .await
    }

    /// 把写入请求路由到对应设备；`device_id` 也可以是变量别名。
    /// 设备不存在或未运行时直接失败并记入审计。
    pub async fn dispatch_request(&self, request: RpcRequest) -> RpcResponse {
        let rejection = match self.addressed_runtime(&request.device_id).await {
            Some(runtime) if runtime.is_running() => return runtime.write(request).await,
            Some(_) => RuntimeError::RuntimeNotStarted(request.device_id.clone()),
            None => RuntimeError::DeviceNotFound(request.device_id.clone()),
        };
        let description = rejection.to_string();
        record_write_rejected();
        warn!(
            target: "gw.scheduler",
            device_id = %request.device_id,
            request_id = %request.request_id,
            reason = %description,
            "dispatch_rejected"
        );
        let method = request
            .method
            .clone()
            .filter(|method| !method.is_empty())
            .unwrap_or_else(|| DEFAULT_WRITE_METHOD.to_string());
        append_rpc_log(
            self.audit.as_ref(),
            &request.device_id,
            &request,
            &method,
            now_epoch_ms(),
            false,
            &description,
        )
        .await;
        RpcResponse::new(&request, false, description)
    }

    /// 全部设备的当前采样。
    pub async fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.runtimes
            .read()
            .await
            .values()
            .flat_map(|runtime| runtime.telemetry())
            .collect()
    }

    pub async fn device_snapshot(&self, device_id: &str) -> Option<Vec<TelemetryRecord>> {
        self.runtime(device_id)
            .await
            .map(|runtime| runtime.telemetry())
    }

    pub async fn device_status(&self, device_id: &str) -> Option<DeviceStatusView> {
        self.runtime(device_id)
            .await
            .map(|runtime| DeviceStatusView::of(&runtime))
    }

    pub async fn statuses(&self) -> Vec<DeviceStatusView> {
        self.runtimes
            .read()
            .await
            .values()
            .map(|runtime| DeviceStatusView::of(runtime))
            .collect()
    }

    /// 已注册驱动的描述（参数模式与地址说明）。
    pub fn drivers(&self) -> Vec<DriverDescriptor> {
        self.registry.descriptors()
    }
}
