//! 驱动注册表
//!
//! 类型标签 → 工厂函数。进程启动时显式注册，设备按标签实例化驱动。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let registry = DriverRegistry::with_builtin();
//! let driver = registry.create(&device, DriverContext::new(&device, cancel))?;
//! ```

use crate::contract::Driver;
use crate::descriptor::{DriverDescriptor, DriverParams};
use crate::drivers::{FramedTcpDriver, SimulatorDriver, TcpParserDriver};
use crate::error::DriverError;
use domain::DeviceConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 驱动构造上下文。
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub device_id: String,
    pub device_name: String,
    /// 设备停止时触发，驱动内部的等待应随之结束。
    pub cancel: CancellationToken,
}

impl DriverContext {
    pub fn new(device: &DeviceConfig, cancel: CancellationToken) -> Self {
        Self {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            cancel,
        }
    }
}

/// 驱动工厂。
pub type DriverFactory =
    Arc<dyn Fn(DriverContext, DriverParams) -> Result<Box<dyn Driver>, DriverError> + Send + Sync>;

struct RegistryEntry {
    descriptor: DriverDescriptor,
    factory: DriverFactory,
}

/// 驱动注册表。
#[derive(Default)]
pub struct DriverRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置驱动。
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(TcpParserDriver::descriptor(), |ctx, params| {
            Ok(Box::new(TcpParserDriver::from_params(ctx, &params)?))
        });
        registry.register(FramedTcpDriver::descriptor(), |ctx, params| {
            Ok(Box::new(FramedTcpDriver::from_params(ctx, &params)?))
        });
        registry.register(SimulatorDriver::descriptor(), |ctx, params| {
            Ok(Box::new(SimulatorDriver::from_params(ctx, &params)?))
        });
        registry
    }

    /// 注册驱动（同名标签覆盖旧项）。
    pub fn register<F>(&mut self, descriptor: DriverDescriptor, factory: F)
    where
        F: Fn(DriverContext, DriverParams) -> Result<Box<dyn Driver>, DriverError>
            + Send
            + Sync
            + 'static,
    {
        let key = descriptor.type_tag.to_ascii_lowercase();
        self.entries.insert(
            key,
            RegistryEntry {
                descriptor,
                factory: Arc::new(factory),
            },
        );
    }

    /// 按类型标签查找（不区分大小写）。
    pub fn descriptor(&self, type_tag: &str) -> Option<&DriverDescriptor> {
        self.entries
            .get(&type_tag.to_ascii_lowercase())
            .map(|entry| &entry.descriptor)
    }

    /// 全部驱动描述（按标签排序）。
    pub fn descriptors(&self) -> Vec<DriverDescriptor> {
        let mut items: Vec<DriverDescriptor> = self
            .entries
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect();
        items.sort_by(|a, b| a.type_tag.cmp(&b.type_tag));
        items
    }

    /// 按设备配置实例化驱动：查找标签 → 校验参数 → 调用工厂。
    pub fn create(
        &self,
        device: &DeviceConfig,
        ctx: DriverContext,
    ) -> Result<Box<dyn Driver>, DriverError> {
        let entry = self
            .entries
            .get(&device.driver.to_ascii_lowercase())
            .ok_or_else(|| DriverError::NotFound(device.driver.clone()))?;
        let params = entry.descriptor.validate(&device.parameters)?;
        let driver = (entry.factory)(ctx, params)?;
        info!(
            target: "gw.driver",
            device_id = %device.id,
            driver = %entry.descriptor.type_tag,
            "driver_created"
        );
        Ok(driver)
    }
}
