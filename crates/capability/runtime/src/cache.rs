//! 变量采样缓存
//!
//! 每个设备一份，写入方只有该设备的运行任务；读取方取快照。

use domain::{Sample, StatusType, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// 设备采样缓存。
#[derive(Debug, Clone, Default)]
pub struct SampleCache {
    samples: Arc<RwLock<BTreeMap<String, Sample>>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Sample>> {
        self.samples
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Sample>> {
        self.samples
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 全部变量重置为"尚未轮询"。
    pub fn reset<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut samples = self.write();
        samples.clear();
        for name in names {
            samples.insert(name.to_string(), Sample::pending());
        }
    }

    /// 写入有效读数；时间戳不回退。
    pub fn update(
        &self,
        name: &str,
        value: Value,
        cooked_value: Value,
        status: StatusType,
        timestamp_ms: i64,
        message: Option<String>,
    ) {
        let mut samples = self.write();
        let sample = samples
            .entry(name.to_string())
            .or_insert_with(Sample::pending);
        let message = match (status, message) {
            (StatusType::Bad, None) => Some("read failed".to_string()),
            (_, message) => message,
        };
        sample.timestamp_ms = sample.timestamp_ms.max(timestamp_ms);
        sample.value = value;
        sample.cooked_value = cooked_value;
        sample.status = status;
        sample.message = message;
    }

    /// 标记失败：保留上次的值与时间戳，只更新状态与原因。
    pub fn mark_bad(&self, name: &str, message: impl Into<String>) {
        let mut message = message.into();
        if message.is_empty() {
            message = "read failed".to_string();
        }
        let mut samples = self.write();
        let sample = samples
            .entry(name.to_string())
            .or_insert_with(Sample::pending);
        sample.status = StatusType::Bad;
        sample.message = Some(message);
    }

    pub fn get(&self, name: &str) -> Option<Sample> {
        self.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Sample> {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_good_then_bad_keeps_value() {
        let cache = SampleCache::new();
        cache.reset(["temp"]);
        let pending = cache.get("temp").unwrap();
        assert_eq!(pending.status, StatusType::Bad);
        assert_eq!(pending.message.as_deref(), Some("not yet polled"));

        cache.update("temp", Value::Int(215), Value::Float(21.5), StatusType::Good, 1_000, None);
        cache.mark_bad("temp", "timeout");
        let sample = cache.get("temp").unwrap();
        assert_eq!(sample.status, StatusType::Bad);
        assert_eq!(sample.value, Value::Int(215));
        assert_eq!(sample.cooked_value, Value::Float(21.5));
        assert_eq!(sample.timestamp_ms, 1_000);
        assert_eq!(sample.message.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_timestamp_never_moves_backwards() {
        let cache = SampleCache::new();
        cache.update("v", Value::Int(1), Value::Int(1), StatusType::Good, 2_000, None);
        cache.update("v", Value::Int(2), Value::Int(2), StatusType::Good, 1_500, None);
        let sample = cache.get("v").unwrap();
        assert_eq!(sample.value, Value::Int(2));
        assert_eq!(sample.timestamp_ms, 2_000);
    }

    #[test]
    fn test_bad_always_carries_message() {
        let cache = SampleCache::new();
        cache.mark_bad("v", "");
        cache.update("w", Value::Null, Value::Null, StatusType::Bad, 1, None);
        assert!(!cache.get("v").unwrap().message.unwrap().is_empty());
        assert!(!cache.get("w").unwrap().message.unwrap().is_empty());
    }
}
