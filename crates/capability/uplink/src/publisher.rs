//! 遥测上报：变化检测与定时发布。

use crate::error::UplinkError;
use async_trait::async_trait;
use domain::TelemetryRecord;
use gw_runtime::GatewayScheduler;
use gw_telemetry::record_telemetry_published;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 单个设备一次上报的采样。
///
/// 配置了别名的变量单独成批，`device_name` 为别名。
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryBatch {
    pub device_id: String,
    pub device_name: String,
    pub records: Vec<TelemetryRecord>,
}

/// 遥测发布器抽象。
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish(&self, batch: &TelemetryBatch) -> Result<(), UplinkError>;
}

/// 空发布器（未启用 MQTT 时使用）。
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl TelemetryPublisher for NoopPublisher {
    async fn publish(&self, _batch: &TelemetryBatch) -> Result<(), UplinkError> {
        Ok(())
    }
}

/// 记录上次发布的采样，只放行有变化的记录。
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last: HashMap<(String, String), TelemetryRecord>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 过滤出变化的记录并按上报设备名分组；从未轮询过的占位采样不上报。
    pub fn changed(&mut self, records: Vec<TelemetryRecord>) -> Vec<TelemetryBatch> {
        let mut batches: BTreeMap<(String, String), TelemetryBatch> = BTreeMap::new();
        for record in records {
            if record.timestamp_ms == 0 {
                continue;
            }
            let key = (record.device_id.clone(), record.variable.clone());
            if self.last.get(&key) == Some(&record) {
                continue;
            }
            self.last.insert(key, record.clone());
            let device_name = record
                .alias
                .as_deref()
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .unwrap_or(&record.device_name)
                .to_string();
            batches
                .entry((record.device_id.clone(), device_name.clone()))
                .or_insert_with(|| TelemetryBatch {
                    device_id: record.device_id.clone(),
                    device_name,
                    records: Vec::new(),
                })
                .records
                .push(record);
        }
        batches.into_values().collect()
    }

    /// 丢弃某设备的记录，下次全部重新上报。
    pub fn forget(&mut self, device_id: &str) {
        self.last.retain(|(id, _), _| id != device_id);
    }

    /// 丢弃已不存在设备的记录。
    pub fn retain_devices(&mut self, device_ids: &[String]) {
        self.last
            .retain(|(device_id, _), _| device_ids.iter().any(|id| id == device_id));
    }
}

/// 启动遥测上报任务；发布失败的记录会在下个周期重试。
pub fn spawn_telemetry_loop(
    scheduler: Arc<GatewayScheduler>,
    publisher: Arc<dyn TelemetryPublisher>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = ChangeTracker::new();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            target: "gw.uplink",
            interval_ms = interval.as_millis() as u64,
            "telemetry_loop_started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let records = scheduler.snapshot().await;
            let device_ids: Vec<String> = scheduler
                .statuses()
                .await
                .into_iter()
                .map(|status| status.device_id)
                .collect();
            tracker.retain_devices(&device_ids);
            for batch in tracker.changed(records) {
                match publisher.publish(&batch).await {
                    Ok(()) => {
                        record_telemetry_published(batch.records.len() as u64);
                        debug!(
                            target: "gw.uplink",
                            device_id = %batch.device_id,
                            records = batch.records.len(),
                            "telemetry_published"
                        );
                    }
                    Err(err) => {
                        warn!(
                            target: "gw.uplink",
                            device_id = %batch.device_id,
                            error = %err,
                            "telemetry_publish_failed"
                        );
                        tracker.forget(&batch.device_id);
                    }
                }
            }
        }
        info!(target: "gw.uplink", "telemetry_loop_stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{StatusType, Value};

    fn record(device_id: &str, variable: &str, value: i64, timestamp_ms: i64) -> TelemetryRecord {
        TelemetryRecord {
            device_id: device_id.to_string(),
            device_name: format!("{} name", device_id),
            variable: variable.to_string(),
            alias: None,
            value: Value::Int(value),
            cooked_value: Value::Int(value),
            status: StatusType::Good,
            timestamp_ms,
            message: None,
        }
    }

    #[test]
    fn test_only_changed_records_pass() {
        let mut tracker = ChangeTracker::new();
        let first = tracker.changed(vec![record("a", "t", 1, 10), record("b", "t", 2, 10)]);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].device_id, "a");
        assert_eq!(first[0].device_name, "a name");

        let second = tracker.changed(vec![record("a", "t", 1, 10), record("b", "t", 3, 20)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].device_id, "b");
        assert_eq!(second[0].records[0].value, Value::Int(3));
    }

    #[test]
    fn test_aliased_records_form_their_own_batch() {
        let mut tracker = ChangeTracker::new();
        let mut meter = record("a", "kwh", 5, 10);
        meter.alias = Some("meter-2".to_string());
        let mut blank = record("a", "v", 7, 10);
        blank.alias = Some(" ".to_string());
        let batches = tracker.changed(vec![record("a", "t", 1, 10), meter, blank]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].device_name, "a name");
        assert_eq!(batches[0].records.len(), 2);
        assert_eq!(batches[1].device_id, "a");
        assert_eq!(batches[1].device_name, "meter-2");
        assert_eq!(batches[1].records[0].variable, "kwh");
    }

    #[test]
    fn test_pending_samples_are_skipped() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.changed(vec![record("a", "t", 0, 0)]).is_empty());
    }

    #[test]
    fn test_forgotten_device_is_published_again() {
        let mut tracker = ChangeTracker::new();
        tracker.changed(vec![record("a", "t", 1, 10)]);
        tracker.retain_devices(&[]);
        assert_eq!(tracker.changed(vec![record("a", "t", 1, 10)]).len(), 1);
    }
}
