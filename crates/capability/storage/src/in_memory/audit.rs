//! 审计日志内存实现
//!
//! 超过容量时淘汰最早的记录。

use crate::error::StorageError;
use crate::traits::AuditLogStore;
use domain::RpcLog;
use std::collections::VecDeque;
use std::sync::RwLock;

/// 默认保留的审计记录条数。
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// 审计日志内存存储
pub struct InMemoryAuditLogStore {
    logs: RwLock<VecDeque<RpcLog>>,
    capacity: usize,
}

impl Default for InMemoryAuditLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditLogStore {
    /// 创建新的审计日志存储
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            logs: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait::async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn append_rpc_log(&self, record: RpcLog) -> Result<RpcLog, StorageError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if logs.len() >= self.capacity {
            logs.pop_front();
        }
        logs.push_back(record.clone());
        Ok(record)
    }

    async fn list_rpc_logs(
        &self,
        device_id: Option<&str>,
        from_ms: Option<i64>,
        to_ms: Option<i64>,
        limit: i64,
    ) -> Result<Vec<RpcLog>, StorageError> {
        let limit = limit.max(0) as usize;
        let logs = self
            .logs
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<RpcLog> = logs
            .iter()
            .filter(|item| match device_id {
                Some(device_id) => item.device_id == device_id,
                None => true,
            })
            .filter(|item| match from_ms {
                Some(from) => item.start_ms >= from,
                None => true,
            })
            .filter(|item| match to_ms {
                Some(to) => item.start_ms <= to,
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.start_ms.cmp(&a.start_ms));
        if limit > 0 && items.len() > limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}
