//! 存储接口定义

use crate::error::StorageError;
use async_trait::async_trait;
use domain::RpcLog;

/// 控制写入审计日志（只追加）。
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append_rpc_log(&self, record: RpcLog) -> Result<RpcLog, StorageError>;

    /// 按设备与时间窗口查询，按开始时间倒序；`limit <= 0` 表示不限。
    async fn list_rpc_logs(
        &self,
        device_id: Option<&str>,
        from_ms: Option<i64>,
        to_ms: Option<i64>,
        limit: i64,
    ) -> Result<Vec<RpcLog>, StorageError>;
}
