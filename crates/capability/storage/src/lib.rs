//! # 网关存储模块
//!
//! 控制写入的审计日志（[`domain::RpcLog`]）只追加存储。
//!
//! 1. **接口抽象层** (`traits.rs`)：[`AuditLogStore`] 异步接口
//! 2. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 3. **实现层** (`in_memory/`)：`RwLock` 保护的内存实现，超过容量淘汰最早记录
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use gw_storage::{AuditLogStore, InMemoryAuditLogStore};
//!
//! let store = Arc::new(InMemoryAuditLogStore::new());
//! store.append_rpc_log(log).await?;
//! let recent = store.list_rpc_logs(Some("boiler-1"), None, None, 50).await?;
//! ```

pub mod error;
pub mod in_memory;
pub mod traits;

pub use error::StorageError;
pub use in_memory::InMemoryAuditLogStore;
pub use traits::AuditLogStore;
