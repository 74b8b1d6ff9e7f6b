//! 内存存储实现

mod audit;

pub use audit::InMemoryAuditLogStore;
