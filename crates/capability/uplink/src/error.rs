/// 上行链路错误。
#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error("publish error: {0}")]
    Publish(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
    #[error("payload error: {0}")]
    Payload(String),
    #[error("topic error: {0}")]
    Topic(String),
}
