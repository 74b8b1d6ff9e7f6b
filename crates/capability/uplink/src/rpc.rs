//! 远程写入请求解析。

use crate::error::UplinkError;
use crate::topics::request_id_from_topic;
use domain::{RpcRequest, Value};
use serde::Deserialize;

/// 远程写入请求报文。`requestId` 缺省时取 topic 最后一段。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequestPayload {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(alias = "device")]
    pub device_id: String,
    #[serde(alias = "name")]
    pub variable: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub method: Option<String>,
}

/// 把 MQTT 报文转成写入请求。
pub fn parse_rpc_request(
    prefix: &str,
    topic: &str,
    payload: &[u8],
) -> Result<RpcRequest, UplinkError> {
    if payload.is_empty() {
        return Err(UplinkError::Payload("empty payload".to_string()));
    }
    let parsed: RpcRequestPayload =
        serde_json::from_slice(payload).map_err(|err| UplinkError::Payload(err.to_string()))?;
    let request_id = parsed
        .request_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| request_id_from_topic(prefix, topic))
        .ok_or_else(|| UplinkError::Topic(format!("no request id in {}", topic)))?;
    if parsed.device_id.trim().is_empty() || parsed.variable.trim().is_empty() {
        return Err(UplinkError::Payload(
            "deviceId and variable are required".to_string(),
        ));
    }
    Ok(RpcRequest {
        request_id,
        device_id: parsed.device_id,
        variable: parsed.variable,
        value: parsed.value,
        method: parsed.method.filter(|method| !method.is_empty()),
    })
}
