use api_contract::{DeviceStatusDto, DispatchRequest, MetricsSnapshotDto, RpcLogQuery};
use serde_json::Value;

#[test]
fn dispatch_request_accepts_camel_case() {
    let payload = r#"{"variable":"setpoint","value":21.5,"method":"write","requestId":"req-1"}"#;
    let req: DispatchRequest = serde_json::from_str(payload).expect("parse");
    assert_eq!(req.variable, "setpoint");
    assert_eq!(req.value, serde_json::json!(21.5));
    assert_eq!(req.method.as_deref(), Some("write"));
    assert_eq!(req.request_id.as_deref(), Some("req-1"));
}

#[test]
fn dispatch_request_defaults_optional_fields() {
    let req: DispatchRequest = serde_json::from_str(r#"{"variable":"reset"}"#).expect("parse");
    assert!(req.value.is_null());
    assert!(req.method.is_none());
    assert!(req.request_id.is_none());
}

#[test]
fn rpc_log_query_is_camel_case() {
    let query: RpcLogQuery =
        serde_json::from_str(r#"{"deviceId":"boiler-1","fromMs":10,"limit":5}"#).expect("parse");
    assert_eq!(query.device_id.as_deref(), Some("boiler-1"));
    assert_eq!(query.from_ms, Some(10));
    assert!(query.to_ms.is_none());
    assert_eq!(query.limit, Some(5));
}

#[test]
fn device_status_is_camel_case() {
    let dto = DeviceStatusDto {
        device_id: "boiler-1".to_string(),
        device_name: "Boiler".to_string(),
        driver: "Simulator".to_string(),
        state: "polling".to_string(),
        reason: None,
        since_ms: 1_700_000_000_000,
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert!(value.get("deviceId").is_some());
    assert!(value.get("sinceMs").is_some());
    assert!(value.get("device_id").is_none());
}

#[test]
fn metrics_counters_are_numbers() {
    let dto = MetricsSnapshotDto {
        polls: 3,
        read_failures: 0,
        expression_failures: 0,
        connect_failures: 1,
        reconnects: 0,
        writes_succeeded: 2,
        writes_failed: 0,
        writes_rejected: 1,
        write_latency_ms_total: 12,
        write_latency_ms_count: 2,
        telemetry_published: 4,
        rpc_requests: 0,
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert!(matches!(value.get("writesRejected"), Some(Value::Number(_))));
    assert!(matches!(value.get("readFailures"), Some(Value::Number(_))));
}
