mod common;

use common::{Stubs, advance, device, registry, runtime_config, variable};
use domain::{DeviceConfig, ProtectType, RpcRequest, StatusType, Value};
use gw_driver::DriverError;
use gw_runtime::{DeviceRuntime, RuntimeError, RuntimeState};
use gw_storage::{AuditLogStore, InMemoryAuditLogStore};
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn runtime(stubs: &Stubs, device: DeviceConfig) -> (Arc<DeviceRuntime>, Arc<InMemoryAuditLogStore>) {
    let audit = Arc::new(InMemoryAuditLogStore::new());
    let runtime = DeviceRuntime::new(device, registry(stubs), audit.clone(), runtime_config());
    (Arc::new(runtime), audit)
}

fn request(device_id: &str, variable: &str, value: Value) -> RpcRequest {
    RpcRequest {
        request_id: format!("req-{}", variable),
        device_id: device_id.to_string(),
        variable: variable.to_string(),
        value,
        method: None,
    }
}

#[tokio::test(start_paused = true)]
async fn polls_variables_through_expression() {
    let stubs = Stubs::default();
    let mut temp = variable("temp", "215", ProtectType::ReadOnly);
    temp.expression = Some("raw / 10".to_string());
    let (runtime, _) = runtime(&stubs, device("boiler", 1000, vec![temp]));

    runtime.start().await.expect("start");
    advance(50).await;

    assert_eq!(runtime.status().state, RuntimeState::Polling);
    let sample = runtime.cache().get("temp").expect("sample");
    assert_eq!(sample.status, StatusType::Good);
    assert_eq!(sample.value, Value::Int(215));
    assert_eq!(sample.cooked_value, Value::Float(21.5));

    let telemetry = runtime.telemetry();
    assert_eq!(telemetry.len(), 1);
    assert_eq!(telemetry[0].device_name, "boiler-name");
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn respects_min_period_between_reads() {
    let stubs = Stubs::default();
    let (runtime, _) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("temp", "1", ProtectType::ReadOnly)]),
    );
    runtime.start().await.expect("start");
    advance(2500).await;

    assert_eq!(stubs.get("boiler").reads.load(Ordering::SeqCst), 3);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn previous_values_feed_the_expression() {
    let stubs = Stubs::default();
    let mut delta = variable("delta", "counter", ProtectType::ReadOnly);
    delta.expression = Some("raw - $pv".to_string());
    let (runtime, _) = runtime(&stubs, device("meter", 1000, vec![delta]));

    runtime.start().await.expect("start");
    advance(50).await;
    assert_eq!(runtime.cache().get("delta").unwrap().cooked_value, Value::Float(0.0));

    advance(1000).await;
    let sample = runtime.cache().get("delta").unwrap();
    assert_eq!(sample.value, Value::Int(2));
    assert_eq!(sample.cooked_value, Value::Float(1.0));
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn broken_expression_marks_sample_bad() {
    let stubs = Stubs::default();
    let mut temp = variable("temp", "215", ProtectType::ReadOnly);
    temp.expression = Some("raw +".to_string());
    let (runtime, _) = runtime(&stubs, device("boiler", 1000, vec![temp]));

    runtime.start().await.expect("start");
    advance(50).await;

    let sample = runtime.cache().get("temp").unwrap();
    assert_eq!(sample.status, StatusType::Bad);
    assert!(
        sample.message.as_deref().unwrap_or_default().starts_with("expression error"),
        "unexpected message: {:?}",
        sample.message
    );
    assert_eq!(runtime.status().state, RuntimeState::Polling);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn bad_read_keeps_last_value() {
    let stubs = Stubs::default();
    let (runtime, _) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("temp", "215", ProtectType::ReadOnly)]),
    );
    runtime.start().await.expect("start");
    advance(50).await;
    let good = runtime.cache().get("temp").unwrap();

    stubs.get("boiler").fail_reads.store(true, Ordering::SeqCst);
    advance(1000).await;

    let sample = runtime.cache().get("temp").unwrap();
    assert_eq!(sample.status, StatusType::Bad);
    assert_eq!(sample.message.as_deref(), Some("sensor fault"));
    assert_eq!(sample.value, Value::Int(215));
    assert_eq!(sample.timestamp_ms, good.timestamp_ms);
    assert_eq!(runtime.status().state, RuntimeState::Polling);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_link_drop() {
    let stubs = Stubs::default();
    let (runtime, _) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("temp", "215", ProtectType::ReadOnly)]),
    );
    runtime.start().await.expect("start");
    advance(50).await;

    let stub = stubs.get("boiler");
    stub.drop_link.store(true, Ordering::SeqCst);
    advance(1000).await;

    assert_eq!(stub.connects.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.status().state, RuntimeState::Polling);

    advance(1000).await;
    let sample = runtime.cache().get("temp").unwrap();
    assert_eq!(sample.status, StatusType::Good);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn connect_failures_back_off_then_recover() {
    let stubs = Stubs::default();
    let stub = stubs.get("boiler");
    stub.failing_connects.store(2, Ordering::SeqCst);
    let (runtime, _) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("temp", "215", ProtectType::ReadOnly)]),
    );

    runtime.start().await.expect("start");
    advance(50).await;
    let status = runtime.status();
    assert_eq!(status.state, RuntimeState::Reconnecting);
    assert!(status.reason.unwrap_or_default().starts_with("connect failed"));
    assert_eq!(stub.connects.load(Ordering::SeqCst), 1);

    advance(1000).await;
    assert_eq!(stub.connects.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.status().state, RuntimeState::Reconnecting);

    advance(1000).await;
    assert_eq!(stub.connects.load(Ordering::SeqCst), 3);
    assert_eq!(runtime.status().state, RuntimeState::Polling);
    assert_eq!(runtime.cache().get("temp").unwrap().status, StatusType::Good);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn writes_and_polls_never_overlap() {
    let stubs = Stubs::default();
    let stub = stubs.get("boiler");
    stub.io_delay_ms.store(30, Ordering::SeqCst);
    let (runtime, _) = runtime(
        &stubs,
        device(
            "boiler",
            100,
            vec![
                variable("temp", "215", ProtectType::ReadOnly),
                variable("setpoint", "sp", ProtectType::ReadWrite),
            ],
        ),
    );
    runtime.start().await.expect("start");
    advance(10).await;

    let mut writers = tokio::task::JoinSet::new();
    for index in 0..8 {
        let runtime = runtime.clone();
        writers.spawn(async move {
            runtime
                .write(request("boiler", "setpoint", Value::Int(index)))
                .await
        });
    }
    while let Some(result) = writers.join_next().await {
        assert!(result.expect("writer task").success);
    }
    advance(500).await;

    assert_eq!(stub.writes.load(Ordering::SeqCst), 8);
    assert!(stub.reads.load(Ordering::SeqCst) > 2);
    assert_eq!(stub.overlaps.load(Ordering::SeqCst), 0);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn write_is_forwarded_and_audited() {
    let stubs = Stubs::default();
    let (runtime, audit) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("setpoint", "sp", ProtectType::ReadWrite)]),
    );
    runtime.start().await.expect("start");
    advance(10).await;

    let response = runtime
        .write(request("boiler", "setpoint", Value::Int(42)))
        .await;
    assert!(response.success);
    assert_eq!(response.description, "written");
    assert_eq!(response.echoed_value, Value::Int(42));

    let written = stubs.get("boiler").written.lock().unwrap().clone();
    assert_eq!(written, vec![("sp".to_string(), Value::Int(42))]);

    let logs = audit
        .list_rpc_logs(Some("boiler"), None, None, 0)
        .await
        .expect("audit");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].method, "write");
    assert_eq!(logs[0].params, "42");
    assert!(logs[0].success);
    assert!(logs[0].end_ms >= logs[0].start_ms);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn read_only_write_never_reaches_driver() {
    let stubs = Stubs::default();
    let (runtime, audit) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("temp", "215", ProtectType::ReadOnly)]),
    );
    runtime.start().await.expect("start");
    advance(10).await;

    let response = runtime.write(request("boiler", "temp", Value::Int(1))).await;
    assert!(!response.success);
    assert_eq!(response.description, "variable is read-only: temp");
    assert_eq!(stubs.get("boiler").writes.load(Ordering::SeqCst), 0);

    let logs = audit.list_rpc_logs(None, None, None, 0).await.expect("audit");
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].success);

    let missing = runtime.write(request("boiler", "ghost", Value::Int(1))).await;
    assert_eq!(missing.description, "variable not found: ghost");
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn write_without_running_driver_fails() {
    let stubs = Stubs::default();
    let (runtime, _) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("setpoint", "sp", ProtectType::ReadWrite)]),
    );

    let response = runtime
        .write(request("boiler", "setpoint", Value::Int(1)))
        .await;
    assert!(!response.success);
    assert_eq!(response.description, "runtime not started: boiler");

    stubs.get("boiler").failing_connects.store(5, Ordering::SeqCst);
    runtime.start().await.expect("start");
    advance(10).await;
    let response = runtime
        .write(request("boiler", "setpoint", Value::Int(1)))
        .await;
    assert_eq!(response.description, "device not connected: boiler");
    assert_eq!(stubs.get("boiler").writes.load(Ordering::SeqCst), 0);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn trigger_variables_follow_driver_events() {
    let stubs = Stubs::default();
    let mut alarm = variable("alarm", "alarm", ProtectType::ReadOnly);
    alarm.is_trigger = true;
    let (runtime, _) = runtime(
        &stubs,
        device(
            "boiler",
            1000,
            vec![variable("temp", "215", ProtectType::ReadOnly), alarm],
        ),
    );
    runtime.start().await.expect("start");
    advance(10).await;

    let stub = stubs.get("boiler");
    assert!(stub.subscribed());
    assert_eq!(stub.reads.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.cache().get("alarm").unwrap().status, StatusType::Bad);

    assert!(stub.push("alarm", Value::Bool(true)));
    advance(10).await;
    let sample = runtime.cache().get("alarm").unwrap();
    assert_eq!(sample.status, StatusType::Good);
    assert_eq!(sample.value, Value::Bool(true));
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_closes_driver_and_is_restartable() {
    let stubs = Stubs::default();
    let (runtime, _) = runtime(
        &stubs,
        device("boiler", 1000, vec![variable("temp", "215", ProtectType::ReadOnly)]),
    );
    runtime.start().await.expect("start");
    runtime.start().await.expect("second start is a no-op");
    advance(10).await;

    runtime.stop().await;
    let stub = stubs.get("boiler");
    assert_eq!(runtime.status().state, RuntimeState::Stopped);
    assert!(!runtime.is_running());
    assert!(stub.closes.load(Ordering::SeqCst) >= 1);

    let reads = stub.reads.load(Ordering::SeqCst);
    advance(3000).await;
    assert_eq!(stub.reads.load(Ordering::SeqCst), reads);

    runtime.start().await.expect("restart");
    advance(10).await;
    assert_eq!(runtime.status().state, RuntimeState::Polling);
    assert_eq!(stub.reads.load(Ordering::SeqCst), reads + 1);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_driver_leaves_device_stopped() {
    let stubs = Stubs::default();
    let mut config = device("boiler", 1000, Vec::new());
    config.driver = "Modbus".to_string();
    let (runtime, _) = runtime(&stubs, config);

    let err = runtime.start().await.expect_err("unknown driver");
    assert!(matches!(err, RuntimeError::Driver(DriverError::NotFound(_))));
    let status = runtime.status();
    assert_eq!(status.state, RuntimeState::Stopped);
    assert_eq!(status.reason.as_deref(), Some("driver not found: Modbus"));
}

#[tokio::test(start_paused = true)]
async fn configured_method_reaches_the_driver() {
    let stubs = Stubs::default();
    let mut level = variable("level", "40001", ProtectType::ReadOnly);
    level.method = Some("ReadHoldingRegister".to_string());
    let mut setpoint = variable("setpoint", "40002", ProtectType::ReadWrite);
    setpoint.method = Some("WriteHoldingRegister".to_string());
    let (runtime, audit) = runtime(&stubs, device("plc", 1000, vec![level, setpoint]));
    runtime.start().await.expect("start");
    advance(10).await;

    let stub = stubs.get("plc");
    let read_methods = stub.read_methods.lock().unwrap().clone();
    assert_eq!(
        read_methods,
        vec![
            Some("ReadHoldingRegister".to_string()),
            Some("WriteHoldingRegister".to_string()),
        ]
    );

    let response = runtime
        .write(request("plc", "setpoint", Value::Int(5)))
        .await;
    assert!(response.success, "{}", response.description);
    let write_methods = stub.write_methods.lock().unwrap().clone();
    assert_eq!(write_methods, vec!["WriteHoldingRegister".to_string()]);

    let logs = audit.list_rpc_logs(None, None, None, 0).await.expect("audit");
    assert_eq!(logs[0].method, "write");
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn all_reads_failing_forces_reconnect() {
    let stubs = Stubs::default();
    let (runtime, _) = runtime(
        &stubs,
        device(
            "boiler",
            1000,
            vec![
                variable("temp", "215", ProtectType::ReadOnly),
                variable("pressure", "3", ProtectType::ReadOnly),
            ],
        ),
    );
    runtime.start().await.expect("start");
    advance(50).await;
    let stub = stubs.get("boiler");
    assert_eq!(stub.connects.load(Ordering::SeqCst), 1);
    assert_eq!(stub.closes.load(Ordering::SeqCst), 0);

    stub.fail_reads.store(true, Ordering::SeqCst);
    advance(1000).await;
    assert_eq!(stub.closes.load(Ordering::SeqCst), 1);
    assert_eq!(stub.connects.load(Ordering::SeqCst), 2);

    stub.fail_reads.store(false, Ordering::SeqCst);
    advance(1000).await;
    assert_eq!(stub.connects.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.status().state, RuntimeState::Polling);
    assert_eq!(runtime.cache().get("temp").unwrap().status, StatusType::Good);
    runtime.stop().await;
}
