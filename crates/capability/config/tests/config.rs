use domain::{DataType, DeviceKind, ParamValue, ProtectType};
use gw_config::{AppConfig, ConfigError, load_devices, parse_devices};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("GW_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("GW_RECONNECT_INTERVAL_MS", "500");
        std::env::set_var("GW_MQTT", "on");
        std::env::set_var("GW_MQTT_TOPIC_PREFIX", "plant/line1/");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.reconnect_interval_ms, 500);
    assert_eq!(config.reconnect_max_ms, 30_000);
    assert!(config.mqtt_enabled);
    assert_eq!(config.mqtt_topic_prefix, "plant/line1");
    assert_eq!(config.mqtt_qos, 1);
}

#[test]
fn parse_device_file_with_defaults() {
    let devices = parse_devices(
        r#"[
            {"id": "g1", "name": "Line 1", "kind": "group"},
            {
                "id": "d1",
                "name": "Boiler",
                "parent_id": "g1",
                "driver": "Simulator",
                "parameters": {"connect_failures": 1},
                "variables": [
                    {"name": "temp", "address": "ramp:20:80:0.5", "data_type": "Double",
                     "expression": "raw * 10"},
                    {"name": "setpoint", "address": "mem:sp", "data_type": "Float",
                     "protect": "ReadWrite"}
                ]
            }
        ]"#,
    )
    .expect("devices");

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].kind, DeviceKind::Group);
    assert!(!devices[0].is_runnable());
    let boiler = &devices[1];
    assert!(boiler.is_runnable());
    assert_eq!(boiler.min_period_ms, 1000);
    assert_eq!(
        boiler.parameters.get("connect_failures"),
        Some(&ParamValue::Number(1.0))
    );
    assert_eq!(boiler.variable("temp").map(|v| v.data_type), Some(DataType::Double));
    assert_eq!(
        boiler.variable("setpoint").map(|v| v.protect),
        Some(ProtectType::ReadWrite)
    );
}

#[test]
fn rejects_duplicate_ids_and_missing_file() {
    let duplicate = parse_devices(
        r#"[{"id": "d1", "name": "a"}, {"id": "d1", "name": "b"}]"#,
    );
    assert!(matches!(duplicate, Err(ConfigError::Invalid(_, _))));

    let missing = load_devices("/nonexistent/devices.json");
    assert!(matches!(missing, Err(ConfigError::DevicesFile(_, _))));
}
