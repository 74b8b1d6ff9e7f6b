//! 网关运行配置加载。
//!
//! - 进程参数来自 `GW_*` 环境变量（可由 `.env` 提供）
//! - 设备与变量定义来自 JSON 文件（`GW_DEVICES_FILE`），内容为 [`DeviceConfig`] 数组

use domain::DeviceConfig;
use std::collections::HashSet;
use std::env;
use std::path::Path;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("failed to read devices file {0}: {1}")]
    DevicesFile(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub gateway_name: String,
    pub devices_file: Option<String>,
    pub reconnect_interval_ms: u64,
    pub reconnect_max_ms: u64,
    pub io_timeout_ms: u64,
    pub mqtt_enabled: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_qos: u8,
    pub telemetry_interval_ms: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr = env::var("GW_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let gateway_name = env::var("GW_GATEWAY_NAME").unwrap_or_else(|_| "gateway".to_string());
        let devices_file = read_optional("GW_DEVICES_FILE");
        let reconnect_interval_ms = read_u64_with_default("GW_RECONNECT_INTERVAL_MS", 1000)?;
        let reconnect_max_ms = read_u64_with_default("GW_RECONNECT_MAX_MS", 30_000)?;
        if reconnect_max_ms < reconnect_interval_ms {
            return Err(ConfigError::Invalid(
                "GW_RECONNECT_MAX_MS".to_string(),
                reconnect_max_ms.to_string(),
            ));
        }
        let io_timeout_ms = read_u64_with_default("GW_IO_TIMEOUT_MS", 10_000)?;
        let mqtt_enabled = read_bool_with_default("GW_MQTT", false);
        let mqtt_host = env::var("GW_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("GW_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("GW_MQTT_USERNAME");
        let mqtt_password = read_optional("GW_MQTT_PASSWORD");
        let mqtt_topic_prefix = env::var("GW_MQTT_TOPIC_PREFIX")
            .map(|prefix| prefix.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "gateway".to_string());
        let mqtt_qos = read_u8_with_default("GW_MQTT_QOS", 1)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "GW_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }
        let telemetry_interval_ms = read_u64_with_default("GW_TELEMETRY_INTERVAL_MS", 1000)?;

        Ok(Self {
            http_addr,
            gateway_name,
            devices_file,
            reconnect_interval_ms,
            reconnect_max_ms,
            io_timeout_ms,
            mqtt_enabled,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            mqtt_qos,
            telemetry_interval_ms,
        })
    }
}

/// 解析设备定义（JSON 数组），拒绝重复的设备 ID。
pub fn parse_devices(text: &str) -> Result<Vec<DeviceConfig>, ConfigError> {
    let devices: Vec<DeviceConfig> = serde_json::from_str(text)
        .map_err(|err| ConfigError::Invalid("devices".to_string(), err.to_string()))?;
    let mut seen = HashSet::new();
    for device in &devices {
        if !seen.insert(device.id.as_str()) {
            return Err(ConfigError::Invalid(
                "devices".to_string(),
                format!("duplicate device id '{}'", device.id),
            ));
        }
    }
    Ok(devices)
}

/// 从文件加载设备定义。
pub fn load_devices(path: impl AsRef<Path>) -> Result<Vec<DeviceConfig>, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::DevicesFile(path.display().to_string(), err.to_string()))?;
    parse_devices(&text)
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
