//! 网关进程：加载设备 → 启动采集 → HTTP 控制面 →（可选）MQTT 上行。

mod handlers;
mod routes;
mod utils;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use gw_config::{AppConfig, load_devices};
use gw_driver::DriverRegistry;
use gw_runtime::{GatewayScheduler, RuntimeConfig};
use gw_storage::{AuditLogStore, InMemoryAuditLogStore};
use gw_telemetry::{init_tracing, new_request_ids};
use gw_uplink::{
    MqttTelemetryPublisher, MqttUplinkConfig, NoopPublisher, TelemetryPublisher,
    spawn_rpc_listener, spawn_telemetry_loop,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<GatewayScheduler>,
    pub audit: Arc<dyn AuditLogStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let devices = match &config.devices_file {
        Some(path) => load_devices(path)?,
        None => {
            warn!(target: "gw.api", "GW_DEVICES_FILE not set, starting without devices");
            Vec::new()
        }
    };

    let audit: Arc<dyn AuditLogStore> = Arc::new(InMemoryAuditLogStore::new());
    let scheduler = Arc::new(GatewayScheduler::new(
        Arc::new(DriverRegistry::with_builtin()),
        audit.clone(),
        RuntimeConfig {
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
            io_timeout: Duration::from_millis(config.io_timeout_ms),
        },
    ));
    scheduler.register_devices(devices).await;
    scheduler.start_all().await;

    // MQTT 上行：遥测上报 + 远程写入
    let cancel = CancellationToken::new();
    let mut background = Vec::new();
    let publisher: Arc<dyn TelemetryPublisher> = if config.mqtt_enabled {
        let mqtt = MqttUplinkConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            topic_prefix: config.mqtt_topic_prefix.clone(),
            qos: config.mqtt_qos,
            gateway_name: config.gateway_name.clone(),
        };
        let (publisher, eventloop) = MqttTelemetryPublisher::connect(mqtt.clone())?;
        background.push(eventloop);
        background.push(spawn_rpc_listener(mqtt, scheduler.clone(), cancel.clone()));
        info!(
            target: "gw.api",
            host = %config.mqtt_host,
            port = config.mqtt_port,
            prefix = %config.mqtt_topic_prefix,
            "mqtt_uplink_enabled"
        );
        Arc::new(publisher)
    } else {
        Arc::new(NoopPublisher)
    };
    background.push(spawn_telemetry_loop(
        scheduler.clone(),
        publisher,
        Duration::from_millis(config.telemetry_interval_ms),
        cancel.clone(),
    ));

    let state = AppState {
        scheduler: scheduler.clone(),
        audit,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "gw.api", addr = %config.http_addr, gateway = %config.gateway_name, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    scheduler.stop_all().await;
    for handle in background {
        handle.abort();
    }
    info!(target: "gw.api", "gateway_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "gw.api", error = %err, "shutdown_signal_failed");
        std::future::pending::<()>().await;
    }
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    // 生成 request_id 与 trace_id，并注入请求扩展与日志
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}
