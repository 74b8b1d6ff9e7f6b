//! MQTT 实现（rumqttc）。

use crate::error::UplinkError;
use crate::publisher::{TelemetryBatch, TelemetryPublisher};
use crate::rpc::parse_rpc_request;
use crate::topics::{request_id_from_topic, rpc_request_filter, rpc_response_topic, telemetry_topic};
use async_trait::async_trait;
use domain::{RpcRequest, RpcResponse, TelemetryRecord, Value, now_epoch_ms};
use gw_runtime::GatewayScheduler;
use gw_telemetry::record_rpc_request;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// MQTT 上行配置。
#[derive(Debug, Clone)]
pub struct MqttUplinkConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
    /// 网关名称，写入上报报文并作为客户端 ID 前缀。
    pub gateway_name: String,
}

impl MqttUplinkConfig {
    fn options(&self, role: &str) -> MqttOptions {
        let client_id = format!("{}-{}-{}", self.gateway_name, role, uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (self.username.clone(), self.password.clone()) {
            options.set_credentials(username, password);
        }
        options
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryEnvelope<'a> {
    gateway: &'a str,
    device_id: &'a str,
    device_name: &'a str,
    published_at_ms: i64,
    records: &'a [TelemetryRecord],
}

/// 遥测发布器。
#[derive(Clone)]
pub struct MqttTelemetryPublisher {
    client: AsyncClient,
    topic_prefix: String,
    gateway_name: String,
    qos: QoS,
}

impl MqttTelemetryPublisher {
    /// 建立客户端并在后台驱动事件循环（断线由 rumqttc 自动重连）。
    pub fn connect(
        config: MqttUplinkConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), UplinkError> {
        let (client, mut eventloop) = AsyncClient::new(config.options("telemetry"), 10);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "gw.uplink", "mqtt telemetry eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        Ok((
            Self {
                client,
                topic_prefix: config.topic_prefix,
                gateway_name: config.gateway_name,
                qos: qos_from_u8(config.qos),
            },
            handle,
        ))
    }
}

#[async_trait]
impl TelemetryPublisher for MqttTelemetryPublisher {
    async fn publish(&self, batch: &TelemetryBatch) -> Result<(), UplinkError> {
        let topic = telemetry_topic(&self.topic_prefix, &batch.device_name);
        let envelope = TelemetryEnvelope {
            gateway: &self.gateway_name,
            device_id: &batch.device_id,
            device_name: &batch.device_name,
            published_at_ms: now_epoch_ms(),
            records: &batch.records,
        };
        let payload =
            serde_json::to_vec(&envelope).map_err(|err| UplinkError::Payload(err.to_string()))?;
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|err| UplinkError::Publish(err.to_string()))
    }
}

/// 启动远程写入监听：请求经调度器写入，结果发布到响应 topic。
pub fn spawn_rpc_listener(
    config: MqttUplinkConfig,
    scheduler: Arc<GatewayScheduler>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (client, mut eventloop) = AsyncClient::new(config.options("rpc"), 10);
        let qos = qos_from_u8(config.qos);
        let filter = rpc_request_filter(&config.topic_prefix);
        info!(target: "gw.uplink", topic = %filter, "rpc_listener_started");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = eventloop.poll() => event,
            };
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    record_rpc_request();
                    let request =
                        match parse_rpc_request(&config.topic_prefix, &publish.topic, &publish.payload) {
                            Ok(request) => request,
                            Err(err) => {
                                warn!(
                                    target: "gw.uplink",
                                    topic = %publish.topic,
                                    error = %err,
                                    "rpc_request_invalid"
                                );
                                if let Some(request_id) =
                                    request_id_from_topic(&config.topic_prefix, &publish.topic)
                                {
                                    let response = invalid_response(request_id, err.to_string());
                                    spawn_response(client.clone(), &config.topic_prefix, qos, response);
                                }
                                continue;
                            }
                        };
                    info!(
                        target: "gw.uplink",
                        request_id = %request.request_id,
                        device_id = %request.device_id,
                        variable = %request.variable,
                        "rpc_request_received"
                    );
                    // 写入可能耗时，不阻塞事件循环
                    let scheduler = scheduler.clone();
                    let client = client.clone();
                    let prefix = config.topic_prefix.clone();
                    tokio::spawn(async move {
                        let response = scheduler.dispatch_request(request).await;
                        publish_response(&client, &prefix, qos, &response).await;
                    });
                }
                // 每次（重新）连上都要订阅，broker 不保留会话
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if let Err(err) = client.try_subscribe(filter.clone(), qos) {
                        warn!(target: "gw.uplink", "mqtt rpc subscribe error: {}", err);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "gw.uplink", "mqtt rpc eventloop error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        let _ = client.disconnect().await;
        info!(target: "gw.uplink", "rpc_listener_stopped");
    })
}

fn invalid_response(request_id: String, description: String) -> RpcResponse {
    let request = RpcRequest {
        request_id,
        device_id: String::new(),
        variable: String::new(),
        value: Value::Null,
        method: None,
    };
    RpcResponse::new(&request, false, description)
}

fn spawn_response(client: AsyncClient, prefix: &str, qos: QoS, response: RpcResponse) {
    let prefix = prefix.to_string();
    tokio::spawn(async move {
        publish_response(&client, &prefix, qos, &response).await;
    });
}

async fn publish_response(client: &AsyncClient, prefix: &str, qos: QoS, response: &RpcResponse) {
    let topic = rpc_response_topic(prefix, &response.request_id);
    let payload = match serde_json::to_vec(response) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(target: "gw.uplink", error = %err, "rpc_response_encode_failed");
            return;
        }
    };
    if let Err(err) = client.publish(topic, qos, false, payload).await {
        warn!(
            target: "gw.uplink",
            request_id = %response.request_id,
            error = %err,
            "rpc_response_publish_failed"
        );
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
