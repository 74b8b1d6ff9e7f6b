//! 模拟设备驱动
//!
//! 用于调试与联调的内存设备，地址语法：
//!
//! - `counter` / `counter:<step>`：每次读取递增
//! - `ramp:<min>:<max>:<step>`：锯齿波
//! - `toggle`：布尔翻转
//! - `const:<value>`：常量
//! - `mem:<key>`：可写内存单元，写入后推送给订阅者

use crate::contract::{
    AddressDefinition, Driver, DriverEvent, DriverEvents, DriverReading, IoArg, WriteResponse,
};
use crate::convert::coerce;
use crate::descriptor::{DriverDescriptor, DriverParams, ParameterSpec};
use crate::error::DriverError;
use crate::registry::DriverContext;
use async_trait::async_trait;
use domain::{DataType, ParamValue, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const SIMULATOR_TYPE: &str = "Simulator";

/// 模拟驱动配置。
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// 前 N 次连接失败。
    pub connect_failures: u64,
    /// 每次连接后成功读取 N 次即断线（0 表示不断线）。
    pub offline_after_reads: u64,
}

/// 模拟设备驱动。
pub struct SimulatorDriver {
    ctx: DriverContext,
    config: SimulatorConfig,
    connected: bool,
    connect_attempts: u64,
    reads_since_connect: u64,
    counters: HashMap<String, i64>,
    ramps: HashMap<String, f64>,
    toggles: HashMap<String, bool>,
    memory: HashMap<String, Value>,
    subscription: Option<(Vec<IoArg>, mpsc::UnboundedSender<DriverEvent>)>,
}

impl SimulatorDriver {
    pub fn new(ctx: DriverContext, config: SimulatorConfig) -> Self {
        Self {
            ctx,
            config,
            connected: false,
            connect_attempts: 0,
            reads_since_connect: 0,
            counters: HashMap::new(),
            ramps: HashMap::new(),
            toggles: HashMap::new(),
            memory: HashMap::new(),
            subscription: None,
        }
    }

    pub fn from_params(ctx: DriverContext, params: &DriverParams) -> Result<Self, DriverError> {
        let config = SimulatorConfig {
            connect_failures: params.u64("connect_failures")?,
            offline_after_reads: params.u64("offline_after_reads")?,
        };
        Ok(Self::new(ctx, config))
    }

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor {
            type_tag: SIMULATOR_TYPE.to_string(),
            version: "1.0".to_string(),
            description: "In-memory simulated device for commissioning and demos".to_string(),
            parameters: vec![
                ParameterSpec::number("connect_failures", "Fail the first N connect attempts")
                    .with_default(ParamValue::Number(0.0)),
                ParameterSpec::number(
                    "offline_after_reads",
                    "Drop the connection after N reads (0 = never)",
                )
                .with_default(ParamValue::Number(0.0)),
            ],
            address_definitions: Self::definitions(),
        }
    }

    fn definitions() -> BTreeMap<String, AddressDefinition> {
        BTreeMap::from([
            (
                "Counter".to_string(),
                AddressDefinition::new("Increments on every read", DataType::Int32, "counter[:<step>]"),
            ),
            (
                "Ramp".to_string(),
                AddressDefinition::new(
                    "Sawtooth between min and max",
                    DataType::Double,
                    "ramp:<min>:<max>:<step>",
                ),
            ),
            (
                "Toggle".to_string(),
                AddressDefinition::new("Alternates on every read", DataType::Bool, "toggle"),
            ),
            (
                "Constant".to_string(),
                AddressDefinition::new("Fixed value", DataType::Double, "const:<value>"),
            ),
            (
                "Memory".to_string(),
                AddressDefinition::new("Writable cell", DataType::Double, "mem:<key>"),
            ),
        ])
    }

    fn generate(&mut self, address: &str) -> Result<Value, String> {
        let mut parts = address.split(':');
        let kind = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        match (kind, args.as_slice()) {
            ("counter", rest) => {
                let step = match rest {
                    [] => 1,
                    [step] => step
                        .parse::<i64>()
                        .map_err(|_| format!("invalid counter step '{}'", step))?,
                    _ => return Err(format!("invalid counter address '{}'", address)),
                };
                let counter = self.counters.entry(address.to_string()).or_insert(0);
                *counter = counter.wrapping_add(step);
                Ok(Value::Int(*counter))
            }
            ("ramp", [min, max, step]) => {
                let parse = |text: &str| {
                    text.parse::<f64>()
                        .map_err(|_| format!("invalid ramp address '{}'", address))
                };
                let (min, max, step) = (parse(min)?, parse(max)?, parse(step)?);
                let current = self.ramps.entry(address.to_string()).or_insert(min);
                let value = *current;
                *current = if *current + step > max { min } else { *current + step };
                Ok(Value::Float(value))
            }
            ("toggle", []) => {
                let flag = self.toggles.entry(address.to_string()).or_insert(false);
                *flag = !*flag;
                Ok(Value::Bool(*flag))
            }
            ("const", [_, ..]) => {
                let text = &address["const:".len()..];
                Ok(parse_literal(text))
            }
            ("mem", [key]) => self
                .memory
                .get(*key)
                .cloned()
                .ok_or_else(|| format!("cell '{}' has not been written", key)),
            _ => Err(format!("unknown simulator address '{}'", address)),
        }
    }

    fn notify(&mut self, address: &str, value: &Value) {
        let Some((targets, sender)) = self.subscription.as_ref() else {
            return;
        };
        let mut closed = false;
        for target in targets.iter().filter(|target| target.address == address) {
            let reading = coerce(value, target.data_type).into();
            let event = DriverEvent {
                address: address.to_string(),
                reading,
            };
            if sender.send(event).is_err() {
                closed = true;
                break;
            }
        }
        if closed {
            self.subscription = None;
        }
    }
}

fn parse_literal(text: &str) -> Value {
    if let Ok(number) = text.parse::<i64>() {
        return Value::Int(number);
    }
    if let Ok(number) = text.parse::<f64>() {
        return Value::Float(number);
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

#[async_trait]
impl Driver for SimulatorDriver {
    async fn connect(&mut self) -> bool {
        self.close().await;
        self.connect_attempts += 1;
        if self.connect_attempts <= self.config.connect_failures {
            debug!(
                target: "gw.driver",
                device_id = %self.ctx.device_id,
                attempt = self.connect_attempts,
                "simulator_connect_refused"
            );
            return false;
        }
        self.connected = true;
        self.reads_since_connect = 0;
        info!(
            target: "gw.driver",
            device_id = %self.ctx.device_id,
            "simulator_connected"
        );
        true
    }

    async fn close(&mut self) -> bool {
        self.connected = false;
        true
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read(&mut self, arg: &IoArg) -> DriverReading {
        if !self.connected {
            return DriverReading::bad("not connected");
        }
        self.reads_since_connect += 1;
        if self.config.offline_after_reads > 0
            && self.reads_since_connect > self.config.offline_after_reads
        {
            self.connected = false;
            return DriverReading::bad("connection lost");
        }
        match self.generate(&arg.address) {
            Ok(raw) => coerce(&raw, arg.data_type).into(),
            Err(message) => DriverReading::bad(message),
        }
    }

    async fn write(
        &mut self,
        request_id: &str,
        method: &str,
        arg: &IoArg,
        value: &Value,
    ) -> WriteResponse {
        if !self.connected {
            return WriteResponse::failed("not connected");
        }
        if method != "write" {
            return WriteResponse::failed(format!("method '{}' not supported", method));
        }
        let Some(key) = arg.address.strip_prefix("mem:") else {
            return WriteResponse::failed(format!("address '{}' is not writable", arg.address));
        };
        let value = match coerce(value, arg.data_type) {
            Ok(value) => value,
            Err(err) => return WriteResponse::failed(err.to_string()),
        };
        self.memory.insert(key.to_string(), value.clone());
        self.notify(&arg.address, &value);
        debug!(
            target: "gw.driver",
            device_id = %self.ctx.device_id,
            request_id = %request_id,
            address = %arg.address,
            "simulator_written"
        );
        WriteResponse::ok("written")
    }

    fn address_definitions(&self) -> Option<BTreeMap<String, AddressDefinition>> {
        Some(Self::definitions())
    }

    fn subscribe(&mut self, targets: Vec<IoArg>) -> Option<DriverEvents> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscription = Some((targets, sender));
        Some(receiver)
    }
}
