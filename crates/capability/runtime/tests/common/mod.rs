#![allow(dead_code)]

use async_trait::async_trait;
use domain::{DataType, DeviceConfig, EndianType, ProtectType, Value, VariableConfig};
use gw_driver::{
    Driver, DriverDescriptor, DriverEvent, DriverEvents, DriverReading, DriverRegistry, IoArg,
    WriteResponse,
};
use gw_runtime::{GatewayScheduler, RuntimeConfig};
use gw_storage::InMemoryAuditLogStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const STUB_TYPE: &str = "Stub";

/// 桩驱动的观测点与行为开关，测试与驱动共享。
#[derive(Default)]
pub struct Stub {
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    in_io: AtomicUsize,
    pub overlaps: AtomicUsize,
    /// 剩余的连接失败次数。
    pub failing_connects: AtomicUsize,
    /// 置位后读取返回 Bad（连接保持）。
    pub fail_reads: AtomicBool,
    /// 置位后下一次读取断开连接。
    pub drop_link: AtomicBool,
    pub io_delay_ms: AtomicU64,
    pub written: Mutex<Vec<(String, Value)>>,
    /// 驱动收到的读写方法（读取时为 `IoArg::method`）。
    pub read_methods: Mutex<Vec<Option<String>>>,
    pub write_methods: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::UnboundedSender<DriverEvent>>>,
}

impl Stub {
    /// 模拟设备推送；尚未订阅时返回 false。
    pub fn push(&self, address: &str, value: Value) -> bool {
        let events = self.events.lock().unwrap();
        events.as_ref().is_some_and(|sender| {
            sender
                .send(DriverEvent {
                    address: address.to_string(),
                    reading: DriverReading::good(value),
                })
                .is_ok()
        })
    }

    pub fn subscribed(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }

    async fn io(&self) {
        if self.in_io.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.io_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_io.fetch_sub(1, Ordering::SeqCst);
    }
}

struct StubDriver {
    stub: Arc<Stub>,
    connected: bool,
}

#[async_trait]
impl Driver for StubDriver {
    async fn connect(&mut self) -> bool {
        self.stub.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self.stub.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.stub.failing_connects.store(failing - 1, Ordering::SeqCst);
            self.connected = false;
            return false;
        }
        self.connected = true;
        true
    }

    async fn close(&mut self) -> bool {
        self.stub.closes.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        true
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read(&mut self, arg: &IoArg) -> DriverReading {
        self.stub.io().await;
        let count = self.stub.reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.stub.read_methods.lock().unwrap().push(arg.method.clone());
        if self.stub.drop_link.swap(false, Ordering::SeqCst) {
            self.connected = false;
            return DriverReading::bad("connection reset");
        }
        if self.stub.fail_reads.load(Ordering::SeqCst) {
            return DriverReading::bad("sensor fault");
        }
        match arg.address.parse::<i64>() {
            Ok(fixed) => DriverReading::good(Value::Int(fixed)),
            Err(_) => DriverReading::good(Value::Int(count as i64)),
        }
    }

    async fn write(
        &mut self,
        _request_id: &str,
        method: &str,
        arg: &IoArg,
        value: &Value,
    ) -> WriteResponse {
        self.stub.io().await;
        self.stub.write_methods.lock().unwrap().push(method.to_string());
        if method != "write" && !method.starts_with("Write") {
            return WriteResponse::failed(format!("method '{}' not supported", method));
        }
        self.stub.writes.fetch_add(1, Ordering::SeqCst);
        self.stub
            .written
            .lock()
            .unwrap()
            .push((arg.address.clone(), value.clone()));
        WriteResponse::ok("written")
    }

    fn subscribe(&mut self, _targets: Vec<IoArg>) -> Option<DriverEvents> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.stub.events.lock().unwrap() = Some(sender);
        Some(receiver)
    }
}

/// 按设备 ID 分配的桩驱动观测点。
#[derive(Clone, Default)]
pub struct Stubs {
    inner: Arc<Mutex<HashMap<String, Arc<Stub>>>>,
}

impl Stubs {
    pub fn get(&self, device_id: &str) -> Arc<Stub> {
        self.inner
            .lock()
            .unwrap()
            .entry(device_id.to_string())
            .or_default()
            .clone()
    }
}

pub fn registry(stubs: &Stubs) -> Arc<DriverRegistry> {
    let mut registry = DriverRegistry::new();
    let stubs = stubs.clone();
    registry.register(
        DriverDescriptor {
            type_tag: STUB_TYPE.to_string(),
            version: "test".to_string(),
            description: "In-process stub driver".to_string(),
            parameters: Vec::new(),
            address_definitions: BTreeMap::new(),
        },
        move |ctx, _params| {
            Ok(Box::new(StubDriver {
                stub: stubs.get(&ctx.device_id),
                connected: false,
            }))
        },
    );
    Arc::new(registry)
}

pub fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        reconnect_interval: Duration::from_millis(100),
        reconnect_max: Duration::from_millis(400),
        io_timeout: Duration::from_millis(1_000),
    }
}

pub fn scheduler(stubs: &Stubs) -> (GatewayScheduler, Arc<InMemoryAuditLogStore>) {
    let audit = Arc::new(InMemoryAuditLogStore::new());
    let scheduler = GatewayScheduler::new(registry(stubs), audit.clone(), runtime_config());
    (scheduler, audit)
}

pub fn variable(name: &str, address: &str, protect: ProtectType) -> VariableConfig {
    VariableConfig {
        name: name.to_string(),
        address: address.to_string(),
        data_type: DataType::Int32,
        method: None,
        endian: EndianType::BigEndian,
        protect,
        is_trigger: false,
        expression: None,
        alias: None,
        description: None,
    }
}

pub fn device(id: &str, min_period_ms: u64, variables: Vec<VariableConfig>) -> DeviceConfig {
    let mut device = DeviceConfig::new(id, format!("{}-name", id), STUB_TYPE);
    device.min_period_ms = min_period_ms;
    device.variables = variables;
    device
}

/// 推进虚拟时间并让出调度，使后台任务跑完到期的工作。
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
