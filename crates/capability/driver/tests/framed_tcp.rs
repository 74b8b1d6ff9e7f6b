use domain::{DataType, EndianType, StatusType, Value};
use gw_driver::drivers::{CMD_READ, CMD_WRITE, FramedTcpConfig, FramedTcpDriver, encode_frame};
use gw_driver::{Driver, DriverContext, IoArg};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// 简易设备：按寄存器名应答，写入 `name=value` 更新寄存器。
async fn spawn_device() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut registers: HashMap<String, String> =
            HashMap::from([("temp".to_string(), "21.5".to_string())]);
        let mut buffer = vec![0u8; 512];
        loop {
            let len = match socket.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(len) => len,
            };
            let frame = &buffer[..len];
            let cmd = frame[1];
            let data = String::from_utf8_lossy(&frame[4..len - 2]).to_string();
            let reply = match cmd {
                CMD_READ => match registers.get(&data) {
                    Some(value) => encode_frame(CMD_READ, 0, value.as_bytes()),
                    None => encode_frame(CMD_READ, 0x01, b""),
                },
                _ => {
                    let (name, value) = data.split_once('=').expect("assignment");
                    registers.insert(name.to_string(), value.to_string());
                    encode_frame(CMD_WRITE, 0, b"")
                }
            }
            .expect("frame");
            socket.write_all(&reply).await.expect("reply");
        }
    });
    port
}

fn driver(port: u16) -> FramedTcpDriver {
    let ctx = DriverContext {
        device_id: "framed-1".to_string(),
        device_name: "framed".to_string(),
        cancel: CancellationToken::new(),
    };
    FramedTcpDriver::new(
        ctx,
        FramedTcpConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 1000,
            response_timeout_ms: 500,
            retry_count: 0,
            retry_interval_ms: 10,
        },
    )
}

#[tokio::test]
async fn reads_and_writes_registers() {
    let port = spawn_device().await;
    let mut driver = driver(port);
    assert!(driver.connect().await);
    assert!(driver.is_connected());

    let temp = IoArg::new("temp", DataType::Float, EndianType::BigEndian);
    let reading = driver.read(&temp).await;
    assert_eq!(reading.status, StatusType::Good, "{:?}", reading.message);
    assert_eq!(reading.value, Value::Float(21.5));

    let response = driver
        .write("req-1", "write", &temp, &Value::String("30".to_string()))
        .await;
    assert!(response.success, "{}", response.description);
    assert_eq!(driver.read(&temp).await.value, Value::Float(30.0));

    let missing = driver
        .read(&IoArg::new("nope", DataType::Float, EndianType::BigEndian))
        .await;
    assert_eq!(missing.status, StatusType::Bad);

    assert!(driver.close().await);
    assert!(!driver.is_connected());
    assert_eq!(driver.read(&temp).await.status, StatusType::Bad);
}

#[tokio::test]
async fn connect_failure_returns_false() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    let mut driver = driver(port);
    assert!(!driver.connect().await);
    assert!(!driver.is_connected());
}

/// 不规矩的设备：`temp` 的应答分两段发送，`slow` 的应答晚于驱动超时才到达。
async fn spawn_unruly_device() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buffer = vec![0u8; 512];
        loop {
            let len = match socket.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(len) => len,
            };
            let data = String::from_utf8_lossy(&buffer[4..len - 2]).to_string();
            match data.as_str() {
                "temp" => {
                    let reply = encode_frame(CMD_READ, 0, b"21.5").expect("frame");
                    socket.write_all(&reply[..3]).await.expect("head");
                    socket.flush().await.expect("flush");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    socket.write_all(&reply[3..]).await.expect("tail");
                }
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    let reply = encode_frame(CMD_READ, 0, b"99").expect("frame");
                    socket.write_all(&reply).await.expect("late reply");
                }
                _ => {
                    let reply = encode_frame(CMD_READ, 0x01, b"").expect("frame");
                    socket.write_all(&reply).await.expect("reply");
                }
            }
        }
    });
    port
}

fn short_timeout_driver(port: u16) -> FramedTcpDriver {
    let ctx = DriverContext {
        device_id: "framed-2".to_string(),
        device_name: "unruly".to_string(),
        cancel: CancellationToken::new(),
    };
    FramedTcpDriver::new(
        ctx,
        FramedTcpConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 1000,
            response_timeout_ms: 100,
            retry_count: 0,
            retry_interval_ms: 10,
        },
    )
}

#[tokio::test]
async fn reply_split_across_segments_is_reassembled() {
    let port = spawn_unruly_device().await;
    let mut driver = short_timeout_driver(port);
    assert!(driver.connect().await);

    let temp = IoArg::new("temp", DataType::Float, EndianType::BigEndian);
    let reading = driver.read(&temp).await;
    assert_eq!(reading.status, StatusType::Good, "{:?}", reading.message);
    assert_eq!(reading.value, Value::Float(21.5));
    assert!(driver.is_connected());
}

#[tokio::test]
async fn late_reply_is_not_taken_for_the_next_read() {
    let port = spawn_unruly_device().await;
    let mut driver = short_timeout_driver(port);
    assert!(driver.connect().await);

    let slow = IoArg::new("slow", DataType::Float, EndianType::BigEndian);
    assert_eq!(driver.read(&slow).await.status, StatusType::Bad);

    // 迟到的 "99" 已到达套接字
    tokio::time::sleep(Duration::from_millis(400)).await;

    let temp = IoArg::new("temp", DataType::Float, EndianType::BigEndian);
    let reading = driver.read(&temp).await;
    assert_eq!(reading.status, StatusType::Good, "{:?}", reading.message);
    assert_eq!(reading.value, Value::Float(21.5));
}
