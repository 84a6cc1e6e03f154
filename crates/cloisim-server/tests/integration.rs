//! End-to-end tests of the control channel using a real WebSocket client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cloisim_core::{
    BridgeManager, BridgeRegistry, DeviceBinding, DeviceMap, ResetLatch, TopicPortMap,
};
use cloisim_server::config::ServerConfig;
use cloisim_server::server::{CONTROL_PATH, ControlServer};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Fixed topic table.
struct StaticTopics;

impl BridgeRegistry for StaticTopics {
    fn device_map(&self, _filter: &str) -> DeviceMap {
        DeviceMap::new()
    }

    fn topic_port_map(&self, filter: &str) -> TopicPortMap {
        [("cam0", 9001), ("lidar0", 9002)]
            .into_iter()
            .filter(|(name, _)| name.starts_with(filter))
            .map(|(name, port)| (name.to_string(), port))
            .collect()
    }
}

struct Harness {
    url: String,
    server: Arc<ControlServer>,
    latch: Arc<ResetLatch>,
    serve: Option<tokio::task::JoinHandle<()>>,
}

fn seeded_bridges() -> Arc<BridgeManager> {
    let bridges = Arc::new(BridgeManager::with_probe(Box::new(|_| true)));
    for (model, link, sensor, topic) in [
        ("Robot1", "base_link", "lidar", "scan"),
        ("Robot1", "camera_link", "camera", "image_raw"),
        ("Drone", "body", "imu", "imu"),
    ] {
        let _ = bridges
            .allocate_device(&DeviceBinding::new(model, link, sensor, topic))
            .unwrap();
    }
    bridges
}

async fn boot_with(config: ServerConfig, registry: Arc<dyn BridgeRegistry>) -> Harness {
    let latch = Arc::new(ResetLatch::new());
    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(ControlServer::new(config, registry, latch.clone(), metrics));
    let (addr, serve) = server.listen().await.unwrap();
    Harness {
        url: format!("ws://{addr}{CONTROL_PATH}"),
        server,
        latch,
        serve: Some(serve),
    }
}

async fn boot() -> Harness {
    boot_with(ServerConfig::default(), seeded_bridges()).await
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Read the next text frame as a raw string.
async fn read_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return text.to_string();
        }
    }
}

async fn read_json(ws: &mut WsStream) -> Value {
    serde_json::from_str(&read_text(ws).await).unwrap()
}

async fn request(ws: &mut WsStream, body: Value) -> Value {
    ws.send(Message::text(body.to_string())).await.unwrap();
    read_json(ws).await
}

async fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// ── Commands ──

#[tokio::test]
async fn topic_list_wire_format() {
    let h = boot_with(ServerConfig::default(), Arc::new(StaticTopics)).await;
    let mut ws = connect(&h.url).await;

    ws.send(Message::text(
        r#"{"command":"topic_list","filter":"","indent":false}"#,
    ))
    .await
    .unwrap();
    assert_eq!(
        read_text(&mut ws).await,
        r#"{"command":"topic_list","result":{"cam0":9001,"lidar0":9002}}"#
    );
}

#[tokio::test]
async fn topic_list_filter_by_prefix() {
    let h = boot_with(ServerConfig::default(), Arc::new(StaticTopics)).await;
    let mut ws = connect(&h.url).await;

    let resp = request(&mut ws, json!({"command": "topic_list", "filter": "lid"})).await;
    assert_eq!(resp, json!({"command": "topic_list", "result": {"lidar0": 9002}}));
}

#[tokio::test]
async fn device_list_returns_every_device() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;

    let resp = request(&mut ws, json!({"command": "device_list"})).await;
    assert_eq!(resp["command"], "device_list");
    let models = resp["result"].as_object().unwrap();
    assert_eq!(models.len(), 2);
    assert!(resp["result"]["Robot1"]["base_link"]["lidar"]["scan"].is_u64());
    assert!(resp["result"]["Drone"]["body"]["imu"]["imu"].is_u64());
}

#[tokio::test]
async fn device_list_filter() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;

    let resp = request(&mut ws, json!({"command": "device_list", "filter": "Robot"})).await;
    let models = resp["result"].as_object().unwrap();
    assert_eq!(models.keys().collect::<Vec<_>>(), vec!["Robot1"]);

    let resp = request(&mut ws, json!({"command": "device_list", "filter": "Tank"})).await;
    assert_eq!(resp, json!({"command": "device_list", "result": {}}));
}

#[tokio::test]
async fn reset_ok_then_fail_while_resetting() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;

    let resp = request(&mut ws, json!({"command": "reset"})).await;
    assert_eq!(resp, json!({"command": "reset", "result": "ok"}));
    assert!(h.latch.take_trigger());

    h.latch.begin_reset();
    let resp = request(&mut ws, json!({"command": "reset"})).await;
    assert_eq!(resp, json!({"command": "reset", "result": "fail"}));
    h.latch.finish_reset();
}

#[tokio::test]
async fn unknown_command_is_invalid() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;

    ws.send(Message::text(r#"{"command":"pause"}"#)).await.unwrap();
    assert_eq!(read_text(&mut ws).await, r#"{"command":"Invalid Command"}"#);
}

#[tokio::test]
async fn indent_produces_multiline_reply() {
    let h = boot_with(ServerConfig::default(), Arc::new(StaticTopics)).await;
    let mut ws = connect(&h.url).await;

    ws.send(Message::text(r#"{"command":"topic_list","indent":true}"#))
        .await
        .unwrap();
    let pretty = read_text(&mut ws).await;
    assert!(pretty.lines().count() > 1);

    ws.send(Message::text(r#"{"command":"topic_list","indent":false}"#))
        .await
        .unwrap();
    let compact = read_text(&mut ws).await;
    assert_eq!(compact.lines().count(), 1);

    let a: Value = serde_json::from_str(&pretty).unwrap();
    let b: Value = serde_json::from_str(&compact).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn binary_frame_is_decoded_as_text() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;

    ws.send(Message::binary(br#"{"command":"reset"}"#.to_vec()))
        .await
        .unwrap();
    assert_eq!(
        read_json(&mut ws).await,
        json!({"command": "reset", "result": "ok"})
    );
}

// ── Silence ──

#[tokio::test]
async fn empty_and_malformed_frames_get_no_reply() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;

    ws.send(Message::text("")).await.unwrap();
    ws.send(Message::binary(Vec::<u8>::new())).await.unwrap();
    ws.send(Message::text("{not json")).await.unwrap();
    ws.send(Message::text(r#"{"command":7}"#)).await.unwrap();
    ws.send(Message::Ping(Vec::new().into())).await.unwrap();

    // First reply belongs to the first well-formed request.
    let resp = request(&mut ws, json!({"command": "nope"})).await;
    assert_eq!(resp, json!({"command": "Invalid Command"}));
    assert_eq!(h.server.tracker().count(), 1);
}

// ── Ordering ──

#[tokio::test]
async fn pipelined_requests_each_get_a_reply() {
    const REQUESTS: usize = 2000;
    let h = boot_with(ServerConfig::default(), Arc::new(StaticTopics)).await;
    let ws = connect(&h.url).await;
    let (mut sink, mut stream) = ws.split();

    let writer = tokio::spawn(async move {
        for _ in 0..REQUESTS {
            sink.feed(Message::text(r#"{"command":"topic_list","indent":true}"#))
                .await
                .unwrap();
        }
        sink.flush().await.unwrap();
        sink
    });

    let mut replies = 0;
    while replies < REQUESTS {
        let msg = timeout(TIMEOUT, stream.next())
            .await
            .expect("timeout waiting for reply")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["command"], "topic_list");
            replies += 1;
        }
    }
    let _sink = writer.await.unwrap();
    assert_eq!(replies, REQUESTS);
}

#[tokio::test]
async fn reply_is_sent_before_close_handshake() {
    let h = boot_with(ServerConfig::default(), Arc::new(StaticTopics)).await;
    for _ in 0..20 {
        let mut ws = connect(&h.url).await;
        ws.feed(Message::text(r#"{"command":"topic_list"}"#))
            .await
            .unwrap();
        ws.feed(Message::Close(None)).await.unwrap();
        ws.flush().await.unwrap();

        let mut reply = None;
        let mut close_acked = false;
        while let Some(msg) = timeout(TIMEOUT, ws.next()).await.expect("timeout") {
            match msg {
                Ok(Message::Text(text)) => reply = Some(text.to_string()),
                Ok(Message::Close(_)) => close_acked = true,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        assert_eq!(
            reply.as_deref(),
            Some(r#"{"command":"topic_list","result":{"cam0":9001,"lidar0":9002}}"#)
        );
        assert!(close_acked);
    }
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 0).await);
}

// ── Session lifecycle ──

#[tokio::test]
async fn close_releases_session() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 1).await);

    ws.close(None).await.unwrap();
    assert!(wait_until(|| server.tracker().count() == 0).await);
}

#[tokio::test]
async fn dropped_client_is_released() {
    let h = boot().await;
    let ws = connect(&h.url).await;
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 1).await);

    drop(ws);
    assert!(wait_until(|| server.tracker().count() == 0).await);
}

#[tokio::test]
async fn connection_limit_returns_503() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let h = boot_with(config, seeded_bridges()).await;
    let _first = connect(&h.url).await;
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 1).await);

    match connect_async(&h.url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status().as_u16(), 503);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("second connection should be refused"),
    }
}

#[tokio::test]
async fn concurrent_upgrades_respect_limit() {
    let config = ServerConfig {
        max_connections: 2,
        ..ServerConfig::default()
    };
    let h = boot_with(config, seeded_bridges()).await;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let url = h.url.clone();
            tokio::spawn(async move { connect_async(url).await })
        })
        .collect();

    let mut open = Vec::new();
    let mut refused = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok((ws, _)) => open.push(ws),
            Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
                assert_eq!(resp.status().as_u16(), 503);
                refused += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(open.len(), 2);
    assert_eq!(refused, 6);
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 2).await);

    drop(open);
    assert!(wait_until(|| server.tracker().count() == 0).await);
    let deadline = Instant::now() + TIMEOUT;
    let mut ws = loop {
        match connect_async(&h.url).await {
            Ok((ws, _)) => break ws,
            Err(e) if Instant::now() >= deadline => panic!("slot never released: {e}"),
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    };
    let resp = request(&mut ws, json!({"command": "reset"})).await;
    assert_eq!(resp["result"], "ok");
}

#[tokio::test]
async fn protocol_error_ends_session_cleanly() {
    use tokio::io::AsyncWriteExt;

    let h = boot().await;
    let mut ws = connect(&h.url).await;
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 1).await);

    // Client frames must be masked; this one is not.
    let tokio_tungstenite::MaybeTlsStream::Plain(tcp) = ws.get_mut() else {
        panic!("expected plain TCP");
    };
    tcp.write_all(&[0x81, 0x02, b'h', b'i']).await.unwrap();
    tcp.flush().await.unwrap();

    assert!(wait_until(|| server.tracker().count() == 0).await);

    let mut other = connect(&h.url).await;
    let resp = request(&mut other, json!({"command": "topic_list", "filter": "none"})).await;
    assert_eq!(resp, json!({"command": "topic_list", "result": {}}));
}

#[tokio::test]
async fn unresponsive_client_is_swept() {
    let config = ServerConfig {
        keep_clean: true,
        heartbeat_interval_ms: 50,
        wait_time_ms: 50,
        ..ServerConfig::default()
    };
    let h = boot_with(config, seeded_bridges()).await;
    // Never polled, so pings go unanswered.
    let _ws = connect(&h.url).await;
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 1).await);
    assert!(wait_until(|| server.tracker().count() == 0).await);
}

#[tokio::test]
async fn responsive_client_survives_heartbeats() {
    let config = ServerConfig {
        keep_clean: true,
        heartbeat_interval_ms: 50,
        wait_time_ms: 400,
        ..ServerConfig::default()
    };
    let h = boot_with(config, seeded_bridges()).await;
    let mut ws = connect(&h.url).await;

    // Reading drives automatic pongs.
    for _ in 0..15 {
        let resp = request(&mut ws, json!({"command": "reset"})).await;
        assert_eq!(resp["command"], "reset");
        tokio::time::sleep(Duration::from_millis(60)).await;
    }
    assert_eq!(h.server.tracker().count(), 1);
}

#[tokio::test]
async fn stop_closes_open_sessions() {
    let mut h = boot().await;
    let mut ws = connect(&h.url).await;
    let server = h.server.clone();
    assert!(wait_until(|| server.tracker().count() == 1).await);

    let serve = h.serve.take().unwrap();
    let stopper = tokio::spawn(async move { server.stop(serve, TIMEOUT).await });

    let close = loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Close(frame) = msg {
            break frame;
        }
    };
    assert_eq!(close.unwrap().code, CloseCode::Away);
    assert!(stopper.await.unwrap());
}
