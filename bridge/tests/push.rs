use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use phonecall_bridge::{
    BridgeError, ClientBridge, ClientConfig, MalformedPolicy, NotificationRecord, NotifierServer,
    PHONE_CALL_IN, ReadyState, ServerConfig, inbound_port,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const PHONE_CALL_JSON: &str = r#"{"name":"Jonathan Linnestad","company":"Anleggsmannen"}"#;

fn local_config() -> ServerConfig {
    ServerConfig::default().with_host("127.0.0.1").with_port(0)
}

async fn start_server(
    server: NotifierServer,
) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<()>) {
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        server
            .serve_until(async {
                let _ = stop_rx.await;
            })
            .await
            .unwrap();
    });
    (addr, stop_tx, task)
}

async fn next_text(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> String {
    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("read error");
    match msg {
        Message::Text(text) => text.as_str().to_string(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Accepts one client and plays back the given frames.
async fn scripted_server(frames: Vec<Message>) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            if ws.send(frame).await.is_err() {
                return;
            }
        }
        while let Some(Ok(_)) = ws.next().await {}
    });
    (addr, task)
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::default()
        .with_url(&format!("ws://{addr}"))
        .unwrap()
}

#[tokio::test]
async fn each_connection_receives_exactly_one_record() {
    let server = NotifierServer::bind(&local_config()).await.unwrap();
    let (addr, stop, task) = start_server(server).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();

    let text = next_text(&mut ws).await;
    assert_eq!(text, PHONE_CALL_JSON);
    assert_eq!(
        NotificationRecord::from_json(&text).unwrap(),
        NotificationRecord::phone_call()
    );

    // No second frame follows and the connection stays open.
    let second = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(second.is_err(), "unexpected second frame: {second:?}");

    ws.close(None).await.unwrap();
    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn independent_clients_each_get_their_own_copy() {
    let server = NotifierServer::bind(&local_config()).await.unwrap();
    let (addr, stop, task) = start_server(server).await;
    let url = format!("ws://{addr}");

    let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    assert_eq!(next_text(&mut second).await, PHONE_CALL_JSON);
    assert_eq!(next_text(&mut first).await, PHONE_CALL_JSON);

    // Closing one client leaves the other untouched.
    first.close(None).await.unwrap();
    let extra = timeout(Duration::from_millis(300), second.next()).await;
    assert!(extra.is_err(), "unexpected frame: {extra:?}");

    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn server_pushes_configured_record() {
    let record = NotificationRecord::new("Kari Nordmann", "Veivesenet");
    let server = NotifierServer::bind(&local_config())
        .await
        .unwrap()
        .with_record(record.clone());
    let (addr, stop, task) = start_server(server).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();
    let text = next_text(&mut ws).await;
    assert_eq!(NotificationRecord::from_json(&text).unwrap(), record);

    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn bridge_delivers_record_to_port() {
    let server = NotifierServer::bind(&local_config()).await.unwrap();
    let (addr, stop, task) = start_server(server).await;

    let (tx, mut rx) = inbound_port(PHONE_CALL_IN);
    let handle = ClientBridge::new(client_config(addr), tx)
        .connect()
        .await
        .unwrap();
    assert_eq!(handle.ready_state(), ReadyState::Open);

    let value = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        value,
        json!({ "name": "Jonathan Linnestad", "company": "Anleggsmannen" })
    );

    handle.close();
    assert_eq!(handle.ready_state(), ReadyState::Closed);
    assert_eq!(timeout(Duration::from_secs(5), rx.recv()).await.unwrap(), None);

    stop.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn malformed_frame_is_skipped_by_default() {
    let (addr, server) = scripted_server(vec![
        Message::Text("not json".into()),
        Message::Text(PHONE_CALL_JSON.into()),
        Message::Close(None),
    ])
    .await;

    let (tx, mut rx) = inbound_port(PHONE_CALL_IN);
    let handle = ClientBridge::new(client_config(addr), tx)
        .connect()
        .await
        .unwrap();

    let delivered = timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(
        rx.recv().await,
        Some(json!({ "name": "Jonathan Linnestad", "company": "Anleggsmannen" }))
    );
    assert_eq!(rx.recv().await, None);

    server.await.unwrap();
}

#[tokio::test]
async fn malformed_frame_terminates_when_configured() {
    let (addr, server) = scripted_server(vec![
        Message::Text("not json".into()),
        Message::Text(PHONE_CALL_JSON.into()),
    ])
    .await;

    let (tx, mut rx) = inbound_port(PHONE_CALL_IN);
    let config = client_config(addr).with_malformed_policy(MalformedPolicy::Terminate);
    let handle = ClientBridge::new(config, tx).connect().await.unwrap();

    let err = timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap()
        .unwrap_err();
    match err {
        BridgeError::Deserialization { payload, .. } => assert_eq!(payload, "not json"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(rx.recv().await, None);

    server.await.unwrap();
}

#[tokio::test]
async fn bridge_stops_when_port_receiver_is_gone() {
    let (addr, server) = scripted_server(vec![Message::Text(PHONE_CALL_JSON.into())]).await;

    let (tx, rx) = inbound_port("calls");
    drop(rx);
    let handle = ClientBridge::new(client_config(addr), tx)
        .connect()
        .await
        .unwrap();

    let err = timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BridgeError::PortClosed(ref name) if name == "calls"));

    server.await.unwrap();
}

#[tokio::test]
async fn connection_refused_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, _rx) = inbound_port(PHONE_CALL_IN);
    let err = ClientBridge::new(client_config(addr), tx)
        .connect()
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, BridgeError::Connection(_)), "{err:?}");
}

#[test]
fn started_bridge_feeds_a_synchronous_consumer() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt
        .block_on(NotifierServer::bind(&local_config()))
        .unwrap();
    let addr = server.local_addr().unwrap();
    rt.spawn(server.serve());

    let (tx, mut rx) = inbound_port(PHONE_CALL_IN);
    let handle = ClientBridge::new(client_config(addr), tx).start();

    let value = rx.blocking_recv().expect("port closed before delivery");
    assert_eq!(value["name"], "Jonathan Linnestad");
    assert_eq!(value["company"], "Anleggsmannen");

    handle.close();
    assert_eq!(rx.blocking_recv(), None);
}
