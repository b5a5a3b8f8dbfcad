//! End-to-end tests of the control channel against a mock control plane.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use control_channel::net::{ConnectionState, Dialer};
use control_channel::{ClientError, ClientServer};

mod common;
use common::{AccessDeniedFault, Ping, Pong};

async fn start() -> common::MockControlPlane {
    common::start_control_plane().await
}

fn spawn_serve(client: &Arc<ClientServer>) -> tokio::task::JoinHandle<Result<(), ClientError>> {
    let client = Arc::clone(client);
    tokio::spawn(async move { client.serve().await })
}

/// Spawn `serve` and wait until it has dispatched a frame, so it owns the
/// reader and is blocked on the next read.
async fn serve_until_reading(
    client: &Arc<ClientServer>,
    control: &common::MockControlPlane,
) -> tokio::task::JoinHandle<Result<(), ClientError>> {
    let (ready_tx, mut ready_rx) = tokio::sync::mpsc::unbounded_channel();
    client.set_any_request_handler(move |_| {
        let _ = ready_tx.send(());
        async {}
    });
    let serve = spawn_serve(client);
    control.push(r#"{"type":"Ping","message":{"messageId":"ready"}}"#);
    tokio::time::timeout(Duration::from_secs(5), ready_rx.recv())
        .await
        .expect("serve did not dispatch")
        .expect("handler dropped");
    serve
}

async fn join(serve: tokio::task::JoinHandle<Result<(), ClientError>>) -> Result<(), ClientError> {
    tokio::time::timeout(Duration::from_secs(5), serve)
        .await
        .expect("serve did not return")
        .unwrap()
}

#[tokio::test]
async fn test_upgrade_request_is_signed() {
    let control = start().await;
    let dialer = Arc::new(common::PlainDialer::default());
    let client = common::client_with_dialer(control.addr, Arc::clone(&dialer) as Arc<dyn Dialer>);

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(*dialer.targets.lock().unwrap(), vec![control.addr.to_string()]);

    let headers = control.headers.await.unwrap();
    let authorization = headers["authorization"].to_str().unwrap();
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(authorization.contains("/us-west-2/ecs/aws4_request"));
    assert!(authorization.contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
    assert!(headers.contains_key("x-amz-date"));
    assert_eq!(headers["x-amz-security-token"], "session-token");
    assert_eq!(headers["host"], control.addr.to_string().as_str());
}

#[tokio::test]
async fn test_request_arrives_as_envelope() {
    let mut control = start().await;
    let client = common::client_for(control.addr);
    client.connect().await.unwrap();

    client
        .make_request(&Ping {
            message_id: "abc".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(
        control.next_inbound().await,
        serde_json::json!({"type": "Ping", "message": {"messageId": "abc"}})
    );
}

#[tokio::test]
async fn test_ping_pong() {
    let mut control = start().await;
    let client = Arc::new(common::client_for(control.addr));

    let sender = client.sender();
    client
        .add_request_handler(move |ping: Arc<Ping>| {
            let sender = sender.clone();
            async move {
                let pong = Pong {
                    message_id: ping.message_id.clone(),
                };
                sender.send(&pong).await.unwrap();
            }
        })
        .unwrap();

    client.connect().await.unwrap();
    let serve = spawn_serve(&client);

    control.push(r#"{"type":"Ping","message":{"messageId":"42"}}"#);
    assert_eq!(
        control.next_inbound().await,
        serde_json::json!({"type": "Pong", "message": {"messageId": "42"}})
    );

    drop(control.outbound);
    assert!(join(serve).await.is_ok());
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_ordered_dispatch_skips_bad_frames() {
    let control = start().await;
    let client = Arc::new(common::client_for(control.addr));
    let log = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&log);
    client.set_any_request_handler(move |message| {
        seen.lock().unwrap().push(format!("any:{}", message.type_name()));
        async {}
    });
    let seen = Arc::clone(&log);
    client
        .add_request_handler(move |ping: Arc<Ping>| {
            let seen = Arc::clone(&seen);
            async move {
                // A slow handler must still finish before the next frame is seen.
                tokio::time::sleep(Duration::from_millis(20)).await;
                seen.lock().unwrap().push(format!("ping:{}", ping.message_id));
            }
        })
        .unwrap();

    client.connect().await.unwrap();
    let serve = spawn_serve(&client);

    control.push(r#"{"type":"Ping","message":{"messageId":"1"}}"#);
    control.push(r#"{"type":"Pong","message":{"messageId":"2"}}"#);
    control.push("not json at all");
    control.push(r#"{"type":"Heartbeat","message":{}}"#);
    control.push(r#"{"type":"Ping","message":{"messageId":"3"}}"#);
    drop(control.outbound);

    assert!(join(serve).await.is_ok());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["any:Ping", "ping:1", "any:Pong", "any:Ping", "ping:3"]
    );
}

#[tokio::test]
async fn test_close_unblocks_serve() {
    let control = start().await;
    let client = Arc::new(common::client_for(control.addr));
    client.connect().await.unwrap();
    let serve = serve_until_reading(&client, &control).await;

    // The peer stays silent; only the local close can end the pending read.
    client.close().await.unwrap();

    assert!(join(serve).await.is_ok());
    assert_eq!(client.state(), ConnectionState::Closed);
    let err = client
        .make_request(&Ping {
            message_id: "late".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
    drop(control);
}

#[tokio::test]
async fn test_serve_after_close_is_not_connected() {
    let control = start().await;
    let client = common::client_for(control.addr);
    client.connect().await.unwrap();
    client.close().await.unwrap();

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(client.serve().await, Err(ClientError::NotConnected)));
    drop(control);
}

#[tokio::test]
async fn test_second_serve_is_rejected() {
    let control = start().await;
    let client = Arc::new(common::client_for(control.addr));
    client.connect().await.unwrap();
    let serve = serve_until_reading(&client, &control).await;

    assert!(matches!(client.serve().await, Err(ClientError::AlreadyServing)));

    client.close().await.unwrap();
    assert!(join(serve).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_senders_write_whole_frames() {
    let mut control = start().await;
    let client = Arc::new(common::client_for(control.addr));
    client.connect().await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let sender = client.sender();
        tasks.push(tokio::spawn(async move {
            let ping = Ping {
                message_id: format!("{i}-{}", "x".repeat(2048)),
            };
            sender.send(&ping).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut ids = Vec::new();
    for _ in 0..20 {
        let frame = control.next_inbound().await;
        assert_eq!(frame["type"], "Ping");
        ids.push(frame["message"]["messageId"].as_str().unwrap().to_string());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_access_denied_is_a_service_error() {
    let body = r#"{"type":"AccessDeniedException","message":{"message":"not authorized"}}"#;
    let addr = common::start_rejecting_server("403 Forbidden", body.to_string()).await;
    let client = common::client_for(addr);

    match client.connect().await {
        Err(ClientError::Service(err)) => {
            assert_eq!(err.type_name(), "AccessDeniedException");
            assert_eq!(err.message(), Some("not authorized"));
            assert_eq!(
                err.downcast_ref::<AccessDeniedFault>(),
                Some(&AccessDeniedFault {
                    message: "not authorized".to_string()
                })
            );
        }
        other => panic!("expected a service error, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Absent);
}

#[tokio::test]
async fn test_undecodable_rejection_keeps_body() {
    let addr = common::start_rejecting_server("500 Internal Server Error", "internal failure".to_string()).await;
    let client = common::client_for(addr);

    match client.connect().await {
        Err(ClientError::Handshake { status, body, .. }) => {
            assert_eq!(status, Some(500));
            assert!(body.contains("internal failure"));
        }
        other => panic!("expected a handshake error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refused_dial_is_returned() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = common::client_for(addr);
    assert!(matches!(client.connect().await, Err(ClientError::Dial(_))));
}
