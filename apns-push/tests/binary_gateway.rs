//! End-to-end runs against a fake binary gateway on a local TCP socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use apns_push::{Message, Protocol, Push, PushConfig, StreamingTransport, TcpConnector};
use apns_wire::{ERROR_RESPONSE_COMMAND, ErrorResponse, NotificationFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TOKEN: &str = "1e82db91c7ceddd72bf33d74ae052ac9c84a065b35148ac401388843106a7485";
const HEADER_SIZE: usize = 45;

#[derive(Default)]
struct GatewayState {
    accepted: Mutex<Vec<u32>>,
    /// Sequence id -> status to reject with, consumed on first sight.
    reject: Mutex<HashMap<u32, u8>>,
    connections: Mutex<usize>,
}

async fn start_gateway(state: Arc<GatewayState>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            *state.connections.lock().unwrap() += 1;
            tokio::spawn(handle_connection(socket, state.clone()));
        }
    });
    port
}

async fn handle_connection(mut socket: TcpStream, state: Arc<GatewayState>) {
    let mut failed = false;
    loop {
        let mut frame = vec![0u8; HEADER_SIZE];
        if socket.read_exact(&mut frame).await.is_err() {
            return;
        }
        let payload_len = u16::from_be_bytes([frame[43], frame[44]]) as usize;
        frame.resize(HEADER_SIZE + payload_len, 0);
        if socket.read_exact(&mut frame[HEADER_SIZE..]).await.is_err() {
            return;
        }
        let parsed = NotificationFrame::parse(&frame).unwrap();

        // After reporting an error the gateway ignores everything else on this connection.
        if failed {
            continue;
        }
        let status = state.reject.lock().unwrap().remove(&parsed.sequence_id);
        match status {
            Some(status) => {
                failed = true;
                let response = ErrorResponse {
                    command: ERROR_RESPONSE_COMMAND,
                    status,
                    sequence_id: parsed.sequence_id,
                };
                socket.write_all(&response.to_bytes()).await.unwrap();
            }
            None => state.accepted.lock().unwrap().push(parsed.sequence_id),
        }
    }
}

async fn connected_engine(port: u16) -> Push {
    let config = PushConfig {
        protocol: Protocol::Binary,
        gateway_override: Some(format!("127.0.0.1:{port}")),
        write_interval_ms: 0,
        socket_select_timeout_ms: 300,
        ..Default::default()
    };
    let transport = StreamingTransport::new(
        TcpConnector::from_config(&config).unwrap(),
        config.write_timeout(),
    );
    let mut push = Push::new(config, Box::new(transport)).unwrap();
    push.connect().await.unwrap();
    push
}

fn enqueue(push: &mut Push, count: usize) {
    for i in 0..count {
        let message = Message::for_recipient(TOKEN)
            .unwrap()
            .with_text(format!("Notification {i}"));
        push.add(&message).unwrap();
    }
}

#[tokio::test]
async fn test_all_frames_accepted() {
    let state = Arc::new(GatewayState::default());
    let port = start_gateway(state.clone()).await;
    let mut push = connected_engine(port).await;
    enqueue(&mut push, 3);

    let report = push.send().await.unwrap();
    assert_eq!(report.runs, 1);
    assert_eq!(report.delivered, 3);
    assert_eq!(*state.accepted.lock().unwrap(), vec![1, 2, 3]);
    assert!(push.drain_errors().is_empty());

    push.disconnect().await;
    assert!(!push.is_connected());
}

#[tokio::test]
async fn test_transient_rejection_is_resent() {
    let state = Arc::new(GatewayState::default());
    state.reject.lock().unwrap().insert(2, 1);
    let port = start_gateway(state.clone()).await;
    let mut push = connected_engine(port).await;
    enqueue(&mut push, 3);

    let report = push.send().await.unwrap();
    assert_eq!(report.runs, 2);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(*state.accepted.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(*state.connections.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_fatal_rejection_lands_in_errors() {
    let state = Arc::new(GatewayState::default());
    state.reject.lock().unwrap().insert(2, 8);
    let port = start_gateway(state.clone()).await;
    let mut push = connected_engine(port).await;
    enqueue(&mut push, 3);

    let report = push.send().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(*state.accepted.lock().unwrap(), vec![1, 3]);

    let errors = push.drain_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].sequence_id, 2);
    assert_eq!(errors[0].recipient, TOKEN);
    let last = errors[0].last_error().unwrap();
    assert_eq!(last.status_code, 8);
    assert_eq!(last.status_text, "Invalid token");
}
