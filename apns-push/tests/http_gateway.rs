//! End-to-end runs against a mocked HTTP gateway.

use apns_push::{HttpTransport, Message, Priority, Protocol, Push, PushConfig};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_OK: &str = "1e82db91c7ceddd72bf33d74ae052ac9c84a065b35148ac401388843106a7485";
const TOKEN_GONE: &str = "2e82db91c7ceddd72bf33d74ae052ac9c84a065b35148ac401388843106a7485";

async fn connected_engine(server: &MockServer, provider_token: Option<&str>) -> Push {
    let config = PushConfig {
        protocol: Protocol::Http,
        http_url_override: Some(server.uri()),
        provider_token: provider_token.map(str::to_string),
        write_interval_ms: 0,
        ..Default::default()
    };
    let transport = HttpTransport::from_config(&config).unwrap();
    let mut push = Push::new(config, Box::new(transport)).unwrap();
    push.connect().await.unwrap();
    push
}

#[tokio::test]
async fn test_unregistered_token_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/3/device/{TOKEN_OK}")))
        .and(header("apns-topic", "com.example.app"))
        .and(header("apns-priority", "10"))
        .and(header("authorization", "Bearer provider-token"))
        .and(body_string_contains(r#""alert":"Hello""#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/3/device/{TOKEN_GONE}")))
        .respond_with(ResponseTemplate::new(410).set_body_string(r#"{"reason":"Unregistered"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut push = connected_engine(&server, Some("provider-token")).await;
    let mut message = Message::for_recipient(TOKEN_OK)
        .unwrap()
        .with_text("Hello")
        .with_topic("com.example.app")
        .with_priority(Priority::Immediate);
    message.add_recipient(TOKEN_GONE).unwrap();
    assert_eq!(push.add(&message).unwrap(), vec![1, 2]);

    let report = push.send().await.unwrap();
    assert_eq!(report.runs, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);

    let errors = push.drain_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].recipient, TOKEN_GONE);
    let last = errors[0].last_error().unwrap();
    assert_eq!(last.status_code, 410);
    assert_eq!(last.status_text, r#"{"reason":"Unregistered"}"#);
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut push = connected_engine(&server, None).await;
    push.add(&Message::for_recipient(TOKEN_OK).unwrap().with_badge(1))
        .unwrap();

    let report = push.send().await.unwrap();
    assert_eq!(report.runs, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert!(push.drain_errors().is_empty());
}

#[tokio::test]
async fn test_retry_budget_applies_to_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut push = connected_engine(&server, None).await;
    push.add(&Message::for_recipient(TOKEN_OK).unwrap().with_text("Hi"))
        .unwrap();

    let report = push.send().await.unwrap();
    assert_eq!(report.runs, 4);
    assert_eq!(report.failed, 1);

    let errors = push.drain_errors();
    assert_eq!(errors[0].errors.len(), 3);
    assert!(
        errors[0]
            .errors
            .iter()
            .all(|e| e.status_text == "The server is shutting down and unavailable")
    );
}
