use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use finpush_common::types::{ChannelConfig, ChannelType, NotificationMessage, Section, Severity};
use serde_json::{Value, json};
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::channels::build_adapter;
use crate::dispatcher::{AttemptOutcome, DispatchOptions, Dispatcher, Overall};
use crate::error::NotifyError;
use crate::render::{render_markdown, truncate_chars, truncate_utf8};
use crate::signer;
use crate::{ChannelAdapter, SendReceipt};

fn sample_message() -> NotificationMessage {
    NotificationMessage {
        title: "Daily Analysis Report".to_string(),
        sections: vec![Section::Text {
            content: "All positions within thresholds.".to_string(),
        }],
        severity: Severity::Info,
        idempotency_key: "daily-2026-08-06".to_string(),
    }
}

fn channel_config(id: &str, channel_type: ChannelType, endpoint: &str) -> ChannelConfig {
    ChannelConfig {
        id: id.to_string(),
        channel_type,
        endpoint: endpoint.to_string(),
        credentials: HashMap::new(),
        recipients: Vec::new(),
        options: HashMap::new(),
        enabled: true,
    }
}

// ── Signer ──

#[test]
fn signer_matches_reference_fixture() {
    let signature = signer::sign("Gf55G2oRdxXqMtULRAGBY", 1_700_000_000).unwrap();
    assert_eq!(signature.timestamp, 1_700_000_000);
    assert_eq!(signature.sign, "Lcu4B+h6DUSkGsrS7Io7TEtCJJM916NzSwKyh6riZF4=");
}

#[test]
fn signer_is_deterministic() {
    let first = signer::sign("test-secret", 1_700_000_000).unwrap();
    let second = signer::sign("test-secret", 1_700_000_000).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.sign, "mbm4Y4oluIPQ00qlBIhX8vAZ0EKv3nw0LuTb91jPL84=");
}

#[test]
fn signer_output_depends_on_timestamp() {
    let first = signer::sign("Gf55G2oRdxXqMtULRAGBY", 1_700_000_000).unwrap();
    let second = signer::sign("Gf55G2oRdxXqMtULRAGBY", 1_700_000_001).unwrap();
    assert_ne!(first.sign, second.sign);
    assert_eq!(second.sign, "jfZWb6olYIs/xQBCpigmi5j0mJoTVQQQgfuriae/TOc=");
}

#[test]
fn signer_rejects_empty_secret() {
    let err = signer::sign("", 1_700_000_000).unwrap_err();
    assert!(matches!(err, NotifyError::InvalidConfig(_)));
    assert!(!err.is_retryable());
}

// ── Rendering ──

#[test]
fn truncate_utf8_never_splits_multibyte_chars() {
    let s = "报告".repeat(10);
    let truncated = truncate_utf8(&s, 10);
    assert!(truncated.ends_with("... [truncated]"));
    // 10 bytes falls inside the fourth 3-byte char; boundary snaps back to 9.
    assert!(truncated.starts_with("报告报"));
}

#[test]
fn truncate_utf8_leaves_short_content_alone() {
    assert_eq!(truncate_utf8("hello", 100), "hello");
}

#[test]
fn truncate_chars_bounds_total_length() {
    let s = "x".repeat(5000);
    let truncated = truncate_chars(&s, 4096);
    assert!(truncated.chars().count() <= 4096);
    assert!(truncated.ends_with("... [truncated]"));
}

#[test]
fn render_markdown_formats_tables_and_links() {
    let message = NotificationMessage {
        title: "t".to_string(),
        sections: vec![
            Section::Text {
                content: "body".to_string(),
            },
            Section::Table {
                rows: vec![("Report date".to_string(), "2026-08-06".to_string())],
            },
            Section::Links {
                links: vec![finpush_common::types::Link {
                    label: "Dashboard".to_string(),
                    url: "https://example.com/d".to_string(),
                }],
            },
        ],
        severity: Severity::Info,
        idempotency_key: "k".to_string(),
    };
    let rendered = render_markdown(&message);
    assert!(rendered.contains("body"));
    assert!(rendered.contains("**Report date**: 2026-08-06"));
    assert!(rendered.contains("[Dashboard](https://example.com/d)"));
}

#[test]
fn render_markdown_of_empty_body_is_empty_not_missing() {
    let mut message = sample_message();
    message.sections.clear();
    assert_eq!(render_markdown(&message), "");
}

// ── Scripted adapters for dispatcher tests ──

#[derive(Debug)]
struct ScriptedAdapter {
    id: String,
    script: Mutex<VecDeque<Result<SendReceipt, NotifyError>>>,
}

impl ScriptedAdapter {
    fn boxed(id: &str, script: Vec<Result<SendReceipt, NotifyError>>) -> Box<dyn ChannelAdapter> {
        Box::new(Self {
            id: id.to_string(),
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedAdapter {
    async fn send(&self, _message: &NotificationMessage) -> Result<SendReceipt, NotifyError> {
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(SendReceipt::default()))
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    fn channel_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
struct HangingAdapter {
    id: String,
}

#[async_trait]
impl ChannelAdapter for HangingAdapter {
    async fn send(&self, _message: &NotificationMessage) -> Result<SendReceipt, NotifyError> {
        futures::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    fn channel_id(&self) -> &str {
        &self.id
    }
}

fn retryable() -> Result<SendReceipt, NotifyError> {
    Err(NotifyError::Status {
        status: 503,
        body: "upstream unavailable".to_string(),
    })
}

fn fatal() -> Result<SendReceipt, NotifyError> {
    Err(NotifyError::Api {
        service: "feishu",
        code: 19021,
        message: "sign match fail".to_string(),
    })
}

// ── Dispatcher ──

#[tokio::test(start_paused = true)]
async fn fanout_aggregates_mixed_outcomes_as_partial_failure() {
    let dispatcher = Dispatcher::from_adapters(
        vec![
            ScriptedAdapter::boxed("a", vec![Ok(SendReceipt::default())]),
            ScriptedAdapter::boxed("b", vec![fatal()]),
            ScriptedAdapter::boxed(
                "c",
                vec![retryable(), retryable(), Ok(SendReceipt::default())],
            ),
        ],
        DispatchOptions::default(),
    );

    let result = dispatcher.dispatch(&sample_message(), None).await;

    assert_eq!(result.overall, Overall::PartialFailure);
    assert_eq!(result.succeeded_count(), 2);
    assert_eq!(result.failed_count(), 1);

    let a = &result.channels["a"];
    assert_eq!(a.outcome, AttemptOutcome::Success);
    assert_eq!(a.attempts.len(), 1);

    let b = &result.channels["b"];
    assert_eq!(b.outcome, AttemptOutcome::FatalFailure);
    assert_eq!(b.attempts.len(), 1, "fatal failures must not be retried");
    assert!(
        b.attempts[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("sign match fail")
    );

    let c = &result.channels["c"];
    assert_eq!(c.outcome, AttemptOutcome::Success);
    assert_eq!(c.attempts.len(), 3);
    assert_eq!(c.attempts[0].outcome, AttemptOutcome::RetryableFailure);
    assert_eq!(c.attempts[1].outcome, AttemptOutcome::RetryableFailure);
    assert_eq!(c.attempts[2].outcome, AttemptOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn retry_backoff_doubles_between_attempts() {
    let dispatcher = Dispatcher::from_adapters(
        vec![ScriptedAdapter::boxed(
            "c",
            vec![retryable(), retryable(), Ok(SendReceipt::default())],
        )],
        DispatchOptions::default(),
    );

    let start = Instant::now();
    let result = dispatcher.dispatch(&sample_message(), None).await;
    let elapsed = start.elapsed();

    assert_eq!(result.overall, Overall::AllSucceeded);
    // 2 s then 4 s of backoff, ±20%.
    assert!(
        elapsed >= Duration::from_millis(4800) && elapsed <= Duration::from_millis(7200),
        "elapsed = {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limit_hint_overrides_computed_backoff() {
    let dispatcher = Dispatcher::from_adapters(
        vec![ScriptedAdapter::boxed(
            "c",
            vec![
                Err(NotifyError::RateLimited {
                    service: "telegram",
                    retry_after: Some(Duration::from_secs(1)),
                }),
                Ok(SendReceipt::default()),
            ],
        )],
        DispatchOptions::default(),
    );

    let start = Instant::now();
    let result = dispatcher.dispatch(&sample_message(), None).await;
    let elapsed = start.elapsed();

    assert_eq!(result.overall, Overall::AllSucceeded);
    assert!(
        elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2),
        "elapsed = {elapsed:?}"
    );
}

#[tokio::test]
async fn all_channels_disabled_yields_no_channels_outcome() {
    let mut config = channel_config("w", ChannelType::Webhook, "https://hooks.example.com/x");
    config.enabled = false;

    let dispatcher = Dispatcher::from_configs(&[config], DispatchOptions::default());
    assert_eq!(dispatcher.channel_count(), 0);

    let result = dispatcher.dispatch(&sample_message(), None).await;
    assert_eq!(result.overall, Overall::NoChannels);
    assert!(result.channels.is_empty());
}

#[tokio::test]
async fn invalid_channel_config_becomes_fatal_report() {
    // Telegram without a token cannot build an adapter.
    let mut bad = channel_config("tg", ChannelType::Telegram, "https://api.telegram.org");
    bad.recipients = vec!["42".to_string()];

    let dispatcher = Dispatcher::from_configs(&[bad], DispatchOptions::default());
    let result = dispatcher.dispatch(&sample_message(), None).await;

    assert_eq!(result.overall, Overall::AllFailed);
    let report = &result.channels["tg"];
    assert_eq!(report.outcome, AttemptOutcome::FatalFailure);
    assert_eq!(report.attempts.len(), 1);
    assert!(
        report.attempts[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("token")
    );
}

#[tokio::test]
async fn invalid_channel_does_not_block_healthy_ones() {
    let mut bad = channel_config("tg", ChannelType::Telegram, "https://api.telegram.org");
    bad.recipients = vec!["42".to_string()];
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .mount(&server)
        .await;
    let good = channel_config("hook", ChannelType::Webhook, &server.uri());

    let dispatcher = Dispatcher::from_configs(&[bad, good], DispatchOptions::default());
    let result = dispatcher.dispatch(&sample_message(), None).await;

    assert_eq!(result.overall, Overall::PartialFailure);
    assert!(result.channels["hook"].succeeded());
    assert!(!result.channels["tg"].succeeded());
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_records_retryable_failure_without_sending() {
    let dispatcher = Dispatcher::from_adapters(
        vec![ScriptedAdapter::boxed("a", vec![Ok(SendReceipt::default())])],
        DispatchOptions::default(),
    );

    let result = dispatcher
        .dispatch(&sample_message(), Some(Instant::now()))
        .await;

    assert_eq!(result.overall, Overall::AllFailed);
    let report = &result.channels["a"];
    assert_eq!(report.outcome, AttemptOutcome::RetryableFailure);
    assert_eq!(report.attempts.len(), 1);
    assert!(
        report.attempts[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("deadline")
    );
}

#[tokio::test(start_paused = true)]
async fn attempt_timeout_counts_as_retryable_failure() {
    let adapters: Vec<Box<dyn ChannelAdapter>> = vec![Box::new(HangingAdapter {
        id: "slow".to_string(),
    })];
    let dispatcher = Dispatcher::from_adapters(adapters, DispatchOptions::default());

    let result = dispatcher.dispatch(&sample_message(), None).await;

    assert_eq!(result.overall, Overall::AllFailed);
    let report = &result.channels["slow"];
    assert_eq!(report.attempts.len(), 3);
    for attempt in &report.attempts {
        assert_eq!(attempt.outcome, AttemptOutcome::RetryableFailure);
        assert!(attempt.error_detail.as_deref().unwrap().contains("timed out"));
    }
}

// ── Feishu channel ──

fn feishu_config(endpoint: &str, secret: Option<&str>) -> ChannelConfig {
    let mut config = channel_config("feishu-main", ChannelType::Feishu, endpoint);
    if let Some(secret) = secret {
        config
            .credentials
            .insert("secret".to_string(), secret.to_string());
    }
    config
}

#[tokio::test]
async fn feishu_sends_signed_card_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "success" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = feishu_config(&format!("{}/hook", server.uri()), Some("test-secret"));
    let adapter = build_adapter(&config).unwrap();
    let receipt = adapter.send(&sample_message()).await.unwrap();
    assert_eq!(receipt.http_status, Some(200));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["msg_type"], "interactive");
    assert_eq!(body["card"]["header"]["template"], "blue");
    assert_eq!(
        body["card"]["header"]["title"]["content"],
        "Daily Analysis Report"
    );

    // The transmitted signature must match a recomputation for the
    // transmitted timestamp.
    let timestamp = body["timestamp"].as_i64().expect("integer timestamp");
    let expected = signer::sign("test-secret", timestamp).unwrap();
    assert_eq!(body["sign"], json!(expected.sign));
}

#[tokio::test]
async fn feishu_without_secret_omits_signature_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .mount(&server)
        .await;

    let config = feishu_config(&server.uri(), None);
    let adapter = build_adapter(&config).unwrap();
    adapter.send(&sample_message()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("sign").is_none());
    assert!(body.get("timestamp").is_none());
}

#[tokio::test]
async fn feishu_signature_rejection_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 19021, "msg": "sign match fail" })),
        )
        .mount(&server)
        .await;

    let config = feishu_config(&server.uri(), Some("wrong-secret"));
    let adapter = build_adapter(&config).unwrap();
    let err = adapter.send(&sample_message()).await.unwrap_err();

    assert!(!err.is_retryable(), "a bad secret will not become good");
    assert!(err.to_string().contains("sign match fail"));
}

#[tokio::test]
async fn feishu_accepts_legacy_status_code_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "StatusCode": 0, "StatusMessage": "success" })),
        )
        .mount(&server)
        .await;

    let config = feishu_config(&server.uri(), None);
    let adapter = build_adapter(&config).unwrap();
    assert!(adapter.send(&sample_message()).await.is_ok());
}

#[tokio::test]
async fn feishu_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let config = feishu_config(&server.uri(), None);
    let adapter = build_adapter(&config).unwrap();
    let err = adapter.send(&sample_message()).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.http_status(), Some(502));
}

#[test]
fn feishu_rejects_empty_secret_credential() {
    let config = feishu_config("https://open.feishu.cn/hook/x", Some(""));
    let err = build_adapter(&config).unwrap_err();
    assert!(matches!(err, NotifyError::InvalidConfig(_)));
}

// ── Plain webhook channel ──

#[tokio::test]
async fn webhook_accepts_codeless_success_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let config = channel_config("hook", ChannelType::Webhook, &server.uri());
    let adapter = build_adapter(&config).unwrap();
    let receipt = adapter.send(&sample_message()).await.unwrap();
    assert_eq!(receipt.http_status, Some(204));
}

#[tokio::test]
async fn webhook_embedded_error_code_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 9499, "msg": "bad card" })),
        )
        .mount(&server)
        .await;

    let config = channel_config("hook", ChannelType::Webhook, &server.uri());
    let adapter = build_adapter(&config).unwrap();
    let err = adapter.send(&sample_message()).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("bad card"));
}

#[tokio::test]
async fn webhook_service_unavailable_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = channel_config("hook", ChannelType::Webhook, &server.uri());
    let adapter = build_adapter(&config).unwrap();
    let err = adapter.send(&sample_message()).await.unwrap_err();
    assert!(err.is_retryable());
}

// ── Telegram channel ──

fn telegram_config(endpoint: &str) -> ChannelConfig {
    let mut config = channel_config("tg", ChannelType::Telegram, endpoint);
    config
        .credentials
        .insert("token".to_string(), "123:abc".to_string());
    config.recipients = vec!["42".to_string()];
    config
}

#[tokio::test]
async fn telegram_posts_to_token_scoped_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true, "result": { "message_id": 7 } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let adapter = build_adapter(&telegram_config(&server.uri())).unwrap();
    adapter.send(&sample_message()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["chat_id"], "42");
    assert!(
        body["text"]
            .as_str()
            .unwrap()
            .starts_with("Daily Analysis Report")
    );
}

#[tokio::test]
async fn telegram_unauthorized_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "ok": false, "description": "Unauthorized" })),
        )
        .mount(&server)
        .await;

    let adapter = build_adapter(&telegram_config(&server.uri())).unwrap();
    let err = adapter.send(&sample_message()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Auth { .. }));
    assert!(!err.is_retryable());
    assert_eq!(err.http_status(), Some(401));
}

#[tokio::test]
async fn telegram_rate_limit_carries_backoff_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "parameters": { "retry_after": 7 }
        })))
        .mount(&server)
        .await;

    let adapter = build_adapter(&telegram_config(&server.uri())).unwrap();
    let err = adapter.send(&sample_message()).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.backoff_hint(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn telegram_api_rejection_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let adapter = build_adapter(&telegram_config(&server.uri())).unwrap();
    let err = adapter.send(&sample_message()).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("chat not found"));
}

#[test]
fn telegram_requires_token_and_recipients() {
    let mut no_token = channel_config("tg", ChannelType::Telegram, "https://api.telegram.org");
    no_token.recipients = vec!["42".to_string()];
    assert!(build_adapter(&no_token).is_err());

    let mut no_chats = channel_config("tg", ChannelType::Telegram, "https://api.telegram.org");
    no_chats
        .credentials
        .insert("token".to_string(), "123:abc".to_string());
    assert!(build_adapter(&no_chats).is_err());
}

// ── Email channel ──

#[test]
fn email_config_requires_from_and_recipients() {
    let mut config = channel_config("mail", ChannelType::Email, "smtp://smtp.example.com:587");
    config.recipients = vec!["ops@example.com".to_string()];

    let err = build_adapter(&config).unwrap_err();
    assert!(err.to_string().contains("from"));

    config
        .options
        .insert("from".to_string(), "finpush <noreply@example.com>".to_string());
    assert!(build_adapter(&config).is_ok());

    config.recipients.clear();
    assert!(build_adapter(&config).is_err());
}

#[test]
fn email_config_rejects_invalid_addresses() {
    let mut config = channel_config("mail", ChannelType::Email, "smtp://smtp.example.com");
    config
        .options
        .insert("from".to_string(), "noreply@example.com".to_string());
    config.recipients = vec!["not an address".to_string()];

    let err = build_adapter(&config).unwrap_err();
    assert!(matches!(err, NotifyError::InvalidConfig(_)));
}
