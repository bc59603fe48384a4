use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::Router;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tower::ServiceExt;

use agendai::config::AppConfig;
use agendai::db::{self, queries};
use agendai::handlers;
use agendai::models::Tenant;
use agendai::services::ai::{ChatCompletion, LlmProvider, PromptSegment};
use agendai::services::conversation::{self, ENGINE_DIALOGUE};
use agendai::services::session::InMemorySessionStore;
use agendai::state::AppState;

// ── Mock providers ──

#[derive(Default)]
struct MockLlm {
    calls: Arc<Mutex<Vec<Vec<PromptSegment>>>>,
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(&self, segments: &[PromptSegment]) -> anyhow::Result<ChatCompletion> {
        self.calls.lock().unwrap().push(segments.to_vec());
        Ok(ChatCompletion {
            text: "mock answer".to_string(),
            prompt_tokens: 10,
            completion_tokens: 5,
        })
    }

    fn label(&self) -> &str {
        "mock-model"
    }
}

struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn chat(&self, _segments: &[PromptSegment]) -> anyhow::Result<ChatCompletion> {
        anyhow::bail!("provider exploded")
    }

    fn label(&self) -> &str {
        "mock-model"
    }
}

struct SlowLlm;

#[async_trait]
impl LlmProvider for SlowLlm {
    async fn chat(&self, _segments: &[PromptSegment]) -> anyhow::Result<ChatCompletion> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(ChatCompletion::default())
    }

    fn label(&self) -> &str {
        "mock-model"
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        webhook_secret: String::new(),
        openai_api_key: String::new(),
        openai_model: "gpt-4o-mini".to_string(),
        llm_timeout: Duration::from_millis(200),
    }
}

fn test_state_with(llm: Box<dyn LlmProvider>) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    queries::upsert_tenant(&conn, &Tenant::new(1, "Acme Appliances")).unwrap();

    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        llm,
        sessions: Box::new(InMemorySessionStore::new()),
    })
}

async fn send(state: &Arc<AppState>, from: &str, body: &str) -> conversation::EngineReply {
    conversation::process_message(state, 1, from, body)
        .await
        .unwrap()
}

// ── Dialogue scenarios ──

#[tokio::test]
async fn full_booking_flow_end_to_end() {
    let state = test_state_with(Box::new(MockLlm::default()));

    let reply = send(&state, "+15551110000", "I'd like to schedule a technical visit").await;
    assert_eq!(reply.engine, ENGINE_DIALOGUE);
    assert!(reply.reply.contains("day and time"));

    // Relative phrasing keeps the slot in the future on any test date
    let reply = send(&state, "+15551110000", "tomorrow at 3pm").await;
    assert!(reply.reply.contains("Visit"));
    assert!(reply.reply.contains("at 15:00"));
    assert!(reply.reply.contains("Confirm?"));

    let reply = send(&state, "+15551110000", "yes").await;
    assert!(reply.reply.contains("all set"));

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings_by_tenant(&db, 1, Some("scheduled"), 10).unwrap()
    };
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].title, "Visit");
    assert_eq!(
        bookings[0].ends_at - bookings[0].starts_at,
        chrono::Duration::minutes(60)
    );

    // Session is gone: the same participant is back to plain chat
    let reply = send(&state, "+15551110000", "thanks!").await;
    assert_eq!(reply.engine, "mock-model");
}

#[tokio::test]
async fn conflicting_slot_is_rejected_for_second_participant() {
    let state = test_state_with(Box::new(MockLlm::default()));

    send(&state, "+15551110000", "book a visit tomorrow at 15h").await;
    let reply = send(&state, "+15551110000", "yes").await;
    assert!(reply.reply.contains("all set"));

    send(&state, "+15552220000", "book a meeting").await;
    let reply = send(&state, "+15552220000", "tomorrow at 15h").await;
    assert!(reply.reply.contains("already taken"));

    // Only the first booking exists; back-to-back still works
    let reply = send(&state, "+15552220000", "tomorrow at 16h").await;
    assert!(reply.reply.contains("Confirm?"));
    let reply = send(&state, "+15552220000", "yes").await;
    assert!(reply.reply.contains("all set"));

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings_by_tenant(&db, 1, Some("scheduled"), 10).unwrap()
    };
    assert_eq!(bookings.len(), 2);
}

#[tokio::test]
async fn any_available_time_gets_a_proposed_slot() {
    let state = test_state_with(Box::new(MockLlm::default()));

    send(&state, "+15551110000", "book a visit").await;
    let reply = send(&state, "+15551110000", "first available please").await;
    assert!(reply.reply.contains("Confirm?"));

    let reply = send(&state, "+15551110000", "yes").await;
    assert!(reply.reply.contains("all set"));
}

#[tokio::test]
async fn cancellation_discards_the_session() {
    let state = test_state_with(Box::new(MockLlm::default()));

    send(&state, "+15551110000", "schedule a consultation").await;
    let reply = send(&state, "+15551110000", "never mind, cancel that").await;
    assert!(reply.reply.contains("cancelled"));

    // Next message is ordinary chat again
    let reply = send(&state, "+15551110000", "how are you?").await;
    assert_eq!(reply.engine, "mock-model");

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings_by_tenant(&db, 1, None, 10).unwrap()
    };
    assert!(bookings.is_empty());
}

#[tokio::test]
async fn open_session_consumes_non_scheduling_messages() {
    let state = test_state_with(Box::new(MockLlm::default()));

    send(&state, "+15551110000", "book a visit").await;
    // No scheduling words, but the session is open so the dialogue answers
    let reply = send(&state, "+15551110000", "what do you mean?").await;
    assert_eq!(reply.engine, ENGINE_DIALOGUE);
}

// ── Fallback chat path ──

#[tokio::test]
async fn plain_chat_goes_to_the_provider_with_history() {
    let mock = MockLlm::default();
    let calls = mock.calls.clone();
    let state = test_state_with(Box::new(mock));

    let reply = send(&state, "+15551110000", "what are your prices?").await;
    assert_eq!(reply.reply, "mock answer");
    assert_eq!(reply.engine, "mock-model");
    assert!(reply.success);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    // System persona first, current message last
    assert!(calls[0][0].content.contains("virtual assistant of \"Acme Appliances\""));
    assert_eq!(calls[0].last().unwrap().content, "what are your prices?");
}

#[tokio::test]
async fn context_retention_off_sends_no_history() {
    let mock = MockLlm::default();
    let calls = mock.calls.clone();
    let state = test_state_with(Box::new(mock));
    {
        let db = state.db.lock().unwrap();
        let mut tenant = Tenant::new(1, "Acme Appliances");
        tenant.retain_context = false;
        queries::upsert_tenant(&db, &tenant).unwrap();
    }

    send(&state, "+15551110000", "first question").await;
    send(&state, "+15551110000", "second question").await;

    let calls = calls.lock().unwrap();
    // Both calls: just persona + current message
    assert_eq!(calls[1].len(), 2);
}

#[tokio::test]
async fn provider_failure_degrades_without_breaking() {
    let state = test_state_with(Box::new(FailingLlm));

    let reply = send(&state, "+15551110000", "hello there").await;
    assert!(!reply.success);
    assert!(reply.reply.contains("having trouble"));
}

#[tokio::test]
async fn provider_timeout_degrades_without_breaking() {
    let state = test_state_with(Box::new(SlowLlm));

    let reply = send(&state, "+15551110000", "hello there").await;
    assert!(!reply.success);
    assert!(reply.reply.contains("having trouble"));
}

#[tokio::test]
async fn provider_failure_does_not_touch_open_sessions() {
    let state = test_state_with(Box::new(FailingLlm));

    // Dialogue still works without any provider
    send(&state, "+15551110000", "book a visit tomorrow at 10h").await;
    let reply = send(&state, "+15551110000", "yes").await;
    assert!(reply.reply.contains("all set"));
}

#[tokio::test]
async fn unknown_tenant_is_an_error() {
    let state = test_state_with(Box::new(MockLlm::default()));
    let result = conversation::process_message(&state, 99, "+15551110000", "hi").await;
    assert!(result.is_err());
}

// ── Webhook ──

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/message", post(handlers::webhook::message_webhook))
        .with_state(state)
}

fn sign(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn webhook_replies_and_records_the_turn() {
    let state = test_state_with(Box::new(MockLlm::default()));
    let app = app(state.clone());

    let body = r#"{"tenant_id":1,"from":"+15551110000","body":"hello"}"#;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/message")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let turns = {
        let db = state.db.lock().unwrap();
        queries::list_turns_ordered(&db, 1, "+15551110000").unwrap()
    };
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_message, "hello");
    assert_eq!(turns[0].assistant_reply, "mock answer");
    assert!(turns[0].success);
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let mut state = test_state_with(Box::new(MockLlm::default()));
    Arc::get_mut(&mut state).unwrap().config.webhook_secret = "s3cret".to_string();
    let app = app(state);

    let body = r#"{"tenant_id":1,"from":"+15551110000","body":"hello"}"#;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/message")
                .header("content-type", "application/json")
                .header("x-gateway-signature", "bogus")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_accepts_valid_signature() {
    let mut state = test_state_with(Box::new(MockLlm::default()));
    Arc::get_mut(&mut state).unwrap().config.webhook_secret = "s3cret".to_string();
    let app = app(state);

    let body = r#"{"tenant_id":1,"from":"+15551110000","body":"hello"}"#;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/message")
                .header("content-type", "application/json")
                .header("x-gateway-signature", sign("s3cret", body))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
