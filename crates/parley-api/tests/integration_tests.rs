//! Integration tests for the chatbot API: chat, history, CSRF, and the
//! error taxonomy, driven through the real router with an in-memory
//! database and the mock completion provider.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use parley_api::create_router;
use parley_api::state::{ApiConfig, AppState, AppStateInner, Environment};
use parley_api::token::create_auth_token;
use parley_db::Database;
use parley_llm::mock::MockProvider;
use parley_llm::{ChatMessage, Completion, CompletionProvider, ExtractedEntity, LlmError};

// =============================================================================
// Helpers
// =============================================================================

const RECRUITER_ID: &str = "7c06ad69-1111-2222-3333-444455556666";

fn make_state(environment: Environment) -> AppState {
    make_state_with(environment, Arc::new(MockProvider))
}

fn make_state_with(environment: Environment, llm: Arc<dyn CompletionProvider>) -> AppState {
    let db = Database::in_memory().unwrap();
    db.upsert_recruiter(
        RECRUITER_ID,
        "jane@acme.test",
        "Jane",
        Some("Acme"),
        "2026-01-01T00:00:00Z",
    )
    .unwrap();

    Arc::new(AppStateInner {
        db,
        llm,
        config: ApiConfig {
            environment,
            ..ApiConfig::default()
        },
    })
}

/// Provider that records every completion context and returns canned
/// results, for asserting what the handler actually sends upstream.
#[derive(Default)]
struct ScriptedProvider {
    seen_contexts: StdMutex<Vec<Vec<ChatMessage>>>,
    entities: Vec<ExtractedEntity>,
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, LlmError> {
        self.seen_contexts.lock().unwrap().push(messages.to_vec());
        Ok(Completion { content: "scripted reply".into(), total_tokens: 7 })
    }

    async fn classify_resume_intent(&self, _message: &str) -> Result<bool, LlmError> {
        Ok(false)
    }

    async fn extract_entities(&self, _message: &str) -> Result<Vec<ExtractedEntity>, LlmError> {
        Ok(self.entities.clone())
    }
}

fn make_app(state: &AppState) -> Router {
    create_router(state.clone())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send_chat(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app.clone().oneshot(post_json("/api/chatbot/chat", body)).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn get_history(app: &Router, query: &str) -> (StatusCode, Value) {
    let request = Request::get(format!("/api/chatbot/history?{}", query))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

// =============================================================================
// Chat endpoint
// =============================================================================

#[tokio::test]
async fn chat_missing_recruiter_id_is_400() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (status, body) = send_chat(&app, json!({"message": "hi"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_fields");

    let (status, _) = send_chat(&app, json!({"recruiterId": RECRUITER_ID})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Blank strings count as missing.
    let (status, _) =
        send_chat(&app, json!({"message": "   ", "recruiterId": RECRUITER_ID})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_unknown_recruiter_is_404() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (status, body) = send_chat(
        &app,
        json!({"message": "hi", "recruiterId": Uuid::new_v4().to_string()}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn first_message_mints_conversation_and_persists_user_row() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let text = "Hi, I'd like to know about Dean's React experience";
    let (status, body) =
        send_chat(&app, json!({"message": text, "recruiterId": RECRUITER_ID})).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert_eq!(body["resumeRequested"], false);

    let conversation_id: Uuid = body["conversationId"].as_str().unwrap().parse().unwrap();

    // The user message was persisted verbatim, oldest-first.
    let rows = state
        .db
        .get_messages_oldest_first(&conversation_id.to_string(), 10)
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].role, "user");
    assert_eq!(rows[0].content, text);
    assert_eq!(rows[1].role, "assistant");

    // Conversation metadata advanced past the newest message.
    let convo = state.db.get_conversation(&conversation_id.to_string()).unwrap().unwrap();
    assert!(convo.last_message_at >= rows[1].created_at);
    assert!(convo.total_tokens > 0);
    assert_eq!(body["metadata"]["totalTokens"].as_i64().unwrap(), convo.total_tokens);
}

#[tokio::test]
async fn conversation_id_is_stable_across_calls() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (_, first) =
        send_chat(&app, json!({"message": "hello", "recruiterId": RECRUITER_ID})).await;
    let conversation_id = first["conversationId"].as_str().unwrap().to_string();

    let (status, second) = send_chat(
        &app,
        json!({"message": "more", "recruiterId": RECRUITER_ID, "conversationId": conversation_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["conversationId"].as_str().unwrap(), conversation_id);

    let rows = state.db.get_messages_oldest_first(&conversation_id, 10).unwrap();
    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn resume_request_sets_flag_and_upserts_job_description() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (status, body) = send_chat(
        &app,
        json!({"message": "Great, can you send me a resume?", "recruiterId": RECRUITER_ID}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resumeRequested"], true);

    let jd = state.db.get_job_description(RECRUITER_ID).unwrap().unwrap();
    assert!(jd.resume_requested);
    assert!(!jd.resume_sent);
}

#[tokio::test]
async fn guest_chat_gets_a_reply_without_persisting() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (status, body) = send_chat(
        &app,
        json!({"message": "demo question", "recruiterId": "guest-1700000000000"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body["message"].as_str().unwrap().is_empty());

    // Nothing reached the database.
    let conversation_id = body["conversationId"].as_str().unwrap();
    assert!(state.db.get_conversation(conversation_id).unwrap().is_none());
}

#[tokio::test]
async fn conversation_owned_by_other_recruiter_is_403() {
    let state = make_state(Environment::Development);
    state
        .db
        .upsert_recruiter(
            "99999999-0000-0000-0000-000000000000",
            "rival@corp.test",
            "Rival",
            None,
            "2026-01-01T00:00:00Z",
        )
        .unwrap();
    let app = make_app(&state);

    let (_, first) =
        send_chat(&app, json!({"message": "hello", "recruiterId": RECRUITER_ID})).await;
    let conversation_id = first["conversationId"].as_str().unwrap();

    let (status, body) = send_chat(
        &app,
        json!({
            "message": "stealing this thread",
            "recruiterId": "99999999-0000-0000-0000-000000000000",
            "conversationId": conversation_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn long_conversation_context_keeps_latest_turns() {
    let provider = Arc::new(ScriptedProvider::default());
    let state = make_state_with(Environment::Development, provider.clone());
    let app = make_app(&state);

    // Seed a thread well past the context cap.
    let cid = Uuid::new_v4();
    state
        .db
        .create_conversation(&cid.to_string(), Some(RECRUITER_ID), "seeded", "2026-01-01T00:00:00Z")
        .unwrap();
    for i in 0..60 {
        state
            .db
            .insert_message(
                &format!("m{:03}", i),
                &cid.to_string(),
                if i % 2 == 0 { "user" } else { "assistant" },
                &format!("prior msg {:02}", i),
                1,
                &format!("2026-01-01T00:00:{:02}Z", i),
            )
            .unwrap();
    }

    let (status, _) = send_chat(
        &app,
        json!({"message": "and one more", "recruiterId": RECRUITER_ID, "conversationId": cid}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let contexts = provider.seen_contexts.lock().unwrap();
    assert_eq!(contexts.len(), 1);
    let context = &contexts[0];

    // System prompt, the newest 50 prior rows, then the incoming message.
    assert_eq!(context.len(), 52);
    assert_eq!(context[0].role, "system");
    assert_eq!(context[context.len() - 1].content, "and one more");
    assert!(context.iter().any(|m| m.content == "prior msg 59"));
    assert!(context.iter().any(|m| m.content == "prior msg 10"));
    assert!(!context.iter().any(|m| m.content == "prior msg 09"));
}

#[tokio::test]
async fn extracted_entities_land_normalized_on_the_user_row() {
    let provider = Arc::new(ScriptedProvider {
        entities: vec![
            ExtractedEntity {
                entity_type: "company".into(),
                value: "Acme Corp".into(),
                confidence: 1.7,
            },
            ExtractedEntity {
                entity_type: "mystery".into(),
                value: "blob".into(),
                confidence: 0.4,
            },
        ],
        ..ScriptedProvider::default()
    });
    let state = make_state_with(Environment::Development, provider);
    let app = make_app(&state);

    let (status, body) = send_chat(
        &app,
        json!({"message": "I'm hiring at Acme Corp", "recruiterId": RECRUITER_ID}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let cid = body["conversationId"].as_str().unwrap().to_string();
    let rows = state.db.get_messages_oldest_first(&cid, 10).unwrap();
    let user_message_id = rows[0].id.clone();

    // Extraction runs on a detached task; wait for its rows to appear.
    let mut entities = Vec::new();
    for _ in 0..50 {
        entities = state.db.get_entities_for_message(&user_message_id).unwrap();
        if !entities.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(entities.len(), 2);
    let company = entities.iter().find(|e| e.value == "Acme Corp").unwrap();
    assert_eq!(company.entity_type, "company");
    assert_eq!(company.confidence, 1.0);
    assert_eq!(company.conversation_id, cid);
    assert_eq!(company.message_id, user_message_id);

    // Unknown types collapse to the catch-all bucket.
    let other = entities.iter().find(|e| e.value == "blob").unwrap();
    assert_eq!(other.entity_type, "other");
    assert_eq!(other.confidence, 0.4);
}

// =============================================================================
// Auth token
// =============================================================================

#[tokio::test]
async fn invalid_auth_token_is_401() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (status, body) = send_chat(
        &app,
        json!({"message": "hi", "recruiterId": RECRUITER_ID, "authToken": "garbage"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_token");
}

#[tokio::test]
async fn valid_auth_token_is_accepted() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let token = create_auth_token(
        &state.config.jwt_secret,
        RECRUITER_ID.parse().unwrap(),
        "jane@acme.test",
    )
    .unwrap();

    let (status, _) = send_chat(
        &app,
        json!({"message": "hi", "recruiterId": RECRUITER_ID, "authToken": token}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// CSRF
// =============================================================================

#[tokio::test]
async fn production_post_without_csrf_is_403() {
    let state = make_state(Environment::Production);
    let app = make_app(&state);

    let (status, body) =
        send_chat(&app, json!({"message": "hi", "recruiterId": RECRUITER_ID})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "csrf");
}

#[tokio::test]
async fn production_post_with_mismatched_csrf_is_403() {
    let state = make_state(Environment::Production);
    let app = make_app(&state);

    let request = Request::post("/api/chatbot/chat")
        .header("content-type", "application/json")
        .header("cookie", "csrf_token=aaa")
        .header("x-csrf-token", "bbb")
        .body(Body::from(
            json!({"message": "hi", "recruiterId": RECRUITER_ID}).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn production_post_with_matching_csrf_passes() {
    let state = make_state(Environment::Production);
    let app = make_app(&state);

    let request = Request::post("/api/chatbot/chat")
        .header("content-type", "application/json")
        .header("cookie", "csrf_token=tok123")
        .header("x-csrf-token", "tok123")
        .body(Body::from(
            json!({"message": "hi", "recruiterId": RECRUITER_ID}).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn development_skips_csrf_and_get_is_exempt_in_production() {
    let dev_state = make_state(Environment::Development);
    let (status, _) = send_chat(
        &make_app(&dev_state),
        json!({"message": "hi", "recruiterId": RECRUITER_ID}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let prod_state = make_state(Environment::Production);
    let (status, _) = get_history(
        &make_app(&prod_state),
        &format!("recruiterId={}", RECRUITER_ID),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn csrf_endpoint_sets_cookie_matching_token() {
    let state = make_state(Environment::Production);
    let app = make_app(&state);

    let response = app
        .oneshot(Request::get("/api/chatbot/csrf").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    let token = body["token"].as_str().unwrap();
    assert!(cookie.starts_with(&format!("csrf_token={}", token)));
}

// =============================================================================
// History endpoint
// =============================================================================

#[tokio::test]
async fn history_missing_recruiter_id_is_400() {
    let state = make_state(Environment::Development);
    let (status, body) = get_history(&make_app(&state), "pageSize=5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_fields");
}

#[tokio::test]
async fn history_with_no_conversations_is_empty_not_an_error() {
    let state = make_state(Environment::Development);
    let (status, body) = get_history(
        &make_app(&state),
        &format!("recruiterId={}", RECRUITER_ID),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversationId"], Value::Null);
    assert_eq!(body["messages"].as_array().unwrap().len(), 0);
    assert_eq!(body["hasMoreMessages"], false);
}

#[tokio::test]
async fn history_returns_ascending_order_with_summary() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (_, first) =
        send_chat(&app, json!({"message": "one", "recruiterId": RECRUITER_ID})).await;
    let cid = first["conversationId"].as_str().unwrap().to_string();
    for text in ["two", "three"] {
        send_chat(
            &app,
            json!({"message": text, "recruiterId": RECRUITER_ID, "conversationId": cid}),
        )
        .await;
    }

    let (status, body) = get_history(&app, &format!("recruiterId={}", RECRUITER_ID)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversationId"].as_str().unwrap(), cid);

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 6);
    let timestamps: Vec<&str> = messages
        .iter()
        .map(|m| m["created_at"].as_str().unwrap())
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);

    assert_eq!(body["conversation"]["total_messages"].as_i64().unwrap(), 6);
}

#[tokio::test]
async fn history_pagination_pages_backward_and_is_idempotent() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (_, first) =
        send_chat(&app, json!({"message": "m0", "recruiterId": RECRUITER_ID})).await;
    let cid = first["conversationId"].as_str().unwrap().to_string();
    for i in 1..5 {
        send_chat(
            &app,
            json!({"message": format!("m{}", i), "recruiterId": RECRUITER_ID, "conversationId": cid}),
        )
        .await;
    }
    // 10 messages total (5 user + 5 assistant).

    // Initial page of 4: the oldest 4, with more remaining.
    let (_, page) = get_history(
        &app,
        &format!("recruiterId={}&conversationId={}&pageSize=4", RECRUITER_ID, cid),
    )
    .await;
    assert_eq!(page["messages"].as_array().unwrap().len(), 4);
    assert_eq!(page["hasMoreMessages"], true);

    // Page backward from the 9th message; same cursor twice gives the
    // same page.
    let (_, full) = get_history(
        &app,
        &format!("recruiterId={}&conversationId={}&pageSize=20", RECRUITER_ID, cid),
    )
    .await;
    let all = full["messages"].as_array().unwrap();
    assert_eq!(all.len(), 10);
    let cursor = all[8]["id"].as_str().unwrap();

    let query = format!(
        "recruiterId={}&conversationId={}&before={}&pageSize=3",
        RECRUITER_ID, cid, cursor
    );
    let (_, page_a) = get_history(&app, &query).await;
    let (_, page_b) = get_history(&app, &query).await;
    assert_eq!(page_a["messages"], page_b["messages"]);

    let older = page_a["messages"].as_array().unwrap();
    assert_eq!(older.len(), 3);
    // Strictly older than the cursor, ascending.
    assert_eq!(older[0]["content"], all[5]["content"]);
    assert_eq!(older[2]["content"], all[7]["content"]);
    assert_eq!(page_a["hasMoreMessages"], true);
}

#[tokio::test]
async fn history_for_other_recruiters_conversation_is_403() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let (_, first) =
        send_chat(&app, json!({"message": "private", "recruiterId": RECRUITER_ID})).await;
    let cid = first["conversationId"].as_str().unwrap();

    let (status, _) = get_history(
        &app,
        &format!("recruiterId={}&conversationId={}", Uuid::new_v4(), cid),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn history_guest_recruiter_is_always_empty() {
    let state = make_state(Environment::Development);
    let (status, body) =
        get_history(&make_app(&state), "recruiterId=guest-1700000000000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversationId"], Value::Null);
}

// =============================================================================
// Routing & health
// =============================================================================

#[tokio::test]
async fn wrong_method_is_405() {
    let state = make_state(Environment::Development);
    let app = make_app(&state);

    let response = app
        .oneshot(
            Request::get("/api/chatbot/chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_reports_ok() {
    let state = make_state(Environment::Development);
    let response = make_app(&state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}
