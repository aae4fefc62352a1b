//! Command handling end to end: parsed text in, rendered reply out, with
//! both upstream services served by a mock server.

use std::path::Path;
use std::sync::Arc;

use relay_bot::commands::{self, IMAGE_FILENAME, Inbound, Reply};
use relay_bot::config::Config;
use relay_bot::dispatch::Dispatcher;
use relay_bot::image::{ImageProvider, comfyui::ComfyUiProvider};
use relay_bot::llm::{TextProvider, providers::ollama::OllamaProvider};
use relay_bot::session::{Role, SessionStore, UserId};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dispatcher(server: &MockServer, cap: usize) -> Dispatcher {
    let mut image = Config::test_default(Path::new("/tmp")).image;
    image.api_url = server.uri();
    image.poll_interval_ms = 10;
    image.timeout_seconds = 5;

    let text = OllamaProvider::new(server.uri(), "m1".into(), 5).unwrap();
    let image = ComfyUiProvider::new(&image).unwrap();
    Dispatcher::new(
        Arc::new(SessionStore::new(cap)),
        TextProvider::Ollama(text),
        ImageProvider::ComfyUi(image),
    )
}

async fn send(dispatcher: &Dispatcher, user: &UserId, text: &str) -> Option<Reply> {
    commands::handle(dispatcher, "!", Inbound { user_id: user, text, addressed: false, mention: None }).await
}

fn as_pairs(dispatcher: &Dispatcher, user: &UserId) -> Vec<(Role, String)> {
    dispatcher.history(user).into_iter().map(|t| (t.role, t.content)).collect()
}

#[tokio::test]
async fn chat_then_clear() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "hi there" }, "done": true
        })))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 10);
    let user = UserId::from(42u64);

    let reply = send(&d, &user, "!chat hello").await;
    assert_eq!(reply, Some(Reply::Text("hi there".into())));
    assert_eq!(
        as_pairs(&d, &user),
        vec![(Role::User, "hello".to_string()), (Role::Assistant, "hi there".to_string())]
    );

    let reply = send(&d, &user, "!clear").await;
    assert_eq!(reply, Some(Reply::Text("Your conversation history has been cleared.".into())));
    assert!(d.history(&user).is_empty());
}

#[tokio::test]
async fn failed_chat_keeps_only_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "out of memory" })))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 10);
    let user = UserId::from("alice");

    let reply = send(&d, &user, "!chat hello").await;
    assert_eq!(reply, Some(Reply::Text("Sorry, I couldn't generate a response at this time.".into())));
    assert_eq!(as_pairs(&d, &user), vec![(Role::User, "hello".to_string())]);
}

#[tokio::test]
async fn history_is_capped_across_exchanges() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "ok" }
        })))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 3);
    let user = UserId::from(7u64);
    for i in 0..3 {
        send(&d, &user, &format!("!chat turn {i}")).await;
    }

    let pairs = as_pairs(&d, &user);
    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0], (Role::Assistant, "ok".to_string()));
    assert_eq!(pairs[1], (Role::User, "turn 2".to_string()));
    assert_eq!(pairs[2], (Role::Assistant, "ok".to_string()));
}

#[tokio::test]
async fn message_leaves_history_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "4" })))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 10);
    let user = UserId::from(1u64);

    let reply = send(&d, &user, "!message what is 2+2?").await;
    assert_eq!(reply, Some(Reply::Text("4".into())));
    assert_eq!(d.sessions().session_count(), 0);
}

#[tokio::test]
async fn models_lists_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [ { "name": "m1" }, { "name": "m2" } ]
        })))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 10);
    let Some(Reply::Text(text)) = send(&d, &UserId::from(1u64), "!models").await else {
        panic!("expected a text reply");
    };
    assert!(text.contains("m1"));
    assert!(text.contains("m2"));
}

#[tokio::test]
async fn models_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 10);
    let reply = send(&d, &UserId::from(1u64), "!models").await;
    assert_eq!(
        reply,
        Some(Reply::Text("An error occurred while fetching the model list. Please try again later.".into()))
    );
}

#[tokio::test]
async fn photo_returns_image_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "p1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p1": { "outputs": { "9": { "images": [ { "filename": "fox.png", "subfolder": "", "type": "output" } ] } } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"B".to_vec()))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 10);
    let reply = send(&d, &UserId::from(1u64), "!photo a red fox").await;
    assert_eq!(reply, Some(Reply::Image { bytes: b"B".to_vec(), filename: IMAGE_FILENAME.to_string() }));
}

#[tokio::test]
async fn photo_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let d = dispatcher(&server, 10);
    let reply = send(&d, &UserId::from(1u64), "!photo a red fox").await;
    assert_eq!(reply, Some(Reply::Text("Sorry, I couldn't generate an image at this time.".into())));
}

#[tokio::test]
async fn users_do_not_share_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "hey" }
        })))
        .mount(&server)
        .await;

    let d = Arc::new(dispatcher(&server, 10));
    let mut tasks = Vec::new();
    for n in 0..8u64 {
        let d = Arc::clone(&d);
        tasks.push(tokio::spawn(async move {
            let user = UserId::from(n);
            send(&d, &user, &format!("!chat from {n}")).await;
            user
        }));
    }
    for task in tasks {
        let user = task.await.unwrap();
        let pairs = as_pairs(&d, &user);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1, format!("from {}", user.as_str()));
    }
}
