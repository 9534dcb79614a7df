//! In-process fake of an OpenAI-compatible generation service.
//!
//! Compiled for this crate's tests and, with the `test-util` feature, for
//! the tests of crates that drive a [`crate::GeneratorClient`].
//!
//! The chat handler picks its reply from the prompt text so one server can
//! play every scenario:
//!
//! | Prompt contains | Reply |
//! |---|---|
//! | `Topic: broken` | HTTP 500 `model crashed` |
//! | `Topic: vague` | `I'm not sure.` |
//! | `Topic: sloppy` | envelope without inner markers |
//! | `Topic: thinking` | well-formed example behind a `<think>` block |
//! | `echo params` | the received temperature and max_tokens |
//! | `no choices` | an empty `choices` array |
//! | anything else | a well-formed example |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const LOADED_MODEL: &str = "deepseek/deepseek-r1-0528-qwen3-8b";

pub const WELL_FORMED: &str =
    "Question: What is 2+2?\nAnswer: Thought: Add 2 and 2.\nFinal Answer: 4";

async fn list_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [
            { "id": LOADED_MODEL, "object": "model", "owned_by": "organization_owner" },
            { "id": "text-embedding-nomic-embed-text-v1.5", "object": "model", "owned_by": "organization_owner" }
        ]
    }))
}

async fn chat(Json(req): Json<Value>) -> Response {
    let prompt = req["messages"][0]["content"].as_str().unwrap_or_default();

    let content = if prompt.contains("Topic: broken") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    } else if prompt.contains("no choices") {
        return Json(json!({ "choices": [] })).into_response();
    } else if prompt.contains("echo params") {
        format!("temperature={} max_tokens={}", req["temperature"], req["max_tokens"])
    } else if prompt.contains("Topic: vague") {
        "I'm not sure.".to_string()
    } else if prompt.contains("Topic: sloppy") {
        "Question: Why?\nAnswer: Because.".to_string()
    } else if prompt.contains("Topic: thinking") {
        format!("<think>Question: draft\nAnswer: draft</think>\n\n{WELL_FORMED}")
    } else {
        WELL_FORMED.to_string()
    };

    Json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
        ]
    }))
    .into_response()
}

/// Start the fake on an ephemeral port and return its base URL.
pub async fn spawn_fake_service() -> String {
    let router = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL on which nothing is listening.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
