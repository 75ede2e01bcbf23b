//! Administrative HTTP console.
//!
//! Thin JSON routes over the bot's stores and the turn orchestrator. The
//! console has no authentication of its own; bind it to a trusted address.

use anyhow::Result;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bot::ChatBot;
use crate::chat::TurnOutcome;
use crate::history::{ClearOutcome, SessionSummary, Turn};
use crate::moderation::{Banlist, Identity};

pub struct Console {
    bot: Arc<ChatBot>,
}

struct AppState {
    bot: Arc<ChatBot>,
}

impl Console {
    pub fn new(bot: Arc<ChatBot>) -> Self {
        Self { bot }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            bot: self.bot.clone(),
        });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health_check))
            .route("/api/chat", post(chat))
            .route(
                "/api/system_prompt",
                get(get_system_prompt).post(set_system_prompt),
            )
            .route(
                "/api/history/{user_id}",
                get(get_history).delete(delete_history),
            )
            .route("/api/history/{user_id}/clear", post(clear_history))
            .route("/api/sessions", get(list_sessions))
            .route("/api/banlist", get(get_banlist))
            .route("/api/config", get(get_config).patch(patch_config))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn run(&self) -> Result<()> {
        let config = self.bot.config().snapshot();
        let addr: SocketAddr =
            format!("{}:{}", config.console.bind, config.console.port).parse()?;

        info!("Starting admin console on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

// Error response type
struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
struct ChatRequest {
    user_id: String,
    message: String,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError(
            StatusCode::BAD_REQUEST,
            "user_id is required".to_string(),
        ));
    }

    let identity = Identity {
        user_id: user_id.to_string(),
        group_id: request.group_id.filter(|g| !g.trim().is_empty()),
    };
    let outcome = state
        .bot
        .chat()
        .handle_turn(&identity, &request.message, request.image_url.as_deref())
        .await;
    Ok(Json(outcome))
}

#[derive(Serialize, Deserialize)]
struct SystemPromptBody {
    system_prompt: String,
}

async fn get_system_prompt(State(state): State<Arc<AppState>>) -> Json<SystemPromptBody> {
    Json(SystemPromptBody {
        system_prompt: state.bot.admin().system_prompt(),
    })
}

async fn set_system_prompt(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SystemPromptBody>,
) -> Json<SystemPromptBody> {
    let admin = state.bot.admin();
    admin.set_system_prompt(&body.system_prompt);
    Json(SystemPromptBody {
        system_prompt: admin.system_prompt(),
    })
}

#[derive(Serialize)]
struct HistoryResponse {
    user_id: String,
    history: Vec<Turn>,
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<HistoryResponse> {
    let history = state.bot.history().get(&user_id);
    Json(HistoryResponse { user_id, history })
}

async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    let outcome = state.bot.history().clear(&user_id);
    let status = match outcome {
        ClearOutcome::Cleared => "cleared",
        ClearOutcome::NotFound => "not_found",
    };
    Json(json!({ "status": status, "message": outcome.message() }))
}

async fn delete_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if state.bot.history().delete(&user_id) {
        info!(user = %user_id, "History deleted from console");
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(AppError(
            StatusCode::NOT_FOUND,
            format!("No history for user {}", user_id),
        ))
    }
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionSummary>,
    /// Users currently in continuous chat mode
    active: Vec<String>,
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let range = state.bot.config().snapshot().console.session_user_range;
    let allowed = |user_id: &str| range.is_none_or(|r| r.contains(user_id));

    let sessions = state.bot.history().list_sessions(allowed);
    let active = state
        .bot
        .sessions()
        .active_users()
        .into_iter()
        .filter(|u| allowed(u))
        .collect();
    Json(SessionsResponse { sessions, active })
}

async fn get_banlist(State(state): State<Arc<AppState>>) -> Json<Banlist> {
    Json(state.bot.moderation().get_banlist())
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.bot.config().snapshot().redacted())
}

/// Secrets echoed back as the redaction marker are left unchanged, so the
/// body of `GET /api/config` can be sent back as is.
async fn patch_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let updated = state
        .bot
        .config()
        .patch(&patch)
        .map_err(|e| AppError(StatusCode::BAD_REQUEST, format!("{:#}", e)))?;
    Ok(Json(updated.redacted()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, REDACTED, TelegramConfig, UserRange};
    use crate::testing::Fixture;
    use reqwest::Client;

    /// Serve the console on an ephemeral port; returns its base URL.
    async fn spawn(f: &Fixture) -> String {
        let console = Console::new(Arc::new(f.bot()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, console.router()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn health() {
        let f = Fixture::with_replies(vec![]);
        let base = spawn(&f).await;
        let body = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn chat_turn_and_history_routes() {
        let f = Fixture::with_replies(vec![Ok("pong".into())]);
        let base = spawn(&f).await;
        let client = Client::new();

        let outcome: Value = client
            .post(format!("{base}/api/chat"))
            .json(&json!({"user_id": "42", "message": "ping"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(outcome, json!({"reply": "pong", "kind": "replied"}));

        let history: Value = client
            .get(format!("{base}/api/history/42"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            history["history"],
            json!([{"role": "user", "content": "ping"}, {"role": "assistant", "content": "pong"}])
        );

        let cleared: Value = client
            .post(format!("{base}/api/history/42/clear"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cleared["status"], "cleared");

        let missing = client
            .delete(format!("{base}/api/history/42"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_requires_user_id() {
        let f = Fixture::with_replies(vec![]);
        let base = spawn(&f).await;
        let response = Client::new()
            .post(format!("{base}/api/chat"))
            .json(&json!({"user_id": " ", "message": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn system_prompt_round_trip() {
        let f = Fixture::with_replies(vec![]);
        let base = spawn(&f).await;
        let client = Client::new();

        let set: Value = client
            .post(format!("{base}/api/system_prompt"))
            .json(&json!({"system_prompt": "Be terse."}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(set["system_prompt"], "Be terse.");
        assert_eq!(f.admin.system_prompt(), "Be terse.");
    }

    #[tokio::test]
    async fn sessions_respect_user_range() {
        let config = Config {
            console: crate::config::ConsoleConfig {
                session_user_range: Some(UserRange { min: 100, max: 199 }),
                ..Default::default()
            },
            ..Config::default()
        };
        let f = Fixture::new(config, vec![], "");
        f.history.append("150", Turn::user("in range"), 10);
        f.history.append("900", Turn::user("outside"), 10);
        let base = spawn(&f).await;

        let body: Value = reqwest::get(format!("{base}/api/sessions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let users: Vec<&str> = body["sessions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["user_id"].as_str().unwrap())
            .collect();
        assert_eq!(users, vec!["150"]);
    }

    #[tokio::test]
    async fn config_is_redacted_and_patchable() {
        let config = Config {
            api_key: "sk-secret".into(),
            ..Config::default()
        };
        let f = Fixture::new(config, vec![], "");
        let base = spawn(&f).await;
        let client = Client::new();

        let shown: Value = client
            .get(format!("{base}/api/config"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(shown["api_key"], REDACTED);

        let patched: Value = client
            .patch(format!("{base}/api/config"))
            .json(&json!({"memory_length": 4, "api_key": REDACTED}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(patched["memory_length"], 4);
        assert_eq!(f.config.snapshot().memory_length, 4);
        assert_eq!(f.config.snapshot().api_key, "sk-secret");

        let rejected = client
            .patch(format!("{base}/api/config"))
            .json(&json!({"memory_length": "lots"}))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_view_round_trips_without_losing_secrets() {
        let config = Config {
            api_key: "sk-secret".into(),
            telegram: Some(TelegramConfig {
                enabled: true,
                api_token: "tg-real".into(),
            }),
            ..Config::default()
        };
        let f = Fixture::new(config, vec![], "");
        let base = spawn(&f).await;
        let client = Client::new();

        let mut shown: Value = client
            .get(format!("{base}/api/config"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(shown["telegram"]["api_token"], REDACTED);
        shown["telegram"]["enabled"] = json!(false);

        let response = client
            .patch(format!("{base}/api/config"))
            .json(&shown)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let live = f.config.snapshot();
        let telegram = live.telegram.unwrap();
        assert_eq!(telegram.api_token, "tg-real");
        assert!(!telegram.enabled);
        assert_eq!(live.api_key, "sk-secret");
    }

    #[tokio::test]
    async fn banlist_snapshot() {
        let f = Fixture::with_replies(vec![]);
        f.moderation.add_blocked_word("spam");
        let base = spawn(&f).await;

        let body: Value = reqwest::get(format!("{base}/api/banlist"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["blocked_words"], json!(["spam"]));
    }
}
