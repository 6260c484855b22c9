//! Browser chat front end: a small axum app streaming chat events over SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::chat::{Assistant, ChatEvent};
use crate::config::Settings;
use crate::error::RagError;
use crate::mealie::RecipeSource;
use crate::recipe::Recipe;

const REALM: &str = "Basic realm=\"MealieChef\"";

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>🍳 MealieChef</title>
<style>
body { font-family: sans-serif; max-width: 48rem; margin: 2rem auto; }
#log { white-space: pre-wrap; border: 1px solid #ccc; min-height: 24rem; padding: 1rem; }
form { display: flex; gap: .5rem; margin-top: 1rem; }
input { flex: 1; }
</style>
</head>
<body>
<h1>🍳 MealieChef</h1>
<p>Your personal recipe assistant · <a href="/logout">Logout</a></p>
<div id="log"></div>
<form id="ask">
<input id="message" placeholder="Ask me about your recipes..." autocomplete="off">
<button>Send</button>
</form>
<script>
const log = document.getElementById("log");
const status = {
  embedding_query: " 🔍 Finding relevant recipes...",
  building_context: "\n 🤔 Done! Processing your request...",
  streaming: "\n\n**🤖 MealieChef:**\n",
};
function render(kind, payload) {
  if (kind === "phase" && status[payload.data]) log.textContent += status[payload.data];
  if (kind === "chunk" || kind === "notice") log.textContent += payload.data;
  if (kind === "sources") log.textContent += "\n\n### 🐛 Recipes context used for the above answer: ###\n" + payload.data;
}
document.getElementById("ask").addEventListener("submit", async (ev) => {
  ev.preventDefault();
  const input = document.getElementById("message");
  const message = input.value;
  input.value = "";
  log.textContent += "\n\n👤 " + message + "\n";
  const resp = await fetch("/api/chat", {
    method: "POST",
    headers: { "content-type": "application/json" },
    body: JSON.stringify({ message }),
  });
  const reader = resp.body.pipeThrough(new TextDecoderStream()).getReader();
  let buffer = "";
  for (;;) {
    const { value, done } = await reader.read();
    if (done) break;
    buffer += value;
    let split;
    while ((split = buffer.indexOf("\n\n")) >= 0) {
      const frame = buffer.slice(0, split);
      buffer = buffer.slice(split + 2);
      let kind = "message", data = "";
      for (const line of frame.split("\n")) {
        if (line.startsWith("event:")) kind = line.slice(6).trim();
        if (line.startsWith("data:")) data += line.slice(5).trim();
      }
      if (data) render(kind, JSON.parse(data));
    }
  }
});
</script>
</body>
</html>
"#;

/// Basic-auth credentials guarding the UI.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Builds credentials from a user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn accepts(&self, headers: &HeaderMap) -> bool {
        let Some(encoded) = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, pass)) => {
                let user = user.as_bytes().ct_eq(self.username.as_bytes());
                let pass = pass.as_bytes().ct_eq(self.password.as_bytes());
                (user & pass).into()
            }
            None => false,
        }
    }
}

/// Shared state of the web app.
#[derive(Clone)]
pub struct WebState {
    assistant: Assistant,
    recipes: Arc<dyn RecipeSource>,
    credentials: Arc<Credentials>,
}

impl WebState {
    /// Bundles the assistant, the recipe source used for lookups and the UI
    /// credentials.
    pub fn new(assistant: Assistant, recipes: Arc<dyn RecipeSource>, credentials: Credentials) -> Self {
        Self {
            assistant,
            recipes,
            credentials: Arc::new(credentials),
        }
    }

    /// Reads the UI credentials from `settings`.
    pub fn from_settings(
        settings: &Settings,
        assistant: Assistant,
        recipes: Arc<dyn RecipeSource>,
    ) -> Self {
        Self::new(
            assistant,
            recipes,
            Credentials::new(&settings.ui_username, &settings.ui_password),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

/// Builds the application router.
pub fn router(state: WebState) -> Router {
    let protected = Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat_handler))
        .route("/api/recipes/:slug", get(recipe_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth));
    Router::new()
        .route("/healthz", get(healthz))
        .route("/logout", get(logout))
        .merge(protected)
        .with_state(state)
}

async fn basic_auth(State(state): State<WebState>, request: Request, next: Next) -> Response {
    if state.credentials.accepts(request.headers()) {
        next.run(request).await
    } else {
        unauthorized()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, REALM)],
        "authentication required",
    )
        .into_response()
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// Answering 401 makes browsers forget cached basic-auth credentials.
async fn logout() -> Response {
    unauthorized()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn chat_handler(
    State(state): State<WebState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }
    info!(query = %request.message, "web chat request");
    let events = state.assistant.respond(request.message);
    let stream = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        Some((sse_event(&event), events))
    })
    .chain(stream::once(async {
        Event::default().event("done").data("{}")
    }))
    .map(Ok);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &ChatEvent) -> Event {
    let kind = match event {
        ChatEvent::Phase(_) => "phase",
        ChatEvent::Retrieved(_) => "retrieved",
        ChatEvent::Chunk(_) => "chunk",
        ChatEvent::Notice(_) => "notice",
        ChatEvent::Sources(_) => "sources",
    };
    match Event::default().event(kind).json_data(event) {
        Ok(sse) => sse,
        Err(err) => {
            warn!(error = %err, "failed to encode chat event");
            Event::default().event("error").data(err.to_string())
        }
    }
}

async fn recipe_handler(
    State(state): State<WebState>,
    Path(slug): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    match state.recipes.fetch_recipe(&slug).await {
        Ok(recipe) => Ok(Json(recipe)),
        Err(err @ RagError::NotFound(_)) => Err(error_body(StatusCode::NOT_FOUND, err.to_string())),
        Err(err) => {
            warn!(error = %err, slug = %slug, "recipe lookup failed");
            Err(error_body(StatusCode::BAD_GATEWAY, err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::AssistantOptions;
    use crate::recipe::parfait;
    use crate::testing::{FakeChat, FakeEmbedder, FakeIndex, FakeSource};
    use axum::body::{to_bytes, Body};
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const DIM: usize = 64;

    fn app(chat: FakeChat) -> Router {
        let embedder = FakeEmbedder::new(DIM);
        let index = FakeIndex::default();
        index.index_recipes("recipes", &embedder, &[parfait()]);
        let assistant = Assistant::new(
            Arc::new(embedder),
            Arc::new(index),
            Arc::new(chat),
            AssistantOptions {
                collection: "recipes".into(),
                top_k: 3,
                score_threshold: None,
                external_url: "http://localhost:9000".into(),
                show_sources: true,
            },
        );
        router(WebState::new(
            assistant,
            Arc::new(FakeSource::new(vec![parfait()])),
            Credentials::new("mealie", "rag"),
        ))
    }

    fn auth() -> String {
        format!("Basic {}", BASE64.encode("mealie:rag"))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[test]
    fn credentials_match_exactly() {
        let credentials = Credentials::new("mealie", "rag");
        let header = |pair: &str| {
            let mut headers = HeaderMap::new();
            let value = format!("Basic {}", BASE64.encode(pair));
            headers.insert(AUTHORIZATION, value.parse().unwrap());
            headers
        };
        assert!(credentials.accepts(&header("mealie:rag")));
        for pair in ["mealie:ra", "mealie:rag2", "Mealie:rag", "meal:rag", ":", "mealierag"] {
            assert!(!credentials.accepts(&header(pair)), "{pair} accepted");
        }
        assert!(Credentials::new("mealie", "a:b").accepts(&header("mealie:a:b")));
    }

    #[tokio::test]
    async fn healthz_needs_no_credentials() {
        let response = app(FakeChat::replying(&[]))
            .oneshot(HttpRequest::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn index_requires_basic_auth() {
        let response = app(FakeChat::replying(&[]))
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], REALM);

        let wrong = format!("Basic {}", BASE64.encode("mealie:nope"));
        let response = app(FakeChat::replying(&[]))
            .oneshot(
                HttpRequest::get("/")
                    .header(AUTHORIZATION, wrong)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(FakeChat::replying(&[]))
            .oneshot(
                HttpRequest::get("/")
                    .header(AUTHORIZATION, auth())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("MealieChef"));
    }

    #[tokio::test]
    async fn logout_always_challenges() {
        let response = app(FakeChat::replying(&[]))
            .oneshot(
                HttpRequest::get("/logout")
                    .header(AUTHORIZATION, auth())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_streams_events_then_done() {
        let response = app(FakeChat::replying(&["Try the ", "parfait."]))
            .oneshot(
                HttpRequest::post("/api/chat")
                    .header(AUTHORIZATION, auth())
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"message": "breakfast with yogurt"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");

        let body = body_text(response).await;
        let chunk = body.find("event: chunk").expect("chunk event");
        let sources = body.find("event: sources").expect("sources event");
        let done = body.find("event: done").expect("done event");
        assert!(chunk < sources && sources < done);
        assert!(body.contains(r#""data":"parfait.""#));
        assert!(body.contains("Greek Yogurt Parfait"));
    }

    #[tokio::test]
    async fn blank_chat_message_is_rejected() {
        let response = app(FakeChat::replying(&[]))
            .oneshot(
                HttpRequest::post("/api/chat")
                    .header(AUTHORIZATION, auth())
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"message": "  "}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recipe_lookup_hit_and_miss() {
        let response = app(FakeChat::replying(&[]))
            .oneshot(
                HttpRequest::get("/api/recipes/greek-yogurt-parfait")
                    .header(AUTHORIZATION, auth())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let recipe: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(recipe["id"], json!("487a6099-f164-4f70-8f61-e73b82935333"));

        let response = app(FakeChat::replying(&[]))
            .oneshot(
                HttpRequest::get("/api/recipes/missing")
                    .header(AUTHORIZATION, auth())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["message"], json!("recipe 'missing' not found"));
    }
}
