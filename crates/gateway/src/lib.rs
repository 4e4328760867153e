//! Webhook transport: a small axum server Telegram pushes updates to.
//! The update path embeds the bot token, so a request to any other path
//! is indistinguishable from a miss.

use std::sync::Arc;

use {
    axum::{
        Router,
        body::Bytes,
        extract::{Path, State},
        http::{HeaderMap, StatusCode, header},
        response::IntoResponse,
        routing::{get, post},
    },
    secrecy::{ExposeSecret, Secret},
    teloxide::{prelude::*, types::Update},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use stemsplit_telegram::{context::SharedContext, handlers};

#[derive(Clone)]
struct WebhookState {
    ctx: SharedContext,
    token: Arc<Secret<String>>,
}

/// Builds the webhook router: `GET /health` plus `POST /<token>`.
pub fn app(ctx: SharedContext, token: Secret<String>) -> Router {
    let state = WebhookState {
        ctx,
        token: Arc::new(token),
    };
    Router::new()
        .route("/health", get(health_handler))
        .route("/{token}", post(webhook_handler))
        .with_state(state)
}

/// Points Telegram at `<base_url>/<token>`.
pub async fn register_webhook(
    bot: &Bot,
    base_url: &str,
    token: &Secret<String>,
) -> anyhow::Result<()> {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        token.expose_secret()
    );
    let parsed = reqwest::Url::parse(&url)?;
    bot.set_webhook(parsed).await?;
    info!(base_url, "webhook registered");
    Ok(())
}

pub async fn serve(
    app: Router,
    bind: &str,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!(bind, port, "webhook server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn webhook_handler(
    State(state): State<WebhookState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if token != *state.token.expose_secret() {
        debug!("webhook request with wrong token path");
        return StatusCode::NOT_FOUND;
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "undecodable webhook update");
            return StatusCode::BAD_REQUEST;
        },
    };

    // Answer Telegram immediately; the handler runs on its own task so a
    // slow download never stalls webhook delivery.
    let ctx = Arc::clone(&state.ctx);
    tokio::spawn(async move {
        handlers::handle_update(&ctx, update).await;
    });
    StatusCode::OK
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use {
        axum::{body::Body, http::Request},
        tower::ServiceExt,
    };

    use {
        stemsplit_jobs::JobQueue, stemsplit_sessions::UploadStore,
        stemsplit_telegram::BotContext,
    };

    const TOKEN: &str = "123:secret";

    fn test_app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, _rx) = JobQueue::bounded(1);
        let api_root = reqwest::Url::parse("http://127.0.0.1:1/").expect("url");
        let ctx = Arc::new(BotContext {
            bot: Bot::new(TOKEN),
            store: UploadStore::new(),
            queue,
            tmp_dir: dir.path().to_path_buf(),
            api_root,
            operator_chat_id: None,
        });
        (app(ctx, Secret::new(TOKEN.to_string())), dir)
    }

    fn update_json() -> String {
        serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "date": 1,
                "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                "text": "hello"
            }
        })
        .to_string()
    }

    async fn status_of(app: Router, req: Request<Body>) -> StatusCode {
        app.oneshot(req).await.expect("router response").status()
    }

    #[tokio::test]
    async fn health_responds_ok() {
        let (app, _dir) = test_app();
        let req = Request::get("/health").body(Body::empty()).expect("request");
        assert_eq!(status_of(app, req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_token_path_is_not_found() {
        let (app, _dir) = test_app();
        let req = Request::post("/wrong-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(update_json()))
            .expect("request");
        assert_eq!(status_of(app, req).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_json_content_type_is_unsupported() {
        let (app, _dir) = test_app();
        let req = Request::post(format!("/{TOKEN}"))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(update_json()))
            .expect("request");
        assert_eq!(status_of(app, req).await, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn missing_content_type_is_unsupported() {
        let (app, _dir) = test_app();
        let req = Request::post(format!("/{TOKEN}"))
            .body(Body::from(update_json()))
            .expect("request");
        assert_eq!(status_of(app, req).await, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn undecodable_update_is_bad_request() {
        let (app, _dir) = test_app();
        let req = Request::post(format!("/{TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        assert_eq!(status_of(app, req).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_update_is_accepted() {
        let (app, _dir) = test_app();
        let req = Request::post(format!("/{TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(update_json()))
            .expect("request");
        assert_eq!(status_of(app, req).await, StatusCode::OK);
    }
}
