//! Notification trigger endpoint.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attachment::AttachmentInput;
use crate::error::{AppError, Result};
use crate::notifier::{Actor, NotifyRequest, ATTACHMENTS_KEY};
use crate::placeholder::Context;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct NotifyBody {
    pub module: String,
    pub menu: String,
    pub task: String,
    #[serde(default)]
    pub context: Context,
    /// URLs or `{filename, content}` entries; local paths are rejected
    #[serde(default)]
    pub attachments: Value,
    #[serde(default)]
    pub use_raw: bool,
    pub actor: Option<Actor>,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub dispatched: bool,
}

/// POST /api/v1/notify
#[tracing::instrument(
    name = "http.notify",
    skip(state, body),
    fields(module = %body.module, menu = %body.menu, task = %body.task)
)]
pub async fn notify(
    State(state): State<AppState>,
    Json(body): Json<NotifyBody>,
) -> Result<Json<NotifyResponse>> {
    for (field, value) in [
        ("module", &body.module),
        ("menu", &body.menu),
        ("task", &body.task),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{}: is required", field)));
        }
    }

    let mut context = body.context;
    let mut attachments = AttachmentInput::list_from_json(&body.attachments);
    if let Some(value) = context.remove(ATTACHMENTS_KEY) {
        attachments.extend(AttachmentInput::list_from_json(&value));
    }
    // Server-side files are only reachable from in-process callers
    if attachments.iter().any(AttachmentInput::is_local_file) {
        return Err(AppError::Validation(
            "attachments: only URLs and inline content are accepted".to_string(),
        ));
    }

    let mut request = NotifyRequest::new(context).with_attachments(attachments);
    if let Some(actor) = body.actor {
        request = request.with_actor(actor);
    }
    if body.use_raw {
        request = request.raw();
    }

    let dispatched = state
        .notifier
        .notify_with(&body.module, &body.menu, &body.task, request)
        .await;

    Ok(Json(NotifyResponse { dispatched }))
}
