use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use taskpilot_common::{ConversationId, Error, TaskId};
use taskpilot_db::{NewTask, TaskFilter, TaskUpdate};
use tracing::error;

use crate::auth::current_user;
use crate::state::SharedState;

/// Map domain errors onto HTTP responses with a uniform error body.
pub(crate) fn error_response(err: Error) -> (StatusCode, Json<Value>) {
    let status = match &err {
        Error::Validation(msg) if msg.contains("already registered") => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {err}");
    }
    (
        status,
        Json(json!({"status": "error", "message": err.to_string()})),
    )
}

#[derive(serde::Deserialize)]
pub struct ChatRequest {
    message: String,
    conversation_id: Option<String>,
}

/// POST /api/chat — run one agent turn inside a conversation.
pub async fn chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> (StatusCode, Json<Value>) {
    let user = match current_user(&state, &headers).await {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };

    if body.message.trim().is_empty() {
        return error_response(Error::Validation("message must not be empty".to_string()));
    }

    let requested = body.conversation_id.map(ConversationId::from);
    let conversation = match state
        .sessions
        .get_or_create(&user.id, requested.as_ref())
        .await
    {
        Ok(conversation) => conversation,
        Err(e) => return error_response(e),
    };

    // The transcript replayed to the agent ends just before this turn; the
    // new user message goes in as the loop's own input.
    let history = match state.sessions.history(&conversation.id).await {
        Ok(history) => history,
        Err(e) => return error_response(e),
    };

    if let Err(e) = state
        .sessions
        .append(&conversation.id, "user", &body.message)
        .await
    {
        return error_response(e);
    }

    let response = match state
        .runtime
        .process_message(&user.id, &body.message, &history)
        .await
    {
        Ok(response) => response,
        // The user message stays persisted; the failed turn has no
        // assistant message.
        Err(e) => return error_response(e),
    };

    if let Err(e) = state
        .sessions
        .append(&conversation.id, "assistant", &response)
        .await
    {
        return error_response(e);
    }

    (
        StatusCode::OK,
        Json(json!({
            "response": response,
            "conversation_id": conversation.id,
            "status": "success",
        })),
    )
}

/// GET /api/chat/history/{conversation_id} — stored messages, oldest first.
pub async fn chat_history(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let user = match current_user(&state, &headers).await {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };

    let conversation_id = ConversationId::from(conversation_id);
    let owner = {
        let chats = state.chats.lock().await;
        match chats.conversation_owner(&conversation_id) {
            Ok(owner) => owner,
            Err(e) => return error_response(e),
        }
    };

    match owner {
        None => {
            return error_response(Error::NotFound("conversation not found".to_string()));
        }
        Some(owner) if owner != user.id => {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "status": "error",
                    "message": "conversation belongs to another user",
                })),
            );
        }
        Some(_) => {}
    }

    let messages = match state.sessions.stored_history(&conversation_id).await {
        Ok(messages) => messages,
        Err(e) => return error_response(e),
    };

    let messages: Vec<Value> = messages
        .iter()
        .map(|m| {
            json!({
                "role": m.role,
                "content": m.content,
                "created_at": m.created_at,
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "conversation_id": conversation_id,
            "messages": messages,
        })),
    )
}

#[derive(serde::Deserialize)]
pub struct TaskListQuery {
    active: Option<bool>,
}

/// GET /api/tasks — the caller's tasks, optionally only active ones.
pub async fn list_tasks(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<TaskListQuery>,
) -> (StatusCode, Json<Value>) {
    let user = match current_user(&state, &headers).await {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };

    let filter = if query.active.unwrap_or(false) {
        TaskFilter::Active
    } else {
        TaskFilter::All
    };

    let tasks = state.tasks.lock().await;
    match tasks.list(&user.id, filter) {
        Ok(tasks) => (StatusCode::OK, Json(json!({ "tasks": tasks }))),
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
pub struct CreateTaskRequest {
    title: String,
    description: Option<String>,
    priority: Option<String>,
}

/// POST /api/tasks — create a task for the caller.
pub async fn create_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<CreateTaskRequest>,
) -> (StatusCode, Json<Value>) {
    let user = match current_user(&state, &headers).await {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };

    let priority = body
        .priority
        .as_deref()
        .unwrap_or_default()
        .parse()
        .unwrap_or_default();

    let tasks = state.tasks.lock().await;
    match tasks.create(
        &user.id,
        NewTask {
            title: body.title,
            description: body.description,
            priority,
        },
    ) {
        Ok(task) => (StatusCode::CREATED, Json(json!(task))),
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
pub struct UpdateTaskRequest {
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    completed: Option<bool>,
}

/// PUT /api/tasks/{id} — update any subset of a task's fields.
pub async fn update_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> (StatusCode, Json<Value>) {
    let user = match current_user(&state, &headers).await {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };

    let update = TaskUpdate {
        title: body.title,
        description: body.description,
        priority: body.priority.map(|p| p.parse().unwrap_or_default()),
        completed: body.completed,
    };

    if update.is_empty() {
        return error_response(Error::Validation(
            "update must change at least one field".to_string(),
        ));
    }

    let tasks = state.tasks.lock().await;
    match tasks.update(&user.id, &TaskId::from(task_id), update) {
        Ok(Some(task)) => (StatusCode::OK, Json(json!(task))),
        Ok(None) => error_response(Error::NotFound("task not found".to_string())),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/tasks/{id} — remove one of the caller's tasks.
pub async fn delete_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let user = match current_user(&state, &headers).await {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };

    let tasks = state.tasks.lock().await;
    match tasks.delete(&user.id, &TaskId::from(task_id)) {
        Ok(true) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Ok(false) => error_response(Error::NotFound("task not found".to_string())),
        Err(e) => error_response(e),
    }
}
