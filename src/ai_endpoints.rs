use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use futures_util::TryStreamExt;
use log::{error, info, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, SleepLog};

const SLEEP_CONTEXT_LIMIT: i64 = 7;
const CHAT_CONTEXT_LIMIT: i64 = 10;
const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

const PERSONA: &str = "You are a supportive, friendly AI assistant helping a student with their sleep wellness. \
You speak like a caring friend or older sibling - casual but encouraging. Use their tone and be relatable.

Key guidelines:
- Keep responses conversational and brief (2-3 sentences max usually)
- Use emojis occasionally but not excessively
- Reference their sleep data naturally when relevant
- Ask follow-up questions to keep them engaged
- Suggest practical, student-friendly sleep tips
- Show empathy for student stress and challenges

";

/// Instructions plus recent sleep and chat data.
///
/// `logs` are newest first; `history` is oldest first.
pub fn build_context(logs: &[SleepLog], history: &[ChatMessage]) -> String {
    let mut context = String::from(PERSONA);

    if !logs.is_empty() {
        context.push_str("Recent sleep data:\n");
        for (index, log) in logs.iter().enumerate() {
            let label = if index == 0 {
                "Last night".to_string()
            } else {
                format!("{} days ago", index + 1)
            };
            context.push_str(&format!(
                "{}: {:.1}h sleep, fatigue level {}/5{}\n",
                label,
                log.sleep_hours(),
                log.fatigue_level,
                if log.had_nap { ", had nap" } else { "" }
            ));
        }
    }

    if !history.is_empty() {
        context.push_str("\nRecent chat context:\n");
        for msg in history {
            let speaker = if msg.is_user { "Student" } else { "You" };
            context.push_str(&format!("{}: {}\n", speaker, msg.message));
        }
    }

    context
}

pub fn build_prompt(context: &str, message: &str) -> String {
    format!("{context}\n\nStudent's message: {message}\n\nRespond naturally and helpfully:")
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(max = 4000, message = "message is too long"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

async fn recent_context(data: &AppState, user_id: &str) -> AppResult<String> {
    let logs: Vec<SleepLog> = data
        .mongodb
        .sleep_logs()
        .find(doc! { "user_id": user_id })
        .sort(doc! { "log_date": -1 })
        .limit(SLEEP_CONTEXT_LIMIT)
        .await?
        .try_collect()
        .await?;

    let mut history: Vec<ChatMessage> = data
        .mongodb
        .chat_messages()
        .find(doc! { "user_id": user_id })
        .sort(doc! { "created_at": -1 })
        .limit(CHAT_CONTEXT_LIMIT)
        .await?
        .try_collect()
        .await?;
    history.reverse();

    Ok(build_context(&logs, &history))
}

/// Timestamps are stored at millisecond precision and history is ordered by
/// them alone, so the reply must land at least one millisecond after the question.
fn reply_time(asked_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(asked_at + Duration::milliseconds(1))
}

/// POST /chat
pub async fn chat(
    user: AuthUser,
    data: web::Data<AppState>,
    payload: web::Json<ChatRequest>,
) -> AppResult<HttpResponse> {
    payload.validate()?;
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".into()));
    }

    let asked_at = Utc::now();
    let context = match recent_context(&data, &user.id).await {
        Ok(context) => context,
        Err(e) => {
            warn!("Error loading chat context for {}: {}", user.id, e);
            build_context(&[], &[])
        }
    };
    let response = data
        .gemini
        .reply_or_fallback(&build_prompt(&context, message))
        .await;

    let asked = ChatMessage::new(&user.id, message, true, asked_at);
    let answered = ChatMessage::new(
        &user.id,
        response.as_str(),
        false,
        reply_time(asked_at, Utc::now()),
    );
    match data.mongodb.chat_messages().insert_many([asked, answered]).await {
        Ok(_) => info!("chat reply sent to {}", user.id),
        Err(e) => error!("Error saving chat exchange for {}: {}", user.id, e),
    }

    Ok(HttpResponse::Ok().json(ChatResponse { response }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /chat/messages: oldest first.
pub async fn get_messages(
    user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> AppResult<HttpResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let mut messages: Vec<ChatMessage> = data
        .mongodb
        .chat_messages()
        .find(doc! { "user_id": &user.id })
        .sort(doc! { "created_at": -1 })
        .limit(limit)
        .await?
        .try_collect()
        .await?;
    messages.reverse();

    Ok(HttpResponse::Ok().json(messages))
}
