use axum::{Json, extract::{Query, State}};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_db::models::{ConversationRow, MessageRow};
use parley_types::api::{ConversationSummary, HistoryResponse};
use parley_types::models::{Message, Role};
use parley_types::session::is_guest_id;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub recruiter_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    /// Message id cursor: return messages strictly older than this one.
    #[serde(default)]
    pub before: Option<Uuid>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let recruiter_id = query
        .recruiter_id
        .filter(|r| !r.trim().is_empty())
        .ok_or(ApiError::MissingFields)?;

    // Guest conversations are never persisted, so guests always get the
    // empty state.
    if is_guest_id(&recruiter_id) {
        return Ok(Json(empty_history()));
    }

    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    // Resolve the target conversation: explicit id with ownership check,
    // or the recruiter's most recent one. Absence is the empty state, not
    // an error.
    let conversation = {
        let db = state.clone();
        let rid = recruiter_id.clone();
        let cid = query.conversation_id;
        tokio::task::spawn_blocking(move || match cid {
            Some(id) => db.db.get_conversation(&id.to_string()),
            None => db.db.latest_conversation_for_recruiter(&rid),
        })
        .await
        .map_err(|e| anyhow::anyhow!("join error: {}", e))??
    };

    let conversation = match conversation {
        Some(row) => row,
        None => return Ok(Json(empty_history())),
    };

    if let Some(owner) = &conversation.recruiter_id {
        if owner != &recruiter_id {
            return Err(ApiError::Forbidden);
        }
    }

    let (rows, has_more, total_messages) =
        fetch_page(&state, &conversation.id, query.before, page_size).await?;

    let messages: Vec<Message> = rows.iter().map(row_to_message).collect();

    Ok(Json(HistoryResponse {
        conversation_id: parse_uuid(&conversation.id, "conversation id"),
        conversation: Some(summary(&conversation, total_messages)),
        messages,
        has_more_messages: has_more,
    }))
}

/// One page of messages, always returned oldest-first to the caller.
///
/// Initial page: oldest-first with one sentinel row past the page size, so
/// "has more" needs no second query. Cursor page: newest-first strictly
/// older than the cursor, reversed, with a count query backing the flag.
async fn fetch_page(
    state: &AppState,
    conversation_id: &str,
    before: Option<Uuid>,
    page_size: u32,
) -> Result<(Vec<MessageRow>, bool, i64), ApiError> {
    let db = state.clone();
    let cid = conversation_id.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let total = db.db.count_messages(&cid)?;

        match before {
            None => {
                let mut rows = db.db.get_messages_oldest_first(&cid, page_size + 1)?;
                let has_more = rows.len() as u32 > page_size;
                rows.truncate(page_size as usize);
                Ok::<_, anyhow::Error>((rows, has_more, total, true))
            }
            Some(cursor_id) => {
                let cursor = match db.db.get_message(&cursor_id.to_string())? {
                    Some(row) if row.conversation_id == cid => row,
                    _ => return Ok((vec![], false, total, false)),
                };

                let mut rows =
                    db.db.get_messages_before(&cid, &cursor.created_at, &cursor.id, page_size)?;
                let has_more = match rows.last() {
                    Some(oldest) => {
                        db.db.count_messages_before(&cid, &oldest.created_at, &oldest.id)? > 0
                    }
                    None => false,
                };
                rows.reverse();
                Ok((rows, has_more, total, true))
            }
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("join error: {}", e))??;

    let (rows, has_more, total, cursor_ok) = result;
    if !cursor_ok {
        return Err(ApiError::InvalidCursor);
    }
    Ok((rows, has_more, total))
}

fn empty_history() -> HistoryResponse {
    HistoryResponse {
        conversation_id: None,
        conversation: None,
        messages: vec![],
        has_more_messages: false,
    }
}

fn summary(row: &ConversationRow, total_messages: i64) -> ConversationSummary {
    ConversationSummary {
        id: parse_uuid(&row.id, "conversation id").unwrap_or_default(),
        title: row.title.clone(),
        last_message_at: parse_timestamp(&row.last_message_at, &row.id),
        total_tokens: row.total_tokens,
        total_messages,
    }
}

fn row_to_message(row: &MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id").unwrap_or_default(),
        conversation_id: parse_uuid(&row.conversation_id, "conversation id").unwrap_or_default(),
        role: match row.role.as_str() {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        },
        content: row.content.clone(),
        tokens: row.tokens,
        created_at: parse_timestamp(&row.created_at, &row.id),
    }
}

fn parse_uuid(value: &str, what: &str) -> Option<Uuid> {
    match value.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Corrupt {} '{}': {}", what, value, e);
            None
        }
    }
}

fn parse_timestamp(value: &str, row_id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite default timestamps are "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on row '{}': {}", value, row_id, e);
            DateTime::default()
        })
}
