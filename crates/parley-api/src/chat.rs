use axum::{Json, extract::State};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use parley_db::models::RecruiterRow;
use parley_llm::{APOLOGY_REPLY, ChatMessage, estimate_tokens};
use parley_types::api::{ChatResponse, ConversationMetadata};
use parley_types::models::EntityType;
use parley_types::session::is_guest_id;

use crate::error::ApiError;
use crate::state::AppState;
use crate::token::verify_auth_token;

/// Hard cap on prior messages fed back into the completion context.
const CONTEXT_MESSAGES: u32 = 50;

const TITLE_MAX_CHARS: usize = 48;

/// Incoming body with everything optional so that missing fields land in
/// our 400 path instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub recruiter_id: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

pub async fn send_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or(ApiError::MissingFields)?;
    let recruiter_id = body
        .recruiter_id
        .filter(|r| !r.trim().is_empty())
        .ok_or(ApiError::MissingFields)?;

    // Optional token: absence is fine (guests), failure is a hard 401.
    if let Some(token) = &body.auth_token {
        verify_auth_token(&state.config.jwt_secret, token)?;
    }

    let guest = is_guest_id(&recruiter_id);
    let user_ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    // Resolve recruiter and touch last_active. Guests skip the lookup;
    // their ids never correspond to a row.
    let recruiter: Option<RecruiterRow> = if guest {
        None
    } else {
        let db = state.clone();
        let rid = recruiter_id.clone();
        let ts = user_ts.clone();
        let row = tokio::task::spawn_blocking(move || {
            let row = db.db.get_recruiter(&rid)?;
            if row.is_some() {
                db.db.touch_recruiter_last_active(&rid, &ts)?;
            }
            Ok::<_, anyhow::Error>(row)
        })
        .await
        .map_err(|e| anyhow::anyhow!("join error: {}", e))??;

        Some(row.ok_or(ApiError::RecruiterNotFound)?)
    };

    // Resolve or create the conversation. Guest conversations exist only
    // for the duration of this request.
    let conversation_id = body.conversation_id.unwrap_or_else(Uuid::new_v4);
    let (prior_tokens, existing_title, created) = if guest {
        (0, None, true)
    } else {
        resolve_or_create_conversation(&state, conversation_id, &recruiter_id, &message, &user_ts)
            .await?
    };

    // Prior messages, oldest first, behind a personalized system prompt.
    let mut context = vec![ChatMessage::new(
        "system",
        system_prompt(&state.config.owner_name, recruiter.as_ref()),
    )];
    if !guest && !created {
        let db = state.clone();
        let cid = conversation_id.to_string();
        let rows = tokio::task::spawn_blocking(move || {
            db.db.get_recent_messages(&cid, CONTEXT_MESSAGES)
        })
        .await
        .map_err(|e| anyhow::anyhow!("join error: {}", e))??;

        context.extend(rows.into_iter().map(|r| ChatMessage::new(r.role, r.content)));
    }
    context.push(ChatMessage::new("user", message.clone()));

    // Completion. Provider failure becomes the fixed apology, never a
    // propagated error; the visitor already sees their own message.
    let completion = match state.llm.complete(&context).await {
        Ok(c) => c,
        Err(e) => {
            error!("completion provider failed: {:#}", e);
            parley_llm::Completion { content: APOLOGY_REPLY.to_string(), total_tokens: 0 }
        }
    };
    let reply_ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    // Needed for the response flag, so it stays on the request path.
    // Classification failure just means "not a resume request".
    let resume_requested = match state.llm.classify_resume_intent(&message).await {
        Ok(flag) => flag,
        Err(e) => {
            warn!("resume classification failed: {:#}", e);
            false
        }
    };

    // Persist both messages and advance conversation metadata. Each step
    // is independent; a failed insert is logged, never surfaced.
    let user_tokens = estimate_tokens(&message);
    let added_tokens = user_tokens + completion.total_tokens;
    let user_message_id = Uuid::new_v4();

    let user_persisted = if guest {
        false
    } else {
        let db = state.clone();
        let cid = conversation_id.to_string();
        let umid = user_message_id.to_string();
        let user_content = message.clone();
        let assistant_content = completion.content.clone();
        let assistant_tokens = completion.total_tokens;
        let uts = user_ts.clone();
        let rts = reply_ts.clone();
        tokio::task::spawn_blocking(move || {
            let mut user_ok = true;
            if let Err(e) = db.db.insert_message(&umid, &cid, "user", &user_content, user_tokens, &uts)
            {
                error!("failed to persist user message: {:#}", e);
                user_ok = false;
            }
            if let Err(e) = db.db.insert_message(
                &Uuid::new_v4().to_string(),
                &cid,
                "assistant",
                &assistant_content,
                assistant_tokens,
                &rts,
            ) {
                error!("failed to persist assistant message: {:#}", e);
            }
            if let Err(e) = db.db.bump_conversation(&cid, &rts, added_tokens) {
                error!("failed to update conversation metadata: {:#}", e);
            }
            user_ok
        })
        .await
        .unwrap_or_else(|e| {
            error!("persistence task join error: {}", e);
            false
        })
    };

    // Resume flag upsert: best effort, swallowed on failure.
    if resume_requested && !guest {
        let db = state.clone();
        let rid = recruiter_id.clone();
        let jid = Uuid::new_v4().to_string();
        let result = tokio::task::spawn_blocking(move || db.db.upsert_resume_requested(&jid, &rid))
            .await
            .map_err(|e| anyhow::anyhow!("join error: {}", e))
            .and_then(|r| r);
        if let Err(e) = result {
            error!("failed to upsert resume request: {:#}", e);
        }
    }

    // Entity extraction runs detached so it never adds latency or failure
    // modes to the reply. Requires the user row to exist (entities carry a
    // message foreign key).
    if user_persisted {
        spawn_entity_extraction(state.clone(), conversation_id, user_message_id, message.clone());
    }

    let title = existing_title.unwrap_or_else(|| derive_title(&message));
    let last_message_at = reply_ts
        .parse::<chrono::DateTime<Utc>>()
        .unwrap_or_else(|_| Utc::now());

    Ok(Json(ChatResponse {
        message: completion.content,
        conversation_id,
        tokens: completion.total_tokens,
        resume_requested,
        metadata: Some(ConversationMetadata {
            title,
            last_message_at,
            total_tokens: prior_tokens + added_tokens,
        }),
    }))
}

/// Load the conversation, checking ownership, or create it. A supplied id
/// with no row is created under that id so repeated calls stay stable.
/// Returns (tokens before this exchange, title if pre-existing, created).
async fn resolve_or_create_conversation(
    state: &AppState,
    conversation_id: Uuid,
    recruiter_id: &str,
    first_message: &str,
    now: &str,
) -> Result<(i64, Option<String>, bool), ApiError> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let rid = recruiter_id.to_string();
    let title = derive_title(first_message);
    let now = now.to_string();

    let outcome = tokio::task::spawn_blocking(move || {
        if let Some(row) = db.db.get_conversation(&cid)? {
            return Ok::<_, anyhow::Error>(Some(row));
        }
        db.db.create_conversation(&cid, Some(&rid), &title, &now)?;
        Ok(None)
    })
    .await
    .map_err(|e| anyhow::anyhow!("join error: {}", e))??;

    match outcome {
        Some(row) => {
            if let Some(owner) = &row.recruiter_id {
                if owner != recruiter_id {
                    return Err(ApiError::Forbidden);
                }
            }
            Ok((row.total_tokens, Some(row.title), false))
        }
        None => Ok((0, None, true)),
    }
}

fn spawn_entity_extraction(
    state: AppState,
    conversation_id: Uuid,
    message_id: Uuid,
    message: String,
) {
    tokio::spawn(async move {
        let entities = match state.llm.extract_entities(&message).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!("entity extraction failed: {:#}", e);
                return;
            }
        };
        if entities.is_empty() {
            return;
        }

        let db = state.clone();
        let result = tokio::task::spawn_blocking(move || {
            for entity in entities {
                let entity_type = EntityType::parse(&entity.entity_type);
                db.db.insert_entity(
                    &Uuid::new_v4().to_string(),
                    &conversation_id.to_string(),
                    &message_id.to_string(),
                    entity_type.as_str(),
                    &entity.value,
                    entity.confidence.clamp(0.0, 1.0),
                )?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await;

        match result {
            Ok(Err(e)) => warn!("failed to persist entities: {:#}", e),
            Err(e) => warn!("entity persistence join error: {}", e),
            Ok(Ok(())) => {}
        }
    });
}

fn system_prompt(owner_name: &str, recruiter: Option<&RecruiterRow>) -> String {
    let mut prompt = format!(
        "You are {owner}'s portfolio assistant. Answer questions about {owner}'s \
         experience, skills and projects, and help recruiters get in touch. Keep \
         replies concise and friendly.",
        owner = owner_name
    );

    if let Some(r) = recruiter {
        match &r.company_name {
            Some(company) => {
                prompt.push_str(&format!(" You are talking to {} from {}.", r.name, company))
            }
            None => prompt.push_str(&format!(" You are talking to {}.", r.name)),
        }
    }

    prompt
}

fn derive_title(message: &str) -> String {
    let trimmed = message.trim();
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}
