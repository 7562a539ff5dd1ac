use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use parley_types::api::{ChatRequest, ChatResponse};
use parley_types::models::{Message, Role};
use parley_types::session::SessionMode;

use crate::api::{ChatApi, HistoryParams};
use crate::session::SessionEvent;

/// Chat-bubble apology appended when a send fails. The visitor's own
/// message stays on screen; history is never rolled back.
pub const SEND_FAILURE_REPLY: &str =
    "I'm sorry, something went wrong sending that. Please try again.";

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Default)]
struct ConversationState {
    conversation_id: Option<Uuid>,
    messages: Vec<Message>,
    has_more: bool,
    title: Option<String>,
    total_tokens: i64,
}

/// Client-side conversation state: ordered message list, conversation id,
/// pagination cursor. Synchronizes with the history endpoint.
pub struct ConversationStore<A: ChatApi> {
    api: A,
    auth_token: Option<String>,
    state: Mutex<ConversationState>,
}

impl<A: ChatApi> ConversationStore<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            auth_token: None,
            state: Mutex::new(ConversationState::default()),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn conversation_id(&self) -> Option<Uuid> {
        self.state.lock().await.conversation_id
    }

    pub async fn has_more_messages(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn title(&self) -> Option<String> {
        self.state.lock().await.title.clone()
    }

    pub async fn total_tokens(&self) -> i64 {
        self.state.lock().await.total_tokens
    }

    /// Pull the most recent conversation for the signed-in recruiter. Any
    /// non-success is treated as "no history yet"; the widget must still
    /// open on a flaky connection.
    pub async fn hydrate(&self, mode: &SessionMode) {
        let recruiter_id = match mode {
            SessionMode::Authenticated { recruiter } => recruiter.id.to_string(),
            // Guests have nothing persisted; unauthenticated users see the
            // empty state.
            _ => {
                self.clear_conversation().await;
                return;
            }
        };

        let params = HistoryParams {
            recruiter_id,
            page_size: Some(DEFAULT_PAGE_SIZE),
            ..Default::default()
        };

        match self.api.fetch_history(&params).await {
            Ok(history) => {
                let mut state = self.state.lock().await;
                state.conversation_id = history.conversation_id;
                state.messages = history.messages;
                state.has_more = history.has_more_messages;
                if let Some(convo) = history.conversation {
                    state.title = Some(convo.title);
                    state.total_tokens = convo.total_tokens;
                }
            }
            Err(e) => {
                debug!("history hydrate failed, starting empty: {}", e);
                self.clear_conversation().await;
            }
        }
    }

    /// Send a message. The user's bubble is appended before the network
    /// call resolves; on failure an apology bubble follows it instead of
    /// rolling anything back. Returns the server response when it arrived.
    pub async fn send_message(&self, mode: &SessionMode, text: &str) -> Option<ChatResponse> {
        let recruiter_id = mode.recruiter_id()?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let conversation_id = {
            let mut state = self.state.lock().await;
            let placeholder_convo = state.conversation_id.unwrap_or(Uuid::nil());
            state.messages.push(Message {
                id: Uuid::new_v4(),
                conversation_id: placeholder_convo,
                role: Role::User,
                content: text.to_string(),
                tokens: 0,
                created_at: Utc::now(),
            });
            state.conversation_id
        };

        let request = ChatRequest {
            message: text.to_string(),
            conversation_id,
            recruiter_id,
            auth_token: self.auth_token.clone(),
        };

        match self.api.send_chat(&request).await {
            Ok(response) => {
                let mut state = self.state.lock().await;
                state.conversation_id = Some(response.conversation_id);
                state.messages.push(Message {
                    id: Uuid::new_v4(),
                    conversation_id: response.conversation_id,
                    role: Role::Assistant,
                    content: response.message.clone(),
                    tokens: response.tokens,
                    created_at: Utc::now(),
                });
                if let Some(meta) = &response.metadata {
                    state.title = Some(meta.title.clone());
                    state.total_tokens = meta.total_tokens;
                }
                Some(response)
            }
            Err(e) => {
                warn!("send failed: {}", e);
                let mut state = self.state.lock().await;
                let convo = state.conversation_id.unwrap_or(Uuid::nil());
                state.messages.push(Message {
                    id: Uuid::new_v4(),
                    conversation_id: convo,
                    role: Role::Assistant,
                    content: SEND_FAILURE_REPLY.to_string(),
                    tokens: 0,
                    created_at: Utc::now(),
                });
                None
            }
        }
    }

    /// Fetch the page strictly older than the oldest held message and
    /// prepend it. No-op for guests and empty conversations.
    pub async fn load_more_messages(&self, mode: &SessionMode) -> bool {
        let recruiter_id = match mode {
            SessionMode::Authenticated { recruiter } => recruiter.id.to_string(),
            _ => return false,
        };

        let (conversation_id, before) = {
            let state = self.state.lock().await;
            let Some(cid) = state.conversation_id else { return false };
            let Some(oldest) = state.messages.first() else { return false };
            (cid, oldest.id)
        };

        let params = HistoryParams {
            recruiter_id,
            conversation_id: Some(conversation_id),
            before: Some(before),
            page_size: Some(DEFAULT_PAGE_SIZE),
        };

        match self.api.fetch_history(&params).await {
            Ok(history) => {
                let mut state = self.state.lock().await;
                let mut merged = history.messages;
                merged.append(&mut state.messages);
                state.messages = merged;
                state.has_more = history.has_more_messages;
                state.has_more
            }
            Err(e) => {
                warn!("load more failed: {}", e);
                false
            }
        }
    }

    /// Drop all local state. Server-side rows are untouched.
    pub async fn clear_conversation(&self) {
        *self.state.lock().await = ConversationState::default();
    }

    /// "New Chat": same as clearing; the server mints a fresh conversation
    /// id on the next send.
    pub async fn start_new_conversation(&self) {
        self.clear_conversation().await;
    }
}

/// Reset the conversation store whenever the session changes shape (sign
/// in/out, guest toggles). Guest conversations live only in memory, so a
/// mode flip always starts clean.
pub fn reset_on_session_events<A: ChatApi + 'static>(
    store: Arc<ConversationStore<A>>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!("session event {:?}, resetting conversation", event);
            store.clear_conversation().await;
        }
    });
}
