pub mod api;
pub mod conversation;
pub mod session;

pub use api::{ChatApi, ClientError, HistoryParams, HttpChatApi};
pub use conversation::ConversationStore;
pub use session::{AuthProvider, AuthSession, SessionError, SessionEvent, SessionStore};
