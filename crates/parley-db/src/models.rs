/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct RecruiterRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub company_name: Option<String>,
    pub last_active: String,
}

pub struct ConversationRow {
    pub id: String,
    pub recruiter_id: Option<String>,
    pub title: String,
    pub last_message_at: String,
    pub total_tokens: i64,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub tokens: i64,
    pub created_at: String,
}

pub struct EntityRow {
    pub id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
}

pub struct JobDescriptionRow {
    pub id: String,
    pub recruiter_id: String,
    pub title: String,
    pub resume_requested: bool,
    pub resume_sent: bool,
}
