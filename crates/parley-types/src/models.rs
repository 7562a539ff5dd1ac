use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A site visitor identity. Despite the name this covers guest/demo users
/// too; guests get a synthetic id and never reach the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recruiter {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub company_name: Option<String>,
    pub last_active: DateTime<Utc>,
}

/// An ordered thread of messages tied to one recruiter (or none, for guests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub recruiter_id: Option<Uuid>,
    pub title: String,
    pub last_message_at: DateTime<Utc>,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Append-only chat message. Ordering within a conversation is by
/// `created_at` ascending, message id as tiebreak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub tokens: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Company,
    Job,
    Person,
    Skill,
    Location,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::Job => "job",
            EntityType::Person => "person",
            EntityType::Skill => "skill",
            EntityType::Location => "location",
            EntityType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> EntityType {
        match s {
            "company" => EntityType::Company,
            "job" => EntityType::Job,
            "person" => EntityType::Person,
            "skill" => EntityType::Skill,
            "location" => EntityType::Location,
            _ => EntityType::Other,
        }
    }
}

/// Best-effort structured annotation extracted from a user message.
/// Zero entities for a message is normal, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub value: String,
    pub confidence: f64,
}

/// At most one per recruiter. `resume_requested` is set, not appended,
/// when the chat handler detects resume intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescription {
    pub id: Uuid,
    pub recruiter_id: Uuid,
    pub title: String,
    pub resume_requested: bool,
    pub resume_sent: bool,
}
