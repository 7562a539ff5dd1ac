use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS recruiters (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            name            TEXT NOT NULL,
            company_name    TEXT,
            last_active     TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            recruiter_id    TEXT REFERENCES recruiters(id),
            title           TEXT NOT NULL DEFAULT 'New conversation',
            last_message_at TEXT NOT NULL,
            total_tokens    INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_recruiter
            ON conversations(recruiter_id, last_message_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            role            TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            content         TEXT NOT NULL,
            tokens          INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS entities (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            message_id      TEXT NOT NULL REFERENCES messages(id),
            type            TEXT NOT NULL CHECK (type IN
                ('company', 'job', 'person', 'skill', 'location', 'other')),
            value           TEXT NOT NULL,
            confidence      REAL NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_entities_message
            ON entities(message_id);

        CREATE TABLE IF NOT EXISTS job_descriptions (
            id               TEXT PRIMARY KEY,
            recruiter_id     TEXT NOT NULL UNIQUE REFERENCES recruiters(id),
            title            TEXT NOT NULL DEFAULT '',
            resume_requested INTEGER NOT NULL DEFAULT 0,
            resume_sent      INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
