use crate::Database;
use crate::models::{ConversationRow, EntityRow, JobDescriptionRow, MessageRow, RecruiterRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Recruiters --

    /// Insert-or-update by email. First sign-in creates the row; later
    /// sign-ins refresh name/company and bump `last_active`.
    pub fn upsert_recruiter(
        &self,
        id: &str,
        email: &str,
        name: &str,
        company_name: Option<&str>,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO recruiters (id, email, name, company_name, last_active)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO UPDATE SET
                     name = excluded.name,
                     company_name = excluded.company_name,
                     last_active = excluded.last_active",
                rusqlite::params![id, email, name, company_name, now],
            )?;
            Ok(())
        })
    }

    pub fn get_recruiter(&self, id: &str) -> Result<Option<RecruiterRow>> {
        self.with_conn(|conn| query_recruiter(conn, id))
    }

    pub fn touch_recruiter_last_active(&self, id: &str, now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE recruiters SET last_active = ?2 WHERE id = ?1",
                rusqlite::params![id, now],
            )?;
            Ok(())
        })
    }

    // -- Conversations --

    pub fn create_conversation(
        &self,
        id: &str,
        recruiter_id: Option<&str>,
        title: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, recruiter_id, title, last_message_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, recruiter_id, title, now],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            query_conversation(
                conn,
                "SELECT id, recruiter_id, title, last_message_at, total_tokens
                 FROM conversations WHERE id = ?1",
                id,
            )
        })
    }

    /// Most recently active conversation for a recruiter, if any.
    pub fn latest_conversation_for_recruiter(
        &self,
        recruiter_id: &str,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            query_conversation(
                conn,
                "SELECT id, recruiter_id, title, last_message_at, total_tokens
                 FROM conversations WHERE recruiter_id = ?1
                 ORDER BY last_message_at DESC LIMIT 1",
                recruiter_id,
            )
        })
    }

    /// Advance `last_message_at` and accumulate token usage after new
    /// messages land. Not atomic with the message insert; a stale
    /// timestamp after a crash is cosmetic and heals on the next message.
    pub fn bump_conversation(&self, id: &str, last_message_at: &str, added_tokens: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE conversations
                 SET last_message_at = ?2, total_tokens = total_tokens + ?3
                 WHERE id = ?1",
                rusqlite::params![id, last_message_at, added_tokens],
            )?;
            Ok(())
        })
    }

    pub fn count_messages(&self, conversation_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        role: &str,
        content: &str,
        tokens: i64,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, tokens, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, role, content, tokens, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, tokens, created_at
                 FROM messages WHERE id = ?1",
            )?;
            let row = stmt.query_row([id], map_message).optional()?;
            Ok(row)
        })
    }

    /// Oldest-first page. Callers pass limit = page size + 1 and treat the
    /// extra row as a "has more" sentinel.
    pub fn get_messages_oldest_first(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, tokens, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Newest `limit` rows, returned oldest-first. Feeds the completion
    /// context, so the cap must truncate from the old end of the thread.
    pub fn get_recent_messages(&self, conversation_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, tokens, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt
                .query_map(rusqlite::params![conversation_id, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Page of messages strictly older than the cursor row, newest first.
    /// The (created_at, id) tuple comparison keeps same-timestamp rows
    /// stable across pages.
    pub fn get_messages_before(
        &self,
        conversation_id: &str,
        cursor_created_at: &str,
        cursor_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, tokens, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                   AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![conversation_id, cursor_created_at, cursor_id, limit],
                    map_message,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Rows older than the given position. Backs `hasMoreMessages` on
    /// cursor pages.
    pub fn count_messages_before(
        &self,
        conversation_id: &str,
        created_at: &str,
        id: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1
                   AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))",
                rusqlite::params![conversation_id, created_at, id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Entities --

    pub fn insert_entity(
        &self,
        id: &str,
        conversation_id: &str,
        message_id: &str,
        entity_type: &str,
        value: &str,
        confidence: f64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO entities (id, conversation_id, message_id, type, value, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, conversation_id, message_id, entity_type, value, confidence],
            )?;
            Ok(())
        })
    }

    pub fn get_entities_for_message(&self, message_id: &str) -> Result<Vec<EntityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, message_id, type, value, confidence
                 FROM entities WHERE message_id = ?1",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(EntityRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        message_id: row.get(2)?,
                        entity_type: row.get(3)?,
                        value: row.get(4)?,
                        confidence: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Job descriptions --

    /// Set `resume_requested` for the recruiter's job description,
    /// inserting the row if none exists. One row per recruiter.
    pub fn upsert_resume_requested(&self, id: &str, recruiter_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO job_descriptions (id, recruiter_id, resume_requested)
                 VALUES (?1, ?2, 1)
                 ON CONFLICT(recruiter_id) DO UPDATE SET resume_requested = 1",
                rusqlite::params![id, recruiter_id],
            )?;
            Ok(())
        })
    }

    pub fn get_job_description(&self, recruiter_id: &str) -> Result<Option<JobDescriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recruiter_id, title, resume_requested, resume_sent
                 FROM job_descriptions WHERE recruiter_id = ?1",
            )?;
            let row = stmt
                .query_row([recruiter_id], |row| {
                    Ok(JobDescriptionRow {
                        id: row.get(0)?,
                        recruiter_id: row.get(1)?,
                        title: row.get(2)?,
                        resume_requested: row.get::<_, i64>(3)? != 0,
                        resume_sent: row.get::<_, i64>(4)? != 0,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }
}

fn map_message(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        tokens: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_recruiter(conn: &Connection, id: &str) -> Result<Option<RecruiterRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, name, company_name, last_active FROM recruiters WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(RecruiterRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                company_name: row.get(3)?,
                last_active: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation(conn: &Connection, sql: &str, param: &str) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row([param], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                recruiter_id: row.get(1)?,
                title: row.get(2)?,
                last_message_at: row.get(3)?,
                total_tokens: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
