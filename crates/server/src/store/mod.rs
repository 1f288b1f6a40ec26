mod conversations;

use carechat_shared::constants::MAX_ATTACHMENTS_PER_MESSAGE;
use carechat_shared::validation;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Attachment, Message, MessageKind, MessagePayload, UserTiny};

/// How many times an append retries when SQLite reports lock or
/// sequence contention before giving up.
const MAX_APPEND_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found")]
    ConversationNotFound,
    #[error("Conversation is no longer active")]
    ConversationInactive,
    #[error("You are not a participant in this conversation")]
    NotParticipant,
    #[error("User not found")]
    UserNotFound,
    #[error("Message not found")]
    MessageNotFound,
    #[error("Not your message")]
    NotSender,
    #[error("Message was deleted")]
    MessageDeleted,
    #[error("Reply target not found in this conversation")]
    BadReplyTo,
    #[error("Attachment not found or already attached")]
    BadAttachment,
    #[error("Operator role required")]
    NotPermitted,
    #[error("{0}")]
    Invalid(String),
    #[error("Database error")]
    Db(#[from] sqlx::Error),
}

/// Outcome of marking a single message read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A receipt was written for the first time.
    Created,
    /// The reader had already seen this message.
    Duplicate,
    /// Senders never get receipts for their own messages.
    OwnMessage,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub reply_to: Option<String>,
    pub attachment_ids: Vec<String>,
}

/// Sole writer for messages, attachments and read receipts. Holds a
/// pool handle; clones share it.
#[derive(Clone)]
pub struct MessageStore {
    db: SqlitePool,
}

impl MessageStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Persists a message and assigns it the next sequence number of its
    /// conversation. The counter bump, the insert, attachment linking and
    /// the sender's own receipt commit atomically; on rollback the counter
    /// reverts with everything else, so the sequence stays gap-free.
    pub async fn append(&self, new: NewMessage) -> Result<MessagePayload, StoreError> {
        let active = sqlx::query_scalar::<_, i64>("SELECT is_active FROM conversations WHERE id = ?")
            .bind(&new.conversation_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::ConversationNotFound)?;
        if active == 0 {
            return Err(StoreError::ConversationInactive);
        }

        if !self.is_participant(&new.conversation_id, &new.sender_id).await? {
            return Err(StoreError::NotParticipant);
        }

        match new.kind {
            MessageKind::File => {
                if new.attachment_ids.is_empty() {
                    return Err(StoreError::Invalid(
                        "File messages need at least one attachment".into(),
                    ));
                }
                if new.attachment_ids.len() > MAX_ATTACHMENTS_PER_MESSAGE {
                    return Err(StoreError::Invalid(format!(
                        "At most {} attachments per message",
                        MAX_ATTACHMENTS_PER_MESSAGE
                    )));
                }
                validation::validate_message_content(&new.content, true)
                    .map_err(StoreError::Invalid)?;
            }
            MessageKind::Text | MessageKind::System => {
                validation::validate_message_content(&new.content, false)
                    .map_err(StoreError::Invalid)?;
            }
        }

        if let Some(reply_to) = &new.reply_to {
            let found = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM messages WHERE id = ? AND conversation_id = ? AND is_deleted = 0",
            )
            .bind(reply_to)
            .bind(&new.conversation_id)
            .fetch_one(&self.db)
            .await?;
            if found == 0 {
                return Err(StoreError::BadReplyTo);
            }
        }

        let mut attempt = 0;
        let message_id = loop {
            match self.try_append(&new).await {
                Ok(id) => break id,
                Err(StoreError::Db(err)) if is_transient(&err) && attempt < MAX_APPEND_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        conversation_id = %new.conversation_id,
                        attempt,
                        "retrying append after write contention"
                    );
                }
                Err(err) => return Err(err),
            }
        };

        self.message_payload(&message_id).await
    }

    async fn try_append(&self, new: &NewMessage) -> Result<String, StoreError> {
        let message_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "UPDATE conversations SET next_seq = next_seq + 1, last_message_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(&new.conversation_id)
        .execute(&mut *tx)
        .await?;

        let seq = sqlx::query_scalar::<_, i64>("SELECT next_seq FROM conversations WHERE id = ?")
            .bind(&new.conversation_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, seq, sender_id, kind, content, reply_to_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message_id)
        .bind(&new.conversation_id)
        .bind(seq)
        .bind(&new.sender_id)
        .bind(new.kind.as_str())
        .bind(&new.content)
        .bind(&new.reply_to)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        // An attachment that is not the sender's unclaimed upload, or that
        // a concurrent append claimed first, fails the whole message; the
        // rollback reverts the counter too.
        for attachment_id in &new.attachment_ids {
            let linked = sqlx::query(
                "UPDATE attachments SET message_id = ? WHERE id = ? AND uploader_id = ? AND message_id IS NULL",
            )
            .bind(&message_id)
            .bind(attachment_id)
            .bind(&new.sender_id)
            .execute(&mut *tx)
            .await?;
            if linked.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::BadAttachment);
            }
        }

        // The sender has trivially seen their own message.
        sqlx::query("INSERT INTO read_receipts (message_id, user_id, read_at) VALUES (?, ?, ?)")
            .bind(&message_id)
            .bind(&new.sender_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message_id)
    }

    /// Loads a message with its sender and attachments, as sent over the
    /// wire. Deleted messages come back with their cleared content.
    pub async fn message_payload(&self, message_id: &str) -> Result<MessagePayload, StoreError> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::MessageNotFound)?;

        let sender = sqlx::query_as::<_, UserTiny>(
            "SELECT id, first_name, last_name FROM users WHERE id = ?",
        )
        .bind(&message.sender_id)
        .fetch_one(&self.db)
        .await?;

        let attachments = sqlx::query_as::<_, Attachment>(
            "SELECT * FROM attachments WHERE message_id = ? ORDER BY created_at",
        )
        .bind(message_id)
        .fetch_all(&self.db)
        .await?;

        Ok(MessagePayload {
            message,
            sender,
            attachments,
        })
    }

    /// Records that `user_id` has read a message. Re-reads and reads of
    /// your own messages are absorbed without error.
    pub async fn mark_read(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<ReadOutcome, StoreError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT sender_id, conversation_id FROM messages WHERE id = ? AND is_deleted = 0",
        )
        .bind(message_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::MessageNotFound)?;

        let (sender_id, conversation_id) = row;

        if sender_id == user_id {
            return Ok(ReadOutcome::OwnMessage);
        }

        if !self.is_participant(&conversation_id, user_id).await? {
            return Err(StoreError::NotParticipant);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let result =
            sqlx::query("INSERT OR IGNORE INTO read_receipts (message_id, user_id, read_at) VALUES (?, ?, ?)")
                .bind(message_id)
                .bind(user_id)
                .bind(&now)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Ok(ReadOutcome::Duplicate);
        }

        self.touch_last_seen(&conversation_id, user_id, &now).await?;
        Ok(ReadOutcome::Created)
    }

    /// Replaces the content of a message. Only the sender may edit, and
    /// deleted messages stay deleted.
    pub async fn edit(
        &self,
        message_id: &str,
        acting_user_id: &str,
        content: &str,
    ) -> Result<MessagePayload, StoreError> {
        validation::validate_message_content(content, false).map_err(StoreError::Invalid)?;

        let row = sqlx::query_as::<_, (String, i64)>(
            "SELECT sender_id, is_deleted FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::MessageNotFound)?;

        if row.0 != acting_user_id {
            return Err(StoreError::NotSender);
        }
        if row.1 != 0 {
            return Err(StoreError::MessageDeleted);
        }

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE messages SET content = ?, edited_at = ? WHERE id = ?")
            .bind(content)
            .bind(&now)
            .bind(message_id)
            .execute(&self.db)
            .await?;

        self.message_payload(message_id).await
    }

    /// Tombstones a message: the row keeps its id and sequence number so
    /// ordering stays continuous, but the content is cleared for good.
    /// Deleting an already deleted message is a no-op.
    pub async fn soft_delete(
        &self,
        message_id: &str,
        acting_user_id: &str,
    ) -> Result<MessagePayload, StoreError> {
        let row = sqlx::query_as::<_, (String, i64)>(
            "SELECT sender_id, is_deleted FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::MessageNotFound)?;

        if row.0 != acting_user_id {
            return Err(StoreError::NotSender);
        }

        if row.1 == 0 {
            sqlx::query("UPDATE messages SET is_deleted = 1, content = '' WHERE id = ?")
                .bind(message_id)
                .execute(&self.db)
                .await?;
        }

        self.message_payload(message_id).await
    }

    /// Registers an uploaded file under the id the blob was stored as.
    /// The size and content type are whatever was derived from the stored
    /// bytes, not what the client declared.
    pub async fn create_attachment_with_id(
        &self,
        id: &str,
        uploader_id: &str,
        filename: &str,
        content_type: &str,
        size: i64,
    ) -> Result<Attachment, StoreError> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO attachments (id, message_id, uploader_id, filename, content_type, size, created_at)
             VALUES (?, NULL, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(uploader_id)
        .bind(filename)
        .bind(content_type)
        .bind(size)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(Attachment {
            id: id.to_string(),
            message_id: None,
            uploader_id: uploader_id.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size,
            created_at: now,
        })
    }

    pub async fn conversation_of_message(
        &self,
        message_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT conversation_id FROM messages WHERE id = ?")
                .bind(message_id)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    pub async fn attachment(&self, id: &str) -> Result<Option<Attachment>, StoreError> {
        Ok(
            sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let msg = db.message();
            msg.contains("locked") || msg.contains("busy") || msg.contains("messages.seq")
        }
        _ => false,
    }
}
