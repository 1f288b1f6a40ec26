use carechat_shared::validation;
use uuid::Uuid;

use super::{MessageStore, StoreError};
use crate::models::{
    Attachment, AttachmentWithUploader, AuthUser, Conversation, ConversationSummary, Message,
    MessagePayload, ParticipantInfo, UserTiny,
};

impl MessageStore {
    /// Opens the conversation between a patient and a doctor, reusing the
    /// active one when it already exists. The creator joins as operator
    /// when they are neither of the pair.
    pub async fn open_conversation(
        &self,
        patient_id: &str,
        doctor_id: &str,
        created_by: &AuthUser,
        title: Option<&str>,
    ) -> Result<(Conversation, bool), StoreError> {
        if let Some(title) = title {
            validation::validate_conversation_title(title).map_err(StoreError::Invalid)?;
        }

        for user_id in [patient_id, doctor_id] {
            let found = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE id = ? AND is_active = 1",
            )
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
            if found == 0 {
                return Err(StoreError::UserNotFound);
            }
        }

        if let Some(existing) = self.active_pair(patient_id, doctor_id).await? {
            self.seed_participants(&existing, created_by).await?;
            return Ok((existing, false));
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            "INSERT INTO conversations (id, title, patient_id, doctor_id, created_by, is_active, next_seq, created_at)
             VALUES (?, ?, ?, ?, ?, 1, 0, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(patient_id)
        .bind(doctor_id)
        .bind(&created_by.id)
        .bind(&now)
        .execute(self.pool())
        .await;

        let conversation = match inserted {
            Ok(_) => sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
                .bind(&id)
                .fetch_one(self.pool())
                .await?,
            // Lost the race against a concurrent open for the same pair:
            // the partial unique index rejected the insert, so reuse the row
            // that won.
            Err(err) => match self.active_pair(patient_id, doctor_id).await? {
                Some(existing) => {
                    self.seed_participants(&existing, created_by).await?;
                    return Ok((existing, false));
                }
                None => return Err(StoreError::Db(err)),
            },
        };

        self.seed_participants(&conversation, created_by).await?;
        Ok((conversation, true))
    }

    async fn active_pair(
        &self,
        patient_id: &str,
        doctor_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE patient_id = ? AND doctor_id = ? AND is_active = 1",
        )
        .bind(patient_id)
        .bind(doctor_id)
        .fetch_optional(self.pool())
        .await?)
    }

    async fn seed_participants(
        &self,
        conversation: &Conversation,
        created_by: &AuthUser,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut members = vec![
            (conversation.patient_id.as_str(), "patient"),
            (conversation.doctor_id.as_str(), "doctor"),
        ];
        if created_by.id != conversation.patient_id && created_by.id != conversation.doctor_id {
            members.push((created_by.id.as_str(), "operator"));
        }

        for (user_id, role) in members {
            sqlx::query(
                "INSERT OR IGNORE INTO participants (id, conversation_id, user_id, role, joined_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&conversation.id)
            .bind(user_id)
            .bind(role)
            .bind(&now)
            .execute(self.pool())
            .await?;
        }

        Ok(())
    }

    pub async fn conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn is_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM participants WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(found > 0)
    }

    /// Gate for joining a live session: the conversation must exist, be
    /// active, and the user must already be a durable participant.
    pub async fn check_join(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let conversation = self
            .conversation(conversation_id)
            .await?
            .ok_or(StoreError::ConversationNotFound)?;
        if conversation.is_active == 0 {
            return Err(StoreError::ConversationInactive);
        }
        if !self.is_participant(conversation_id, user_id).await? {
            return Err(StoreError::NotParticipant);
        }
        Ok(())
    }

    pub async fn participants_of(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ParticipantInfo>, StoreError> {
        Ok(sqlx::query_as::<_, ParticipantInfo>(
            "SELECT p.user_id, p.role, u.first_name, u.last_name, p.joined_at, p.is_muted, p.last_seen_at
             FROM participants p
             JOIN users u ON u.id = p.user_id
             WHERE p.conversation_id = ?
             ORDER BY p.joined_at",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// Active conversations for a user, most recently touched first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT c.* FROM conversations c
             JOIN participants p ON p.conversation_id = c.id
             WHERE p.user_id = ? AND c.is_active = 1
             ORDER BY c.last_message_at DESC, c.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            summaries.push(self.summarize(conversation, user_id).await?);
        }
        Ok(summaries)
    }

    pub async fn summary_for(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<ConversationSummary, StoreError> {
        let conversation = self
            .conversation(conversation_id)
            .await?
            .ok_or(StoreError::ConversationNotFound)?;
        self.summarize(conversation, user_id).await
    }

    async fn summarize(
        &self,
        conversation: Conversation,
        user_id: &str,
    ) -> Result<ConversationSummary, StoreError> {
        let participants = self.participants_of(&conversation.id).await?;
        let last_message_preview = self.last_message_preview(&conversation.id).await?;
        let unread_count = self.unread_count(&conversation.id, user_id).await?;

        Ok(ConversationSummary {
            conversation,
            participants,
            last_message_preview,
            unread_count,
        })
    }

    /// Preview of the latest message that is still visible. Deleted
    /// messages never surface here.
    async fn last_message_preview(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT id, kind, content FROM messages
             WHERE conversation_id = ? AND is_deleted = 0
             ORDER BY seq DESC LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(self.pool())
        .await?;

        let Some((message_id, kind, content)) = row else {
            return Ok(None);
        };

        if kind == "file" {
            let filename = sqlx::query_scalar::<_, String>(
                "SELECT filename FROM attachments WHERE message_id = ? ORDER BY created_at LIMIT 1",
            )
            .bind(&message_id)
            .fetch_optional(self.pool())
            .await?;
            return Ok(Some(filename.unwrap_or_else(|| "File".into())));
        }

        Ok(Some(content.chars().take(80).collect()))
    }

    /// Messages someone else sent that this user has no receipt for.
    pub async fn unread_count(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages m
             WHERE m.conversation_id = ? AND m.sender_id != ? AND m.is_deleted = 0
             AND NOT EXISTS (
                 SELECT 1 FROM read_receipts r WHERE r.message_id = m.id AND r.user_id = ?
             )",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?)
    }

    /// Messages after a known sequence number, oldest first. Deleted
    /// messages are included as tombstones so clients resuming from
    /// `since_seq` see an unbroken sequence.
    pub async fn history_since(
        &self,
        conversation_id: &str,
        since_seq: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessagePayload>, StoreError> {
        let limit = limit.clamp(1, 100);

        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = ? AND seq > ? ORDER BY seq LIMIT ?",
        )
        .bind(conversation_id)
        .bind(since_seq.unwrap_or(0))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let message_ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        let placeholders = message_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");

        let query = format!(
            "SELECT * FROM attachments WHERE message_id IN ({}) ORDER BY created_at",
            placeholders
        );
        let mut attachments_query = sqlx::query_as::<_, Attachment>(&query);
        for id in &message_ids {
            attachments_query = attachments_query.bind(*id);
        }
        let attachments = attachments_query.fetch_all(self.pool()).await?;

        let mut sender_ids: Vec<&str> = messages.iter().map(|m| m.sender_id.as_str()).collect();
        sender_ids.sort_unstable();
        sender_ids.dedup();
        let placeholders = sender_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");

        let query = format!(
            "SELECT id, first_name, last_name FROM users WHERE id IN ({})",
            placeholders
        );
        let mut senders_query = sqlx::query_as::<_, UserTiny>(&query);
        for id in &sender_ids {
            senders_query = senders_query.bind(*id);
        }
        let senders = senders_query.fetch_all(self.pool()).await?;

        let payloads = messages
            .into_iter()
            .map(|message| {
                let sender = senders
                    .iter()
                    .find(|s| s.id == message.sender_id)
                    .cloned()
                    .unwrap_or_else(|| UserTiny {
                        id: message.sender_id.clone(),
                        first_name: String::new(),
                        last_name: String::new(),
                    });
                let attachments = attachments
                    .iter()
                    .filter(|a| a.message_id.as_deref() == Some(message.id.as_str()))
                    .cloned()
                    .collect();
                MessagePayload {
                    message,
                    sender,
                    attachments,
                }
            })
            .collect();

        Ok(payloads)
    }

    /// Writes receipts for every unread message from other senders in one
    /// statement. Returns how many were new.
    pub async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<i64, StoreError> {
        if !self.is_participant(conversation_id, user_id).await? {
            return Err(StoreError::NotParticipant);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO read_receipts (message_id, user_id, read_at)
             SELECT m.id, ?, ? FROM messages m
             WHERE m.conversation_id = ? AND m.sender_id != ? AND m.is_deleted = 0",
        )
        .bind(user_id)
        .bind(&now)
        .bind(conversation_id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        let marked = result.rows_affected() as i64;
        if marked > 0 {
            self.touch_last_seen(conversation_id, user_id, &now).await?;
        }
        Ok(marked)
    }

    pub async fn touch_last_seen(
        &self,
        conversation_id: &str,
        user_id: &str,
        timestamp: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE participants SET last_seen_at = ? WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(timestamp)
        .bind(conversation_id)
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_muted(
        &self,
        conversation_id: &str,
        user_id: &str,
        muted: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE participants SET is_muted = ? WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(muted as i64)
        .bind(conversation_id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotParticipant);
        }
        Ok(())
    }

    /// Closes a conversation. Staff only. Existing live sessions are not
    /// torn down, but new joins and new messages are refused from here on.
    pub async fn deactivate(
        &self,
        conversation_id: &str,
        acting: &AuthUser,
    ) -> Result<(), StoreError> {
        if !acting.role.is_staff() {
            return Err(StoreError::NotPermitted);
        }

        let result = sqlx::query("UPDATE conversations SET is_active = 0 WHERE id = ?")
            .bind(conversation_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound);
        }
        Ok(())
    }

    /// Participants who should get an out-of-band nudge about a new
    /// message: everyone except the sender who has not muted the room.
    /// Whether they are online is for the caller to decide.
    pub async fn notifiable_participants(
        &self,
        conversation_id: &str,
        exclude_user_id: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        Ok(sqlx::query_as::<_, (String, String)>(
            "SELECT u.id, u.phone FROM participants p
             JOIN users u ON u.id = p.user_id
             WHERE p.conversation_id = ? AND p.user_id != ? AND p.is_muted = 0 AND u.is_active = 1",
        )
        .bind(conversation_id)
        .bind(exclude_user_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// All attachments shared in a conversation, newest first. Files on
    /// deleted messages are hidden with the message.
    pub async fn conversation_files(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<AttachmentWithUploader>, StoreError> {
        Ok(sqlx::query_as::<_, AttachmentWithUploader>(
            "SELECT a.id, a.message_id, a.filename, a.content_type, a.size, a.created_at,
                    a.uploader_id, u.first_name AS uploader_first_name, u.last_name AS uploader_last_name
             FROM attachments a
             JOIN messages m ON m.id = a.message_id
             JOIN users u ON u.id = a.uploader_id
             WHERE m.conversation_id = ? AND m.is_deleted = 0
             ORDER BY a.created_at DESC",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await?)
    }
}
