use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{
    ChatSession, ConversationMessage, GeneratedItinerary, Interaction, PoiIdBackfill,
};

const BACKFILL_ATTEMPTS: usize = 5;

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub struct SessionRepository;

impl SessionRepository {
    pub async fn create(conn: &Connection, session: &ChatSession) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO chat_sessions (
                id, user_id, profile_id, city_name, current_itinerary, status,
                created_at, updated_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                session.id.clone(),
                session.user_id.clone(),
                session.profile_id.clone(),
                session.city_name.clone(),
                Self::itinerary_json(session.current_itinerary.as_ref())?,
                session.status.to_string(),
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ],
        )
        .await?;

        for message in &session.conversation_history {
            Self::add_message(conn, &session.id, message).await?;
        }

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<ChatSession>> {
        let mut rows = conn
            .query(
                "SELECT id, user_id, profile_id, city_name, current_itinerary, status, \
                        created_at, updated_at, expires_at \
                 FROM chat_sessions WHERE id = ?1",
                params![id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let current_itinerary = row
            .get::<Option<String>>(4)?
            .and_then(|raw| serde_json::from_str::<GeneratedItinerary>(&raw).ok());

        let mut session = ChatSession {
            id: row.get(0)?,
            user_id: row.get(1)?,
            profile_id: row.get(2)?,
            city_name: row.get(3)?,
            conversation_history: Vec::new(),
            current_itinerary,
            status: row.get::<String>(5)?.parse().unwrap_or_default(),
            created_at: parse_timestamp(&row.get::<String>(6)?),
            updated_at: parse_timestamp(&row.get::<String>(7)?),
            expires_at: parse_timestamp(&row.get::<String>(8)?),
        };

        session.conversation_history = Self::get_messages(conn, &session.id).await?;
        Ok(Some(session))
    }

    pub async fn update(conn: &Connection, session: &ChatSession) -> Result<()> {
        conn.execute(
            r#"
            UPDATE chat_sessions SET
                city_name = ?2,
                current_itinerary = ?3,
                status = ?4,
                updated_at = ?5,
                expires_at = ?6
            WHERE id = ?1
            "#,
            params![
                session.id.clone(),
                session.city_name.clone(),
                Self::itinerary_json(session.current_itinerary.as_ref())?,
                session.status.to_string(),
                session.updated_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ],
        )
        .await?;

        for message in &session.conversation_history {
            Self::add_message(conn, &session.id, message).await?;
        }

        Ok(())
    }

    /// Compare-and-swap on the stored itinerary JSON: a concurrent writer
    /// makes the update miss, and the patch is reapplied to what it wrote.
    pub async fn backfill_poi_ids(
        conn: &Connection,
        session_id: &str,
        backfill: &PoiIdBackfill,
    ) -> Result<usize> {
        for _ in 0..BACKFILL_ATTEMPTS {
            let mut rows = conn
                .query(
                    "SELECT current_itinerary FROM chat_sessions WHERE id = ?1",
                    params![session_id],
                )
                .await?;
            let Some(row) = rows.next().await? else {
                return Ok(0);
            };
            let Some(raw) = row.get::<Option<String>>(0)? else {
                return Ok(0);
            };
            let Ok(mut itinerary) = serde_json::from_str::<GeneratedItinerary>(&raw) else {
                return Ok(0);
            };

            let filled = itinerary.fill_poi_ids(backfill);
            if filled == 0 {
                return Ok(0);
            }

            let updated = conn
                .execute(
                    "UPDATE chat_sessions SET current_itinerary = ?2 \
                     WHERE id = ?1 AND current_itinerary = ?3",
                    params![session_id, serde_json::to_string(&itinerary)?, raw],
                )
                .await?;
            if updated > 0 {
                return Ok(filled);
            }
        }

        tracing::warn!(session_id, "Gave up back-filling POI ids under contention");
        Ok(0)
    }

    /// Idempotent by message id.
    pub async fn add_message(
        conn: &Connection,
        session_id: &str,
        message: &ConversationMessage,
    ) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR IGNORE INTO chat_messages (id, session_id, role, content, message_type, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                message.id.clone(),
                session_id,
                message.role.to_string(),
                message.content.clone(),
                message.message_type.to_string(),
                message.timestamp.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    async fn get_messages(conn: &Connection, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let mut rows = conn
            .query(
                "SELECT id, role, content, message_type, timestamp \
                 FROM chat_messages WHERE session_id = ?1 ORDER BY rowid ASC",
                params![session_id],
            )
            .await?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await? {
            let role = match row.get::<String>(1)?.parse() {
                Ok(role) => role,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping message with unknown role");
                    continue;
                }
            };
            messages.push(ConversationMessage {
                id: row.get(0)?,
                role,
                content: row.get(2)?,
                message_type: row.get::<String>(3)?.parse().unwrap_or_default(),
                timestamp: parse_timestamp(&row.get::<String>(4)?),
            });
        }
        Ok(messages)
    }

    pub async fn save_interaction(conn: &Connection, interaction: &Interaction) -> Result<String> {
        conn.execute(
            r#"
            INSERT INTO interactions (
                id, session_id, user_id, profile_id, city_id, domain, prompt, response,
                poi_ids, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                interaction.id.clone(),
                interaction.session_id.clone(),
                interaction.user_id.clone(),
                interaction.profile_id.clone(),
                interaction.city_id.clone(),
                interaction.domain.to_string(),
                interaction.prompt.clone(),
                interaction.response.clone(),
                serde_json::to_string(&interaction.poi_ids)?,
                interaction.created_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(interaction.id.clone())
    }

    fn itinerary_json(itinerary: Option<&GeneratedItinerary>) -> Result<Option<String>> {
        Ok(itinerary.map(serde_json::to_string).transpose()?)
    }
}
