use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection, dimensions: usize) -> Result<()> {
    let sql = format!(
        r#"
        -- Cities resolved or generated during chat turns
        CREATE TABLE IF NOT EXISTS cities (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            country TEXT NOT NULL DEFAULT '',
            state_province TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            center_latitude REAL NOT NULL DEFAULT 0,
            center_longitude REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cities_name ON cities(lower(name));

        -- Points of interest with optional vector embedding
        CREATE TABLE IF NOT EXISTS pois (
            id TEXT PRIMARY KEY,
            city_id TEXT NOT NULL,
            name TEXT NOT NULL,
            latitude REAL NOT NULL DEFAULT 0,
            longitude REAL NOT NULL DEFAULT 0,
            category TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            source_interaction_id TEXT,
            embedding F32_BLOB({dimensions}),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_pois_city_id ON pois(city_id);
        CREATE INDEX IF NOT EXISTS idx_pois_city_name ON pois(city_id, lower(name));

        -- Chat sessions; the current itinerary is stored as JSON
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            profile_id TEXT,
            city_name TEXT NOT NULL,
            current_itinerary TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_sessions_user_id ON chat_sessions(user_id);

        -- Conversation history, ordered by insertion
        CREATE TABLE IF NOT EXISTS chat_messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            message_type TEXT NOT NULL DEFAULT 'response',
            timestamp TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_session_id ON chat_messages(session_id);

        -- One record per completed start turn
        CREATE TABLE IF NOT EXISTS interactions (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            profile_id TEXT,
            city_id TEXT,
            domain TEXT NOT NULL,
            prompt TEXT NOT NULL,
            response TEXT NOT NULL,
            poi_ids TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_interactions_session_id ON interactions(session_id);
        "#
    );

    conn.execute_batch(&sql).await?;
    Ok(())
}
