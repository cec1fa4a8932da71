use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

/// Handle to the libSQL database: local file, in-memory, remote, or a local
/// replica of a remote database.
#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
    busy_timeout_ms: u64,
}

impl Database {
    pub async fn new(config: &DatabaseConfig, dimensions: usize) -> Result<Self> {
        let busy_timeout_ms = std::env::var("DATABASE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5000);

        let is_remote = config.url.starts_with("libsql://") || config.url.starts_with("https://");

        let db = if is_remote {
            if let Some(ref local_path) = config.local_path {
                Builder::new_remote_replica(
                    local_path,
                    config.url.clone(),
                    config.auth_token.clone().unwrap_or_default(),
                )
                .build()
                .await?
            } else {
                Builder::new_remote(
                    config.url.clone(),
                    config.auth_token.clone().unwrap_or_default(),
                )
                .build()
                .await?
            }
        } else if config.url == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        let database = Self {
            db: Arc::new(db),
            busy_timeout_ms,
        };

        if !is_remote {
            database.configure_local().await;
        }
        database.init_schema(dimensions).await?;

        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    async fn configure_local(&self) {
        let conn = match self.connect() {
            Ok(conn) => conn,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to open connection for pragmas");
                return;
            }
        };

        let pragmas = format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        );
        if let Err(error) = conn.execute_batch(&pragmas).await {
            tracing::warn!(
                busy_timeout_ms = self.busy_timeout_ms,
                error = %error,
                "Failed to configure SQLite pragmas"
            );
        }
    }

    async fn init_schema(&self, dimensions: usize) -> Result<()> {
        let conn = self.connect()?;
        schema::init_schema(&conn, dimensions).await
    }

    pub async fn sync(&self) -> Result<()> {
        if let Ok(sync) = self.db.sync().await {
            tracing::info!("Database synced: {:?}", sync);
        }
        Ok(())
    }
}
