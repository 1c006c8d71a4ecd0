//! Persistance SQLite des instantanés de reprise

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, VoiceError},
    ids::{ChannelId, DestinationId},
};

/// État minimal permettant de reconnecter une destination après redémarrage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySnapshot {
    pub destination: DestinationId,
    pub voice_channel: ChannelId,
    pub reading_channels: Vec<ChannelId>,
    pub saved_at: DateTime<Utc>,
}

impl RecoverySnapshot {
    pub fn new(
        destination: DestinationId,
        voice_channel: ChannelId,
        reading_channels: Vec<ChannelId>,
    ) -> Self {
        Self {
            destination,
            voice_channel,
            reading_channels,
            saved_at: Utc::now(),
        }
    }
}

/// Durable storage for [`RecoverySnapshot`]s, one per destination.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stores `snapshot`, replacing any previous one for the same destination.
    async fn insert(&self, snapshot: &RecoverySnapshot) -> Result<()>;

    async fn find_all(&self) -> Result<Vec<RecoverySnapshot>>;

    /// Returns `false` when there was nothing to remove.
    async fn remove(&self, destination: DestinationId) -> Result<bool>;

    async fn remove_all(&self) -> Result<usize>;
}

fn persistence_error(context: &str, err: impl std::fmt::Display) -> VoiceError {
    VoiceError::Persistence(format!("{context}: {err}"))
}

/// Stockage des instantanés dans une base SQLite
pub struct SqliteSnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    /// Ouvre (ou crée) la base à `db_path`
    pub fn new(db_path: &Path) -> Result<Self> {
        // Créer le répertoire parent si nécessaire
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| persistence_error("Failed to create directory", e))?;
        }

        let conn =
            Connection::open(db_path).map_err(|e| persistence_error("Failed to open database", e))?;
        Self::with_connection(conn)
    }

    /// Base en mémoire, perdue à la fermeture
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| persistence_error("Failed to open database", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS recovery_snapshots (
                destination_id INTEGER PRIMARY KEY,
                voice_channel_id INTEGER NOT NULL,
                reading_channel_ids TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| persistence_error("Failed to create recovery_snapshots table", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn insert(&self, snapshot: &RecoverySnapshot) -> Result<()> {
        let reading = serde_json::to_string(&snapshot.reading_channels)
            .map_err(|e| persistence_error("Failed to encode reading channels", e))?;

        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO recovery_snapshots
                (destination_id, voice_channel_id, reading_channel_ids, saved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.destination.get() as i64,
                snapshot.voice_channel.get() as i64,
                reading,
                snapshot.saved_at.to_rfc3339(),
            ],
        )
        .map_err(|e| persistence_error("Failed to save snapshot", e))?;

        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<RecoverySnapshot>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT destination_id, voice_channel_id, reading_channel_ids, saved_at
                 FROM recovery_snapshots ORDER BY destination_id ASC",
            )
            .map_err(|e| persistence_error("Failed to prepare statement", e))?;

        let rows = stmt
            .query_map([], |row| {
                let destination: i64 = row.get(0)?;
                let voice_channel: i64 = row.get(1)?;
                let reading: String = row.get(2)?;
                let saved_at: String = row.get(3)?;
                Ok((destination, voice_channel, reading, saved_at))
            })
            .map_err(|e| persistence_error("Failed to query snapshots", e))?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (destination, voice_channel, reading, saved_at) =
                row.map_err(|e| persistence_error("Failed to read snapshot", e))?;

            let reading_channels: Vec<ChannelId> = serde_json::from_str(&reading)
                .map_err(|e| persistence_error("Failed to decode reading channels", e))?;
            let saved_at = DateTime::parse_from_rfc3339(&saved_at)
                .map_err(|e| persistence_error("Failed to decode snapshot date", e))?
                .with_timezone(&Utc);

            snapshots.push(RecoverySnapshot {
                destination: DestinationId(destination as u64),
                voice_channel: ChannelId(voice_channel as u64),
                reading_channels,
                saved_at,
            });
        }

        Ok(snapshots)
    }

    async fn remove(&self, destination: DestinationId) -> Result<bool> {
        let conn = self.lock();
        let removed = conn
            .execute(
                "DELETE FROM recovery_snapshots WHERE destination_id = ?1",
                params![destination.get() as i64],
            )
            .map_err(|e| persistence_error("Failed to delete snapshot", e))?;
        Ok(removed > 0)
    }

    async fn remove_all(&self) -> Result<usize> {
        let conn = self.lock();
        conn.execute("DELETE FROM recovery_snapshots", [])
            .map_err(|e| persistence_error("Failed to delete snapshots", e))
    }
}
