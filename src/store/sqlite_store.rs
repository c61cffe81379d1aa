//! Embedded SQLite store implementing both the checkpoint and the ledger.
use async_trait::async_trait;
use rusqlite::{named_params, params, Connection, OpenFlags, OptionalExtension};
use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::{
    config::ConnectionParams,
    error::{Result, SinkError},
    interaction::{ConfirmationStatus, InteractionRecord},
    store::{
        ensure_storable_height, BatchOutcome, BatchPolicy, CheckpointStore, InteractionLedger,
        RecordFailure,
    },
};

/// Tables:
///   interactions(interaction_id TEXT PRIMARY KEY, ...)   one row per interaction
///   checkpoint(id = 1, last_checked_height INTEGER)      singleton progress row
///
/// `interact_write` is kept as a JSON array. `interaction` must be valid JSON.
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS interactions (
        interaction_id      TEXT PRIMARY KEY NOT NULL CHECK (length(interaction_id) > 0),
        interaction         TEXT NOT NULL CHECK (json_valid(interaction)),
        block_height        INTEGER NOT NULL CHECK (block_height >= 0),
        block_id            TEXT NOT NULL,
        contract_id         TEXT NOT NULL,
        function            TEXT NOT NULL,
        input               TEXT NOT NULL,
        confirmation_status TEXT NOT NULL CHECK (
            confirmation_status IN ('not_processed', 'confirmed', 'corrupted', 'orphaned')
        ),
        interact_write      TEXT NOT NULL DEFAULT '[]' CHECK (json_valid(interact_write))
    );

    CREATE INDEX IF NOT EXISTS interactions_contract_height
        ON interactions (contract_id, block_height);

    CREATE TABLE IF NOT EXISTS checkpoint (
        id                  INTEGER PRIMARY KEY CHECK (id = 1),
        last_checked_height INTEGER NOT NULL CHECK (last_checked_height >= 0)
    );
"#;

const UPSERT_INTERACTION: &str = "
    INSERT INTO interactions (
        interaction_id, interaction, block_height, block_id, contract_id,
        function, input, confirmation_status, interact_write
    ) VALUES (
        :interaction_id, :interaction, :block_height, :block_id, :contract_id,
        :function, :input, :confirmation_status, :interact_write
    )
    ON CONFLICT (interaction_id) DO UPDATE SET
        interaction         = excluded.interaction,
        block_height        = excluded.block_height,
        block_id            = excluded.block_id,
        contract_id         = excluded.contract_id,
        function            = excluded.function,
        input               = excluded.input,
        confirmation_status = excluded.confirmation_status,
        interact_write      = excluded.interact_write";

/// SQLite-backed checkpoint and ledger.
///
/// Clones share one connection behind a mutex, so the same instance can be
/// handed to [`Sink::new`](crate::Sink::new) as both collaborators. Every call
/// runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (and if allowed, creates) the database described by `params`,
    /// checks it answers, and ensures the schema exists.
    ///
    /// # Errors
    /// [`SinkError::ConnectionFailure`] if any of that fails.
    pub fn connect(params: &ConnectionParams) -> Result<Self> {
        let target = params.path.display().to_string();
        let fail = |e: rusqlite::Error| SinkError::ConnectionFailure {
            target: target.clone(),
            reason: e.to_string(),
        };

        let conn = if params.is_in_memory() {
            Connection::open_in_memory().map_err(fail)?
        } else {
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if params.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            Connection::open_with_flags(&params.path, flags).map_err(fail)?
        };

        conn.busy_timeout(Duration::from_millis(params.busy_timeout_ms))
            .map_err(fail)?;
        if params.wal && !params.is_in_memory() {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
                .map_err(fail)?;
        }
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(fail)?;
        conn.execute_batch(SCHEMA).map_err(fail)?;

        info!(db = %target, "connected to interaction store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates/initializes the SQLite file at `path` with default settings.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&ConnectionParams::new(path.as_ref()))
    }

    /// Convenient in-memory store (useful for tests).
    pub fn new_in_memory() -> Result<Self> {
        Self::connect(&ConnectionParams::in_memory())
    }

    /// Looks up a stored interaction by id.
    pub async fn interaction(&self, interaction_id: &str) -> Result<Option<InteractionRecord>> {
        let id = interaction_id.to_owned();
        self.with_session(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT interaction_id, interaction, block_height, block_id, contract_id,
                            function, input, confirmation_status, interact_write
                     FROM interactions WHERE interaction_id = ?1",
                    params![id],
                    row_to_record,
                )
                .optional()?)
        })
        .await
    }

    /// Number of stored interactions.
    pub async fn interaction_count(&self) -> Result<u64> {
        self.with_session(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM interactions", [], |row| {
                row.get::<_, u64>(0)
            })?)
        })
        .await
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_session<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| SinkError::SessionPoisoned)?;
            f(&mut *guard)
        })
        .await?
    }
}

impl From<rusqlite::Error> for SinkError {
    fn from(e: rusqlite::Error) -> Self {
        SinkError::Storage(Box::new(e))
    }
}

fn upsert_one(conn: &Connection, r: &InteractionRecord) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(UPSERT_INTERACTION)?;
    stmt.execute(named_params! {
        ":interaction_id": r.interaction_id,
        ":interaction": r.interaction,
        ":block_height": r.block_height,
        ":block_id": r.block_id,
        ":contract_id": r.contract_id,
        ":function": r.function,
        ":input": r.input,
        ":confirmation_status": r.confirmation_status.as_str(),
        ":interact_write": r.interact_write_json(),
    })?;
    Ok(())
}

/// One record, one transaction.
fn upsert_in_own_tx(conn: &mut Connection, r: &InteractionRecord) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    upsert_one(&tx, r)?;
    tx.commit()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<InteractionRecord> {
    let status: String = row.get(7)?;
    let confirmation_status = status.parse::<ConfirmationStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let writes: String = row.get(8)?;
    let interact_write = serde_json::from_str::<Vec<String>>(&writes).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(InteractionRecord {
        interaction_id: row.get(0)?,
        interaction: row.get(1)?,
        block_height: row.get(2)?,
        block_id: row.get(3)?,
        contract_id: row.get(4)?,
        function: row.get(5)?,
        input: row.get(6)?,
        confirmation_status,
        interact_write,
    })
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn read_height(&self) -> Result<u64> {
        self.with_session(|conn| {
            let height = conn
                .query_row(
                    "SELECT last_checked_height FROM checkpoint WHERE id = 1",
                    [],
                    |row| row.get::<_, u64>(0),
                )
                .optional()?;
            match height {
                Some(h) => {
                    debug!(height = h, "last synced block");
                    Ok(h)
                }
                None => Err(SinkError::NotInitialized),
            }
        })
        .await
    }

    async fn seed_height(&self, height: u64) -> Result<bool> {
        ensure_storable_height(height)?;
        self.with_session(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO checkpoint (id, last_checked_height) VALUES (1, ?1)
                 ON CONFLICT (id) DO NOTHING",
                params![height],
            )?;
            if inserted == 1 {
                info!(height, "checkpoint seeded");
            }
            Ok(inserted == 1)
        })
        .await
    }

    async fn advance_height(&self, height: u64) -> Result<()> {
        self.with_session(move |conn| {
            match conn.execute(
                "UPDATE checkpoint SET last_checked_height = ?1 WHERE id = 1",
                params![height],
            ) {
                Ok(0) => Err(SinkError::NotInitialized),
                Ok(_) => {
                    info!(height, "checkpoint advanced");
                    Ok(())
                }
                Err(e) => {
                    error!(height, error = %e, "error while updating last checked height");
                    Err(SinkError::CheckpointWriteFailure {
                        height,
                        reason: e.to_string(),
                    })
                }
            }
        })
        .await
    }
}

#[async_trait]
impl InteractionLedger for SqliteStore {
    async fn upsert_batch(
        &self,
        records: Vec<InteractionRecord>,
        policy: BatchPolicy,
    ) -> Result<BatchOutcome> {
        self.with_session(move |conn| {
            let mut outcome = BatchOutcome::default();
            match policy {
                BatchPolicy::PerRecord => {
                    for r in records {
                        debug!(interaction_id = %r.interaction_id, "interaction to upsert");
                        match upsert_in_own_tx(conn, &r) {
                            Ok(()) => outcome.committed.push(r.interaction_id),
                            Err(e) => {
                                warn!(interaction_id = %r.interaction_id, error = %e, "rollback");
                                outcome.failed.push(RecordFailure {
                                    interaction_id: r.interaction_id,
                                    reason: e.to_string(),
                                });
                            }
                        }
                    }
                }
                BatchPolicy::WholeBatch => {
                    let tx = conn.transaction()?;
                    for r in records {
                        debug!(interaction_id = %r.interaction_id, "interaction to upsert");
                        if let Err(e) = upsert_one(&tx, &r) {
                            warn!(interaction_id = %r.interaction_id, error = %e, "rollback batch");
                            // dropping `tx` rolls back every earlier record
                            return Err(SinkError::RecordWriteFailure {
                                interaction_id: r.interaction_id,
                                reason: e.to_string(),
                            });
                        }
                        outcome.committed.push(r.interaction_id);
                    }
                    tx.commit()?;
                }
            }
            info!(
                committed = outcome.committed.len(),
                failed = outcome.failed.len(),
                ?policy,
                "interaction batch written"
            );
            Ok(outcome)
        })
        .await
    }
}
