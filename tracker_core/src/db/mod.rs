//! SQLite-backed relational store.
//!
//! The [`Database`] handle is cheap to clone: clones share one connection
//! behind a mutex, so a handle can be moved into `spawn_blocking` work.
//! Every write publishes the tables it touched; [`Database::observe`] turns
//! a query into a live subscription that re-runs when those tables change.

mod schema;

pub use schema::SCHEMA_VERSION;

use crate::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Tables that can be observed for changes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Categories,
    Exercises,
    Workouts,
    WorkoutExercises,
    WorkoutSets,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Categories,
        Table::Exercises,
        Table::Workouts,
        Table::WorkoutExercises,
        Table::WorkoutSets,
    ];
}

/// A continuously-updated query result
///
/// `borrow()` gives the latest value; `changed().await` waits for the next
/// emission.
pub type Live<T> = watch::Receiver<T>;

/// Shared handle to the tracker database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<Table>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (creating if needed) a database file and migrate it
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!("Opened database at {:?}", path);
        Self::from_connection(conn)
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        })
    }

    /// Run a closure against the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::State("database lock poisoned".into()))?;
        f(&conn)
    }

    /// Run a closure inside a transaction
    ///
    /// The transaction commits only if the closure returns `Ok`; any error
    /// rolls every statement back.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::State("database lock poisoned".into()))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Publish that the given tables changed
    pub fn notify(&self, tables: &[Table]) {
        for table in tables {
            // No receivers is fine: nobody is observing.
            let _ = self.changes.send(*table);
        }
    }

    /// Delete every row from every table, children first
    pub fn clear_all_tables(&self) -> Result<()> {
        self.transaction(|tx| clear_all_tables_in(tx))?;
        self.notify(&Table::ALL);
        tracing::info!("Cleared all tables");
        Ok(())
    }

    /// Subscribe to a query that re-runs whenever one of `tables` changes
    ///
    /// The initial value is computed before returning. Refreshes happen on a
    /// tokio task (must be called inside a runtime) and stop once every
    /// receiver has been dropped. A refresh that fails is logged and the
    /// previous value is kept.
    pub fn observe<T, F>(&self, tables: &[Table], query: F) -> Result<Live<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(&Database) -> Result<T> + Send + Sync + 'static,
    {
        // Subscribe before the first read so no change slips in between.
        let mut changes = self.changes.subscribe();
        let initial = query(self)?;
        let (tx, rx) = watch::channel(initial);

        let tables = tables.to_vec();
        let query = Arc::new(query);
        let db = self.clone();

        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = tx.closed() => break,
                    msg = changes.recv() => msg,
                };

                match msg {
                    Ok(table) if !tables.contains(&table) => continue,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }

                // Coalesce the burst a multi-table write produces.
                loop {
                    match changes.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }

                let db = db.clone();
                let query = Arc::clone(&query);
                match tokio::task::spawn_blocking(move || query(&db)).await {
                    Ok(Ok(value)) => {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => tracing::warn!("Live query refresh failed: {}", e),
                    Err(e) => {
                        tracing::warn!("Live query task failed: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Live query for {:?} stopped", tables);
        });

        Ok(rx)
    }
}

pub(crate) fn clear_all_tables_in(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM workout_sets;
         DELETE FROM workout_exercises;
         DELETE FROM workouts;
         DELETE FROM exercises;
         DELETE FROM categories;",
    )?;
    Ok(())
}
