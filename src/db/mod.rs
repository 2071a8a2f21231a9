pub mod models;
pub mod queries;

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::SHOWS_TABLE;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Table {table} has no {column} column")]
    MissingColumn { table: &'static str, column: &'static str },
}

impl DbError {
    /// Whether the error means the connection itself is unusable, as opposed to
    /// a single statement failing.
    pub fn is_fatal(&self) -> bool {
        use rusqlite::ErrorCode::*;
        match self {
            DbError::NotFound(_) | DbError::MissingColumn { .. } => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                CannotOpen
                    | NotADatabase
                    | DatabaseCorrupt
                    | SystemIoFailure
                    | ReadOnly
                    | DiskFull
                    | PermissionDenied
                    | OutOfMemory
                    | DatabaseBusy
                    | DatabaseLocked
            ),
            DbError::Sqlite(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Columns the tool cannot work without.
const REQUIRED_COLUMNS: &[&str] = &["showid", "showdate", "showurl"];

/// Handle on the shows database. The connection is released when this is
/// dropped or passed to [`Database::close`].
pub struct Database {
    pub conn: Connection,
    /// `repeatshowid` is present, so related shows can be looked up.
    has_repeats: bool,
}

impl Database {
    /// Open an existing database. The schema belongs to the stats site, so
    /// nothing is created here: a missing file or table is an error.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DbError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn)
    }

    /// Wrap an already open connection after checking the shows table.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let columns = table_columns(&conn, SHOWS_TABLE)?;
        for &column in REQUIRED_COLUMNS {
            if !columns.iter().any(|c| c == column) {
                return Err(DbError::MissingColumn { table: SHOWS_TABLE, column });
            }
        }
        let has_repeats = columns.iter().any(|c| c == "repeatshowid");
        if !has_repeats {
            log::warn!("{SHOWS_TABLE} has no repeatshowid column; related shows cannot be found");
        }

        Ok(Self { conn, has_repeats })
    }

    pub fn has_repeats(&self) -> bool {
        self.has_repeats
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| DbError::from(e))
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(columns)
}

/// Schema of the shows table as the stats site lays it out (the subset we touch).
#[cfg(test)]
pub(crate) const TEST_SCHEMA: &str = "
    CREATE TABLE ww_shows (
        showid          INTEGER PRIMARY KEY AUTOINCREMENT,
        showdate        TEXT NOT NULL UNIQUE,
        repeatshowid    INTEGER REFERENCES ww_shows(showid),
        showurl         TEXT
    );
";

#[cfg(test)]
pub(crate) fn test_db() -> Database {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(TEST_SCHEMA).unwrap();
    Database::from_connection(conn).unwrap()
}
