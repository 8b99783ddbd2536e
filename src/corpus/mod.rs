// src/corpus/mod.rs — Corpus persistence

pub mod schema;
pub mod store;

use std::path::Path;

use rusqlite::Connection;

use crate::infra::errors::Result;
pub use store::Store;

/// Open (or create) the corpus database at the given path.
pub fn open(path: &Path) -> Result<Store> {
    let conn = Connection::open(path)?;
    // WAL for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    schema::run_migrations(&conn)?;
    Ok(Store::new(conn))
}

/// Create an in-memory corpus (for testing).
pub fn in_memory() -> Result<Store> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    schema::run_migrations(&conn)?;
    Ok(Store::new(conn))
}
