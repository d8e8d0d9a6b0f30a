use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{CandidateRecord, ListingRecord};

/// `IFNULL` makes rows with a missing price collide with each other, which a
/// plain `UNIQUE(address, price)` would not do in SQLite.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS houses (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        room_type   TEXT NOT NULL,
        area        REAL,
        floor       TEXT NOT NULL,
        orientation TEXT NOT NULL,
        build_year  INTEGER,
        owner_name  TEXT NOT NULL,
        address     TEXT NOT NULL,
        description TEXT NOT NULL,
        price       REAL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_houses_dedup ON houses(address, IFNULL(price, -1));
    CREATE INDEX IF NOT EXISTS idx_houses_room_type ON houses(room_type);
";

const INSERT_IF_ABSENT: &str = "
    INSERT INTO houses (room_type, area, floor, orientation, build_year, owner_name, address, description, price)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT DO NOTHING
";

const SELECT_ALL: &str = "
    SELECT id, room_type, area, floor, orientation, build_year, owner_name, address, description, price
    FROM houses
    ORDER BY id
";

/// Text columns listings can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    RoomType,
    Floor,
    Orientation,
    OwnerName,
}

impl GroupField {
    fn column(self) -> &'static str {
        match self {
            GroupField::RoomType => "room_type",
            GroupField::Floor => "floor",
            GroupField::Orientation => "orientation",
            GroupField::OwnerName => "owner_name",
        }
    }
}

/// Write-once listing table with `(address, price)` deduplication.
///
/// The connection is behind a mutex, so batches from the scheduler and the
/// API never interleave inside one process. The unique index guards against
/// other writers on the same file.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened listing store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Inserts every candidate whose dedup key is not stored yet, in input order.
    ///
    /// All inserts share one transaction: on any failure nothing is kept and
    /// the error is returned. Returns the number of newly inserted rows.
    pub fn upsert_batch(&self, records: &[CandidateRecord]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare_cached(INSERT_IF_ABSENT)?;
            for record in records {
                let changed = stmt.execute(params![
                    record.room_type,
                    record.area.value(),
                    record.floor,
                    record.orientation,
                    record.build_year.value(),
                    record.owner_name,
                    record.address,
                    record.description,
                    record.price.value(),
                ])?;
                if changed == 0 {
                    debug!("Skipping known listing: {} @ {:?}", record.address, record.price.value());
                }
                inserted += changed;
            }
        }

        tx.commit()?;
        info!(
            "Stored {} new listings ({} already known)",
            inserted,
            records.len() - inserted
        );
        Ok(inserted)
    }

    pub fn list_all(&self) -> Result<Vec<ListingRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(SELECT_ALL)?;
        let rows = stmt.query_map([], listing_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        count_rows(&conn)
    }

    /// Row counts per exact value of `field`.
    pub fn count_by_group(&self, field: GroupField) -> Result<BTreeMap<String, u64>, StoreError> {
        let conn = self.lock()?;
        group_counts(&conn, field)
    }

    /// Total row count and per-group counts read from one snapshot, so the
    /// groups always sum to the total.
    pub fn group_summary(
        &self,
        field: GroupField,
    ) -> Result<(u64, BTreeMap<String, u64>), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let total = count_rows(&tx)?;
        let counts = group_counts(&tx, field)?;
        tx.commit()?;
        Ok((total, counts))
    }
}

fn count_rows(conn: &Connection) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM houses", [], |row| row.get(0))?;
    Ok(count as u64)
}

fn group_counts(conn: &Connection, field: GroupField) -> Result<BTreeMap<String, u64>, StoreError> {
    let sql = format!(
        "SELECT {col}, COUNT(*) FROM houses GROUP BY {col}",
        col = field.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
    })?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (value, count) = row?;
        counts.insert(value, count);
    }
    Ok(counts)
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<ListingRecord> {
    Ok(ListingRecord {
        id: row.get(0)?,
        room_type: row.get(1)?,
        area: row.get(2)?,
        floor: row.get(3)?,
        orientation: row.get(4)?,
        build_year: row.get(5)?,
        owner_name: row.get(6)?,
        address: row.get(7)?,
        description: row.get(8)?,
        price: row.get(9)?,
    })
}
