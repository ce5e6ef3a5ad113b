//! SQLite persistence for encoded frames.
//!
//! Schema:
//! - video_frames: id, video_name, frame_number, timestamp, rle
//!
//! `(video_name, frame_number)` is deliberately not unique: reprocessing a
//! video appends a second set of rows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use framerle_proto::proto::StoredFrame;

use crate::video::frame::EncodedFrame;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS video_frames (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    video_name TEXT NOT NULL,
    frame_number INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    rle TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_video_frames_video ON video_frames(video_name, frame_number);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SELECT_COLUMNS: &str = "SELECT id, video_name, frame_number, timestamp, rle FROM video_frames";

/// A persisted frame row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: i64,
    pub video_name: String,
    pub frame_number: u32,
    pub timestamp: String,
    pub rle: String,
}

impl From<StoredRecord> for StoredFrame {
    fn from(r: StoredRecord) -> Self {
        StoredFrame {
            id: r.id,
            video_name: r.video_name,
            frame_number: r.frame_number,
            timestamp: r.timestamp,
            rle: r.rle,
        }
    }
}

/// Handle to the database file. Cheap to clone; every worker opens its own
/// connection through [`FrameStore::connect`].
#[derive(Debug, Clone)]
pub struct FrameStore {
    path: PathBuf,
}

impl FrameStore {
    /// Open or create the database and its schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let store = Self {
            path: path.to_path_buf(),
        };
        let conn = store.connection()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)
            .context("failed to create video_frames schema")?;

        debug!(path = %path.display(), "frame store ready");
        Ok(store)
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("failed to open database {}", self.path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Open a dedicated connection for inserting frames.
    pub fn connect(&self) -> Result<FrameWriter> {
        Ok(FrameWriter {
            conn: self.connection()?,
        })
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.connection()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM video_frames", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// All rows in insertion order.
    pub fn records(&self) -> Result<Vec<StoredRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let rows = stmt.query_map([], map_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read video_frames")
    }

    /// Rows of one video, ordered by frame number then id.
    pub fn records_for_video(&self, video_name: &str) -> Result<Vec<StoredRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE video_name = ?1 ORDER BY frame_number, id"
        ))?;
        let rows = stmt.query_map(params![video_name], map_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to read frames of {video_name}"))
    }

    pub fn record(&self, id: i64) -> Result<Option<StoredRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            map_record,
        )
        .optional()
        .with_context(|| format!("failed to read frame record {id}"))
    }
}

fn map_record(row: &rusqlite::Row) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        video_name: row.get(1)?,
        frame_number: row.get(2)?,
        timestamp: row.get(3)?,
        rle: row.get(4)?,
    })
}

/// Connection owned by a single persistence worker.
pub struct FrameWriter {
    conn: Connection,
}

impl FrameWriter {
    /// Insert one frame in its own transaction and return the new row id.
    pub fn insert(&mut self, frame: &EncodedFrame) -> Result<i64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO video_frames (video_name, frame_number, timestamp, rle)
             VALUES (?1, ?2, ?3, ?4)",
            params![frame.video_name, frame.frame_number, frame.timestamp, frame.rle()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::encoded;

    #[test]
    fn open_creates_schema_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/frames.db");

        let store = FrameStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);

        // Reopening an existing database keeps its rows.
        store.connect().unwrap().insert(&encoded("a.mp4", 0, "1A")).unwrap();
        let reopened = FrameStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn insert_assigns_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::open(&dir.path().join("frames.db")).unwrap();
        let mut writer = store.connect().unwrap();

        let first = writer.insert(&encoded("a.mp4", 0, "4A4B")).unwrap();
        let second = writer.insert(&encoded("a.mp4", 1, "2A2B")).unwrap();
        assert!(second > first);

        let records = store.records_for_video("a.mp4").unwrap();
        assert_eq!(
            records,
            vec![
                StoredRecord {
                    id: first,
                    video_name: "a.mp4".into(),
                    frame_number: 0,
                    timestamp: "0".into(),
                    rle: "4A4B".into(),
                },
                StoredRecord {
                    id: second,
                    video_name: "a.mp4".into(),
                    frame_number: 1,
                    timestamp: "40".into(),
                    rle: "2A2B".into(),
                },
            ]
        );
    }

    #[test]
    fn duplicate_natural_keys_are_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::open(&dir.path().join("frames.db")).unwrap();
        let mut writer = store.connect().unwrap();

        writer.insert(&encoded("a.mp4", 3, "1B")).unwrap();
        writer.insert(&encoded("a.mp4", 3, "1B")).unwrap();

        let records = store.records_for_video("a.mp4").unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn record_lookup_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::open(&dir.path().join("frames.db")).unwrap();
        let id = store.connect().unwrap().insert(&encoded("b.mp4", 5, "9A")).unwrap();

        let record = store.record(id).unwrap().unwrap();
        assert_eq!(record.video_name, "b.mp4");
        assert_eq!(record.rle, "9A");
        assert!(store.record(id + 100).unwrap().is_none());

        let proto: StoredFrame = record.into();
        assert_eq!(proto.frame_number, 5);
    }

    #[test]
    fn concurrent_writers_do_not_lose_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::open(&dir.path().join("frames.db")).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..4u32 {
                let store = store.clone();
                scope.spawn(move || {
                    let mut writer = store.connect().unwrap();
                    for n in 0..25 {
                        writer.insert(&encoded("c.mp4", worker * 100 + n, "1A")).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.count().unwrap(), 100);
    }
}
