// Database layer - SQLite connection, migrations, catalog queries
// Browsing, play history, playlists, preference weights and users live in the
// submodules as further `impl Database` blocks over the same connection.

pub mod catalog;
pub mod history;
pub mod playlists;
pub mod preferences;
pub mod users;

pub use catalog::{AlbumSummary, ArtistSummary, Cover, TrackQuery, TrackSort};
pub use history::HistoryEntry;
pub use playlists::{Playlist, PlaylistEntry};
pub use preferences::{Affinity, PreferenceProfile};
pub use users::User;

use rand::seq::SliceRandom;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Result, Row, Transaction,
    TransactionBehavior,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Upper bound on bound parameters per `IN (...)` query. SQLite builds differ
/// in their limit, so id lookups are chunked well below the smallest one.
const MAX_BATCH_PARAMS: usize = 500;

const TRACK_COLUMNS: &str = "id, title, artist, album, duration, track_number, genre, year,
                             file_path, file_name, created_at";

/// Represents a track in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Seconds
    pub duration: f64,
    pub track_number: Option<i32>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    /// Relative to the library root
    pub file_path: String,
    pub file_name: String,
    pub created_at: Option<String>,
}

/// Which part of the catalog a sample is drawn from
#[derive(Debug, Clone, Copy)]
pub enum TrackFilter<'a> {
    Any,
    Artists(&'a [String]),
    Genres(&'a [String]),
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and configure the connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Database { conn })
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Database { conn })
    }

    /// How long a statement waits on a locked database before failing with `SQLITE_BUSY`
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)
    }

    /// Run migrations to set up the database schema.
    /// Safe to re-run on each start.
    pub fn run_migrations(&self) -> Result<()> {
        let migration_001 = include_str!("migrations/001_init.sql");
        self.conn.execute_batch(migration_001)?;

        // Migration 002: soft-delete flag, covers, playlists.
        // ALTER TABLE is not idempotent, so check for the column first.
        let has_missing: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('tracks') WHERE name = 'missing'",
            [],
            |row| row.get(0),
        )?;
        if !has_missing {
            let migration_002 = include_str!("migrations/002_library.sql");
            self.conn.execute_batch(migration_002)?;
        }

        Ok(())
    }

    /// Start a write transaction on the shared connection.
    /// Statements issued through `self` until commit belong to it; dropping the
    /// returned guard without committing rolls everything back.
    /// IMMEDIATE takes the write lock up front so the busy timeout applies
    /// instead of failing on a read-to-write upgrade.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
    }

    // --- Catalog writes (scanner) ---

    /// Insert a new track
    pub fn create_track(&self, track: &Track) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tracks (
                id, title, artist, album, duration, track_number, genre, year,
                file_path, file_name
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                track.id,
                track.title,
                track.artist,
                track.album,
                track.duration,
                track.track_number,
                track.genre,
                track.year,
                track.file_path,
                track.file_name,
            ],
        )?;
        Ok(())
    }

    /// Flag a track whose file is gone, or clear the flag when it comes back.
    /// Tracks are never deleted, so history rows always resolve.
    pub fn set_track_missing(&self, id: &str, missing: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE tracks SET missing = ? WHERE id = ?",
            params![missing, id],
        )?;
        Ok(())
    }

    /// All (id, file_path, missing) rows, for reconciling the catalog with the filesystem
    pub fn get_all_file_paths(&self) -> Result<Vec<(String, String, bool)>> {
        let mut stmt = self.conn.prepare("SELECT id, file_path, missing FROM tracks")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect()
    }

    // --- Catalog reads ---

    /// Read a track by ID, including one whose file has gone missing
    pub fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?");
        self.conn
            .query_row(&sql, [id], track_from_row)
            .optional()
    }

    /// Read a track by ID if its file is still in the library
    pub fn get_available_track(&self, id: &str) -> Result<Option<Track>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ? AND missing = 0");
        self.conn
            .query_row(&sql, [id], track_from_row)
            .optional()
    }

    /// Count tracks currently in the library
    pub fn count_tracks(&self) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE missing = 0",
            [],
            |row| row.get(0),
        )
    }

    /// Fetch tracks by ID, in the order the IDs were given.
    /// IDs that no longer exist are dropped.
    pub fn get_tracks_by_ids(&self, ids: &[String]) -> Result<Vec<Track>> {
        let mut found: HashMap<String, Track> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_BATCH_PARAMS) {
            let sql = format!(
                "SELECT {TRACK_COLUMNS} FROM tracks WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), track_from_row)?;
            for track in rows {
                let track = track?;
                found.insert(track.id.clone(), track);
            }
        }

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// IDs of every available track matching `filter`, in id order
    pub fn candidate_track_ids(&self, filter: TrackFilter<'_>) -> Result<Vec<String>> {
        let (sql, values): (String, &[String]) = match filter {
            TrackFilter::Any => (
                "SELECT id FROM tracks WHERE missing = 0 ORDER BY id".to_string(),
                &[],
            ),
            TrackFilter::Artists(artists) => (
                format!(
                    "SELECT id FROM tracks WHERE missing = 0 AND artist IN ({}) ORDER BY id",
                    placeholders(artists.len())
                ),
                artists,
            ),
            TrackFilter::Genres(genres) => (
                format!(
                    "SELECT id FROM tracks WHERE missing = 0 AND genre IN ({}) ORDER BY id",
                    placeholders(genres.len())
                ),
                genres,
            ),
        };

        // `IN ()` is not valid SQL; an empty key set simply matches nothing.
        if values.is_empty() && !matches!(filter, TrackFilter::Any) {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get(0))?;
        rows.collect()
    }

    /// Uniform random sample (without replacement) of up to `count` tracks
    /// matching `filter`, skipping every ID in `exclude`.
    pub fn sample_tracks(
        &self,
        filter: TrackFilter<'_>,
        count: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Track>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<String> = self
            .candidate_track_ids(filter)?
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .collect();

        let picked: Vec<String> = candidates
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect();

        self.get_tracks_by_ids(&picked)
    }
}

/// `?, ?, ?` with `n` markers
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn track_from_row(row: &Row<'_>) -> Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        duration: row.get(4)?,
        track_number: row.get(5)?,
        genre: row.get(6)?,
        year: row.get(7)?,
        file_path: row.get(8)?,
        file_name: row.get(9)?,
        created_at: row.get(10)?,
    })
}
