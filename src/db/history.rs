// Play history - append-only log of (user, track, played_at)

use rusqlite::{params, Result};
use std::collections::HashSet;

use super::{track_from_row, Database, Track};

/// One play event
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Autoincrement key; breaks ties between equal timestamps
    pub id: i64,
    pub user_id: String,
    pub track_id: String,
    /// RFC 3339, UTC, millisecond precision
    pub played_at: String,
}

impl Database {
    /// Append a play event. Returns the new entry's ID.
    pub fn append_history(&self, user_id: &str, track_id: &str, played_at: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO user_history (user_id, track_id, played_at) VALUES (?, ?, ?)",
            params![user_id, track_id, played_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent entries first, each joined with the track's current metadata
    pub fn recent_history(&self, user_id: &str, limit: i64) -> Result<Vec<(HistoryEntry, Track)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.title, t.artist, t.album, t.duration, t.track_number, t.genre, t.year,
                    t.file_path, t.file_name, t.created_at,
                    h.id, h.user_id, h.played_at
             FROM user_history h
             JOIN tracks t ON t.id = h.track_id
             WHERE h.user_id = ?
             ORDER BY h.played_at DESC, h.id DESC
             LIMIT ?",
        )?;

        let rows = stmt.query_map(params![user_id, limit], |row| {
            let track = track_from_row(row)?;
            let entry = HistoryEntry {
                id: row.get(11)?,
                user_id: row.get(12)?,
                track_id: track.id.clone(),
                played_at: row.get(13)?,
            };
            Ok((entry, track))
        })?;

        rows.collect()
    }

    /// Track IDs of the `limit` most recent entries, de-duplicated, newest first
    pub fn recent_track_ids(&self, user_id: &str, limit: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id FROM user_history
             WHERE user_id = ?
             ORDER BY played_at DESC, id DESC
             LIMIT ?",
        )?;

        let rows = stmt.query_map(params![user_id, limit], |row| row.get::<_, String>(0))?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for id in rows {
            let id = id?;
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Number of history entries for a user
    pub fn count_history(&self, user_id: &str) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM user_history WHERE user_id = ?",
            [user_id],
            |row| row.get(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    #[test]
    fn test_append_and_count() {
        let db = test_db();
        insert_track(&db, "t1", Some("A"), None);

        assert_eq!(db.count_history("u1").unwrap(), 0);
        let first = db.append_history("u1", "t1", "2024-01-01T00:00:00.000Z").unwrap();
        let second = db.append_history("u1", "t1", "2024-01-01T00:00:01.000Z").unwrap();

        assert!(second > first);
        assert_eq!(db.count_history("u1").unwrap(), 2);
        assert_eq!(db.count_history("u2").unwrap(), 0);
    }

    #[test]
    fn test_append_unknown_track_fails() {
        let db = test_db();
        assert!(db.append_history("u1", "ghost", "2024-01-01T00:00:00.000Z").is_err());
        assert_eq!(db.count_history("u1").unwrap(), 0);
    }

    #[test]
    fn test_recent_history_is_newest_first() {
        let db = test_db();
        for id in ["a", "b", "c"] {
            insert_track(&db, id, None, None);
        }
        db.append_history("u1", "a", "2024-01-01T00:00:00.000Z").unwrap();
        db.append_history("u1", "c", "2024-01-03T00:00:00.000Z").unwrap();
        db.append_history("u1", "b", "2024-01-02T00:00:00.000Z").unwrap();

        let history = db.recent_history("u1", 10).unwrap();
        let order: Vec<&str> = history.iter().map(|(e, _)| e.track_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
        assert_eq!(history[0].1.title, "Title c");
        assert_eq!(history[0].0.played_at, "2024-01-03T00:00:00.000Z");
    }

    #[test]
    fn test_equal_timestamps_fall_back_to_insertion_order() {
        let db = test_db();
        for id in ["a", "b", "c"] {
            insert_track(&db, id, None, None);
        }
        let ts = "2024-01-01T00:00:00.000Z";
        db.append_history("u1", "a", ts).unwrap();
        db.append_history("u1", "b", ts).unwrap();
        db.append_history("u1", "c", ts).unwrap();

        let history = db.recent_history("u1", 10).unwrap();
        let order: Vec<&str> = history.iter().map(|(e, _)| e.track_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_recent_history_limit_and_user_isolation() {
        let db = test_db();
        insert_track(&db, "a", None, None);
        for i in 0..5 {
            db.append_history("u1", "a", &format!("2024-01-01T00:00:0{}.000Z", i)).unwrap();
        }
        db.append_history("u2", "a", "2024-01-02T00:00:00.000Z").unwrap();

        assert_eq!(db.recent_history("u1", 3).unwrap().len(), 3);
        assert_eq!(db.recent_history("u2", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_recent_track_ids_dedupes_within_window() {
        let db = test_db();
        for id in ["a", "b", "c"] {
            insert_track(&db, id, None, None);
        }
        db.append_history("u1", "c", "2024-01-01T00:00:00.000Z").unwrap();
        db.append_history("u1", "a", "2024-01-01T00:00:01.000Z").unwrap();
        db.append_history("u1", "b", "2024-01-01T00:00:02.000Z").unwrap();
        db.append_history("u1", "a", "2024-01-01T00:00:03.000Z").unwrap();

        assert_eq!(db.recent_track_ids("u1", 10).unwrap(), vec!["a", "b", "c"]);
        // Window covers the 3 newest entries (a, b, a), not 3 distinct tracks
        assert_eq!(db.recent_track_ids("u1", 3).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_history_outlives_missing_track() {
        let db = test_db();
        insert_track(&db, "a", None, None);
        db.append_history("u1", "a", "2024-01-01T00:00:00.000Z").unwrap();

        db.set_track_missing("a", true).unwrap();
        assert_eq!(db.count_history("u1").unwrap(), 1);

        let history = db.recent_history("u1", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].1.title, "Title a");
        assert_eq!(db.recent_track_ids("u1", 10).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_tracks_with_history_cannot_be_deleted() {
        let db = test_db();
        insert_track(&db, "a", None, None);
        db.append_history("u1", "a", "2024-01-01T00:00:00.000Z").unwrap();

        assert!(db.conn.execute("DELETE FROM tracks WHERE id = 'a'", []).is_err());
        assert_eq!(db.count_history("u1").unwrap(), 1);
    }
}
