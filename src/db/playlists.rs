// Playlists - per-user ordered track lists
// Entries of a track whose file went missing are kept but not listed, so they
// come back if a later scan finds the file again.

use rusqlite::{params, OptionalExtension, Result, Row};

use super::{track_from_row, Database, Track};

/// A playlist owned by one user
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Available tracks only
    pub track_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// One track in a playlist
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub position: i64,
    pub added_at: String,
    pub track: Track,
}

const PLAYLIST_SELECT: &str = "SELECT p.id, p.user_id, p.name,
        (SELECT COUNT(*) FROM playlist_tracks pt
         JOIN tracks t ON t.id = pt.track_id
         WHERE pt.playlist_id = p.id AND t.missing = 0),
        p.created_at, p.updated_at
     FROM playlists p";

fn playlist_from_row(row: &Row<'_>) -> Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        track_count: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl Database {
    /// Create an empty playlist for `user_id`
    pub fn create_playlist(&self, user_id: &str, name: &str) -> Result<Playlist> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO playlists (id, user_id, name) VALUES (?, ?, ?)",
            params![id, user_id, name],
        )?;
        self.get_playlist(user_id, &id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// A user's playlists, most recently changed first
    pub fn list_playlists(&self, user_id: &str) -> Result<Vec<Playlist>> {
        let sql = format!(
            "{PLAYLIST_SELECT} WHERE p.user_id = ? ORDER BY p.updated_at DESC, p.rowid DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], playlist_from_row)?;
        rows.collect()
    }

    /// Read a playlist; None if it does not exist or belongs to someone else
    pub fn get_playlist(&self, user_id: &str, id: &str) -> Result<Option<Playlist>> {
        let sql = format!("{PLAYLIST_SELECT} WHERE p.id = ? AND p.user_id = ?");
        self.conn
            .query_row(&sql, params![id, user_id], playlist_from_row)
            .optional()
    }

    /// Rename a playlist. Returns false if the user has no such playlist.
    pub fn rename_playlist(&self, user_id: &str, id: &str, name: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE playlists
             SET name = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ? AND user_id = ?",
            params![name, id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete a playlist and its entries. Returns false if the user has no such playlist.
    pub fn delete_playlist(&self, user_id: &str, id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM playlists WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Available tracks in a playlist, in insertion order
    pub fn get_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.title, t.artist, t.album, t.duration, t.track_number, t.genre, t.year,
                    t.file_path, t.file_name, t.created_at,
                    pt.position, pt.added_at
             FROM playlist_tracks pt
             JOIN tracks t ON t.id = pt.track_id
             WHERE pt.playlist_id = ? AND t.missing = 0
             ORDER BY pt.position, pt.id",
        )?;

        let rows = stmt.query_map([playlist_id], |row| {
            Ok(PlaylistEntry {
                track: track_from_row(row)?,
                position: row.get(11)?,
                added_at: row.get(12)?,
            })
        })?;

        rows.collect()
    }

    /// Append a track to a playlist. Returns false if it was already there.
    pub fn add_track_to_playlist(&self, playlist_id: &str, track_id: &str) -> Result<bool> {
        let max_pos: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) FROM playlist_tracks WHERE playlist_id = ?",
            [playlist_id],
            |row| row.get(0),
        )?;

        let added = self.conn.execute(
            "INSERT OR IGNORE INTO playlist_tracks (playlist_id, track_id, position) VALUES (?, ?, ?)",
            params![playlist_id, track_id, max_pos + 1],
        )?;
        if added > 0 {
            self.touch_playlist(playlist_id)?;
        }
        Ok(added > 0)
    }

    /// Remove a track from a playlist. Returns false if it was not there.
    pub fn remove_track_from_playlist(&self, playlist_id: &str, track_id: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?",
            params![playlist_id, track_id],
        )?;
        if removed > 0 {
            self.touch_playlist(playlist_id)?;
        }
        Ok(removed > 0)
    }

    fn touch_playlist(&self, playlist_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE playlists SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
            [playlist_id],
        )?;
        Ok(())
    }
}
