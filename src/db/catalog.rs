// Catalog browsing - filtered track listing, artist/album summaries, cover art
// Only tracks whose file is still in the library are listed.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Result};

use super::{track_from_row, Database, Track, TRACK_COLUMNS};

/// Column a track listing is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackSort {
    #[default]
    Title,
    Artist,
    Album,
    Duration,
    Year,
    CreatedAt,
}

impl TrackSort {
    /// Parse a sort key; unknown keys fall back to title
    pub fn parse(key: &str) -> Self {
        match key {
            "artist" => TrackSort::Artist,
            "album" => TrackSort::Album,
            "duration" => TrackSort::Duration,
            "year" => TrackSort::Year,
            "created_at" | "createdAt" => TrackSort::CreatedAt,
            _ => TrackSort::Title,
        }
    }

    fn column(self) -> &'static str {
        match self {
            TrackSort::Title => "title",
            TrackSort::Artist => "artist",
            TrackSort::Album => "album",
            TrackSort::Duration => "duration",
            TrackSort::Year => "year",
            TrackSort::CreatedAt => "created_at",
        }
    }
}

/// Filters and paging for [`Database::list_tracks`]. Filters combine with AND.
#[derive(Debug, Clone)]
pub struct TrackQuery {
    /// Case-insensitive substring of title, artist or album
    pub search: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub sort: TrackSort,
    pub descending: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TrackQuery {
    fn default() -> Self {
        TrackQuery {
            search: None,
            artist: None,
            album: None,
            genre: None,
            sort: TrackSort::default(),
            descending: false,
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistSummary {
    pub artist: Option<String>,
    pub track_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumSummary {
    pub album: Option<String>,
    pub artist: Option<String>,
    pub track_count: i64,
    pub has_cover: bool,
}

/// Embedded artwork extracted at scan time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub mime: String,
    pub data: Vec<u8>,
}

/// Escape `%`, `_` and `\` so user input matches literally inside LIKE
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Database {
    /// One page of available tracks matching `query`
    pub fn list_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>> {
        let mut conditions = vec!["missing = 0".to_string()];
        let mut values: Vec<Value> = Vec::new();

        for (column, value) in [
            ("artist", &query.artist),
            ("album", &query.album),
            ("genre", &query.genre),
        ] {
            if let Some(value) = value {
                conditions.push(format!("{column} = ?"));
                values.push(Value::Text(value.clone()));
            }
        }

        if let Some(term) = query.search.as_deref().filter(|t| !t.trim().is_empty()) {
            conditions.push(
                "(title LIKE ? ESCAPE '\\' OR artist LIKE ? ESCAPE '\\' OR album LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            let pattern = like_pattern(term.trim());
            for _ in 0..3 {
                values.push(Value::Text(pattern.clone()));
            }
        }

        let direction = if query.descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {TRACK_COLUMNS} FROM tracks WHERE {} ORDER BY {} {direction}, id ASC LIMIT ? OFFSET ?",
            conditions.join(" AND "),
            query.sort.column(),
        );
        values.push(Value::Integer(query.limit));
        values.push(Value::Integer(query.offset));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), track_from_row)?;
        rows.collect()
    }

    /// Distinct artists with their number of available tracks
    pub fn list_artists(&self) -> Result<Vec<ArtistSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT artist, COUNT(*) FROM tracks
             WHERE missing = 0
             GROUP BY artist
             ORDER BY artist ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ArtistSummary {
                artist: row.get(0)?,
                track_count: row.get(1)?,
            })
        })?;
        rows.collect()
    }

    /// Distinct (album, artist) pairs with track counts and whether any track has art
    pub fn list_albums(&self) -> Result<Vec<AlbumSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.album, t.artist, COUNT(*), COUNT(c.track_id) > 0
             FROM tracks t
             LEFT JOIN track_covers c ON c.track_id = t.id
             WHERE t.missing = 0
             GROUP BY t.album, t.artist
             ORDER BY t.album ASC, t.artist ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AlbumSummary {
                album: row.get(0)?,
                artist: row.get(1)?,
                track_count: row.get(2)?,
                has_cover: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Store (or replace) a track's artwork
    pub fn set_cover(&self, track_id: &str, cover: &Cover) -> Result<()> {
        self.conn.execute(
            "INSERT INTO track_covers (track_id, mime, data) VALUES (?, ?, ?)
             ON CONFLICT(track_id) DO UPDATE SET mime = excluded.mime, data = excluded.data",
            params![track_id, cover.mime, cover.data],
        )?;
        Ok(())
    }

    pub fn get_cover(&self, track_id: &str) -> Result<Option<Cover>> {
        self.conn
            .query_row(
                "SELECT mime, data FROM track_covers WHERE track_id = ?",
                [track_id],
                |row| {
                    Ok(Cover {
                        mime: row.get(0)?,
                        data: row.get(1)?,
                    })
                },
            )
            .optional()
    }
}
