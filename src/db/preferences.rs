// Preference store - per-user genre/artist affinity counters
//
// Weights are rows in `genre_weights` / `artist_weights` and are bumped with a
// single upsert, so two plays racing on the same key both land.

use rusqlite::{params, OptionalExtension, Result};

use super::Database;

/// One weighted genre or artist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affinity {
    pub name: String,
    pub weight: i64,
}

/// A user's accumulated listening preferences, heaviest first
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceProfile {
    pub user_id: String,
    pub genres: Vec<Affinity>,
    pub artists: Vec<Affinity>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy)]
enum WeightKind {
    Genre,
    Artist,
}

impl WeightKind {
    fn table(self) -> &'static str {
        match self {
            WeightKind::Genre => "genre_weights",
            WeightKind::Artist => "artist_weights",
        }
    }

    fn column(self) -> &'static str {
        match self {
            WeightKind::Genre => "genre",
            WeightKind::Artist => "artist",
        }
    }
}

impl Database {
    /// Get a user's profile. Returns None if the user has never played anything.
    pub fn get_profile(&self, user_id: &str) -> Result<Option<PreferenceProfile>> {
        let stamps: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT created_at, updated_at FROM user_preferences WHERE user_id = ?",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((created_at, updated_at)) = stamps else {
            return Ok(None);
        };

        Ok(Some(PreferenceProfile {
            user_id: user_id.to_string(),
            genres: self.top_weights(WeightKind::Genre, user_id, None)?,
            artists: self.top_weights(WeightKind::Artist, user_id, None)?,
            created_at,
            updated_at,
        }))
    }

    /// Whether the user has a profile at all
    pub fn has_profile(&self, user_id: &str) -> Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM user_preferences WHERE user_id = ?)",
            [user_id],
            |row| row.get(0),
        )
    }

    /// Create the profile if missing, then return it
    pub fn ensure_profile(&self, user_id: &str) -> Result<PreferenceProfile> {
        self.conn.execute(
            "INSERT OR IGNORE INTO user_preferences (user_id) VALUES (?)",
            [user_id],
        )?;
        self.get_profile(user_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Add one play to a genre's weight
    pub fn increment_genre(&self, user_id: &str, genre: &str) -> Result<()> {
        self.increment_weight(WeightKind::Genre, user_id, genre)
    }

    /// Add one play to an artist's weight
    pub fn increment_artist(&self, user_id: &str, artist: &str) -> Result<()> {
        self.increment_weight(WeightKind::Artist, user_id, artist)
    }

    /// Heaviest `n` genres. Equal weights keep the order the genres were first seen in.
    pub fn top_genres(&self, user_id: &str, n: usize) -> Result<Vec<Affinity>> {
        self.top_weights(WeightKind::Genre, user_id, Some(n))
    }

    /// Heaviest `n` artists. Equal weights keep the order the artists were first seen in.
    pub fn top_artists(&self, user_id: &str, n: usize) -> Result<Vec<Affinity>> {
        self.top_weights(WeightKind::Artist, user_id, Some(n))
    }

    fn increment_weight(&self, kind: WeightKind, user_id: &str, key: &str) -> Result<()> {
        // Profile row first: the weight tables reference it.
        self.conn.execute(
            "INSERT INTO user_preferences (user_id) VALUES (?)
             ON CONFLICT(user_id) DO UPDATE
             SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            [user_id],
        )?;

        let sql = format!(
            "INSERT INTO {table} (user_id, {column}, weight) VALUES (?1, ?2, 1)
             ON CONFLICT(user_id, {column}) DO UPDATE SET weight = weight + 1",
            table = kind.table(),
            column = kind.column(),
        );
        self.conn.execute(&sql, params![user_id, key])?;
        Ok(())
    }

    fn top_weights(&self, kind: WeightKind, user_id: &str, n: Option<usize>) -> Result<Vec<Affinity>> {
        // LIMIT -1 means no limit in SQLite
        let limit = n.map(|n| n as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {column}, weight FROM {table}
             WHERE user_id = ?
             ORDER BY weight DESC, seq ASC
             LIMIT ?",
            table = kind.table(),
            column = kind.column(),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok(Affinity {
                name: row.get(0)?,
                weight: row.get(1)?,
            })
        })?;

        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn weight_of(list: &[Affinity], name: &str) -> Option<i64> {
        list.iter().find(|a| a.name == name).map(|a| a.weight)
    }

    #[test]
    fn test_profile_absent_until_created() {
        let db = test_db();
        assert!(db.get_profile("u1").unwrap().is_none());
        assert!(!db.has_profile("u1").unwrap());
    }

    #[test]
    fn test_ensure_profile_is_create_if_absent() {
        let db = test_db();
        let first = db.ensure_profile("u1").unwrap();
        assert!(first.genres.is_empty());
        assert!(first.artists.is_empty());

        db.increment_genre("u1", "Folk").unwrap();
        let second = db.ensure_profile("u1").unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(weight_of(&second.genres, "Folk"), Some(1));
    }

    #[test]
    fn test_increments_are_additive_and_isolated() {
        let db = test_db();
        db.increment_genre("u1", "Folk").unwrap();
        db.increment_genre("u1", "Folk").unwrap();
        db.increment_genre("u1", "Jazz").unwrap();
        db.increment_artist("u1", "A").unwrap();
        db.increment_genre("u2", "Folk").unwrap();

        let profile = db.get_profile("u1").unwrap().unwrap();
        assert_eq!(weight_of(&profile.genres, "Folk"), Some(2));
        assert_eq!(weight_of(&profile.genres, "Jazz"), Some(1));
        assert_eq!(weight_of(&profile.artists, "A"), Some(1));

        let other = db.get_profile("u2").unwrap().unwrap();
        assert_eq!(weight_of(&other.genres, "Folk"), Some(1));
        assert!(other.artists.is_empty());
    }

    #[test]
    fn test_genre_and_artist_namespaces_are_separate() {
        let db = test_db();
        db.increment_genre("u1", "Same").unwrap();
        db.increment_artist("u1", "Same").unwrap();
        db.increment_artist("u1", "Same").unwrap();

        let profile = db.get_profile("u1").unwrap().unwrap();
        assert_eq!(weight_of(&profile.genres, "Same"), Some(1));
        assert_eq!(weight_of(&profile.artists, "Same"), Some(2));
    }

    #[test]
    fn test_top_n_orders_by_weight_then_first_seen() {
        let db = test_db();
        for artist in ["B", "A", "C", "D"] {
            db.increment_artist("u1", artist).unwrap();
        }
        db.increment_artist("u1", "D").unwrap();
        db.increment_artist("u1", "D").unwrap();
        db.increment_artist("u1", "C").unwrap();

        let top = db.top_artists("u1", 3).unwrap();
        let names: Vec<&str> = top.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["D", "C", "B"]);

        let everything = db.top_artists("u1", 10).unwrap();
        assert_eq!(everything.len(), 4);
        assert_eq!(everything[3].name, "A");
    }

    #[test]
    fn test_top_genres_for_unknown_user_is_empty() {
        let db = test_db();
        assert!(db.top_genres("ghost", 3).unwrap().is_empty());
    }

    #[test]
    fn test_rolled_back_increment_leaves_no_trace() {
        let db = test_db();
        {
            let _tx = db.begin().unwrap();
            db.increment_genre("u1", "Folk").unwrap();
            // dropped without commit
        }
        assert!(db.get_profile("u1").unwrap().is_none());
    }
}
