// Recommendation engine - personalized track picks from preference weights
//
// Sampling-based, not a scored ranker: the heaviest artists and genres pick
// where to sample from, and the order inside each pass is random. Two calls
// for the same user will usually differ.
//
// Passes, each skipping everything already chosen and everything in the
// user's recent history:
// 1. artist: top `TOP_ARTISTS` artists, up to 60% of the limit (rounded up)
// 2. genre: top `TOP_GENRES` genres, up to the remaining slots
// 3. fill: any track
//
// If the catalog outside the recent history runs dry, recently played tracks
// are let back in so the list still reaches `min(limit, catalog size)`.

use std::collections::HashSet;

use rusqlite::Result;
use tracing::debug;

use crate::db::{Database, Track, TrackFilter};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 50;
pub const TOP_ARTISTS: usize = 5;
pub const TOP_GENRES: usize = 3;
/// How many history entries count as "recently played"
pub const RECENT_WINDOW: i64 = 30;

/// Clamp a caller-supplied limit to `[1, MAX_LIMIT]`, defaulting when absent
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_LIMIT,
        Some(n) => n.clamp(1, MAX_LIMIT as i64) as usize,
    }
}

/// Slots reserved for the artist pass: ceil(limit * 0.6), in integers
fn artist_quota(limit: usize) -> usize {
    (limit * 3).div_ceil(5)
}

/// Tracks picked so far plus the IDs no later pass may return
struct Picks {
    tracks: Vec<Track>,
    chosen: HashSet<String>,
}

impl Picks {
    fn new(capacity: usize) -> Self {
        Picks {
            tracks: Vec::with_capacity(capacity),
            chosen: HashSet::with_capacity(capacity),
        }
    }

    fn extend(&mut self, tracks: Vec<Track>) -> usize {
        let before = self.tracks.len();
        for track in tracks {
            if self.chosen.insert(track.id.clone()) {
                self.tracks.push(track);
            }
        }
        self.tracks.len() - before
    }

    fn len(&self) -> usize {
        self.tracks.len()
    }
}

/// Recommend up to `limit` tracks for `user_id` (limit is clamped to `[1, MAX_LIMIT]`).
/// Read-only; an empty catalog yields an empty list.
pub fn recommend(db: &Database, user_id: &str, limit: usize) -> Result<Vec<Track>> {
    let limit = limit.clamp(1, MAX_LIMIT);

    if !db.has_profile(user_id)? {
        debug!(user_id, limit, "cold start, sampling whole catalog");
        return db.sample_tracks(TrackFilter::Any, limit, &HashSet::new());
    }

    let top_artists: Vec<String> = db
        .top_artists(user_id, TOP_ARTISTS)?
        .into_iter()
        .map(|a| a.name)
        .collect();
    let top_genres: Vec<String> = db
        .top_genres(user_id, TOP_GENRES)?
        .into_iter()
        .map(|g| g.name)
        .collect();
    let recent: HashSet<String> = db
        .recent_track_ids(user_id, RECENT_WINDOW)?
        .into_iter()
        .collect();

    let mut picks = Picks::new(limit);

    if !top_artists.is_empty() {
        let exclude = &picks.chosen | &recent;
        let found = db.sample_tracks(
            TrackFilter::Artists(&top_artists),
            artist_quota(limit),
            &exclude,
        )?;
        let added = picks.extend(found);
        debug!(user_id, added, "artist pass");
    }

    if picks.len() < limit && !top_genres.is_empty() {
        let exclude = &picks.chosen | &recent;
        let found = db.sample_tracks(
            TrackFilter::Genres(&top_genres),
            limit - picks.len(),
            &exclude,
        )?;
        let added = picks.extend(found);
        debug!(user_id, added, "genre pass");
    }

    if picks.len() < limit {
        let exclude = &picks.chosen | &recent;
        let found = db.sample_tracks(TrackFilter::Any, limit - picks.len(), &exclude)?;
        let added = picks.extend(found);
        debug!(user_id, added, "fill pass");
    }

    // Small catalog: everything unplayed is already in, so let recent tracks back.
    if picks.len() < limit && !recent.is_empty() {
        let exclude = picks.chosen.clone();
        let found = db.sample_tracks(TrackFilter::Any, limit - picks.len(), &exclude)?;
        let added = picks.extend(found);
        debug!(user_id, added, "recent top-up");
    }

    Ok(picks.tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::ingest::record_play;

    fn ids(tracks: &[Track]) -> HashSet<String> {
        tracks.iter().map(|t| t.id.clone()).collect()
    }

    fn assert_distinct(tracks: &[Track]) {
        assert_eq!(ids(tracks).len(), tracks.len(), "recommendations must not repeat");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-7)), 1);
        assert_eq!(clamp_limit(Some(1)), 1);
        assert_eq!(clamp_limit(Some(35)), 35);
        assert_eq!(clamp_limit(Some(1000)), 50);
    }

    #[test]
    fn test_artist_quota_rounds_up() {
        assert_eq!(artist_quota(1), 1);
        assert_eq!(artist_quota(4), 3);
        assert_eq!(artist_quota(5), 3);
        assert_eq!(artist_quota(20), 12);
        assert_eq!(artist_quota(50), 30);
    }

    #[test]
    fn test_recommend_clamps_out_of_range_limits() {
        let db = test_db();
        for i in 0..60 {
            insert_track(&db, &format!("t{:02}", i), Some("A"), Some("Folk"));
        }
        assert_eq!(recommend(&db, "u1", 0).unwrap().len(), 1);
        assert_eq!(recommend(&db, "u1", 1000).unwrap().len(), 50);
    }

    #[test]
    fn test_cold_start_returns_min_of_limit_and_catalog() {
        let db = test_db();
        for i in 0..25 {
            insert_track(&db, &format!("t{:02}", i), Some("A"), None);
        }

        for _ in 0..10 {
            let recs = recommend(&db, "new-user", 10).unwrap();
            assert_eq!(recs.len(), 10);
            assert_distinct(&recs);
        }

        let small = test_db();
        for id in ["x", "y", "z"] {
            insert_track(&small, id, None, None);
        }
        let recs = recommend(&small, "new-user", 10).unwrap();
        let expected: HashSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids(&recs), expected);
    }

    #[test]
    fn test_empty_catalog_yields_empty_list() {
        let db = test_db();
        assert!(recommend(&db, "cold", 20).unwrap().is_empty());

        db.increment_artist("warm", "A").unwrap();
        db.increment_genre("warm", "Folk").unwrap();
        assert!(recommend(&db, "warm", 20).unwrap().is_empty());
    }

    #[test]
    fn test_recently_played_tracks_are_avoided() {
        let db = test_db();
        for i in 0..80 {
            let artist = format!("Artist {}", i % 8);
            let genre = if i % 2 == 0 { "Folk" } else { "Rock" };
            insert_track(&db, &format!("t{:02}", i), Some(&artist), Some(genre));
        }
        for i in 0..30 {
            record_play(&db, "u1", &format!("t{:02}", i)).unwrap();
        }
        let recent: HashSet<String> = db
            .recent_track_ids("u1", RECENT_WINDOW)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(recent.len(), 30);

        for _ in 0..20 {
            let recs = recommend(&db, "u1", 20).unwrap();
            assert_eq!(recs.len(), 20);
            assert_distinct(&recs);
            assert!(ids(&recs).is_disjoint(&recent));
        }
    }

    #[test]
    fn test_scenario_top_artist_then_fill() {
        let db = test_db();
        for id in ["a1", "a2", "a3"] {
            insert_track(&db, id, Some("A"), Some("Folk"));
        }
        for id in ["b1", "b2", "b3"] {
            insert_track(&db, id, Some("B"), Some("Classical"));
        }
        for _ in 0..5 {
            db.increment_artist("u1", "A").unwrap();
            db.increment_genre("u1", "Folk").unwrap();
        }

        for _ in 0..20 {
            let recs = recommend(&db, "u1", 4).unwrap();
            assert_eq!(recs.len(), 4);
            assert_distinct(&recs);

            let a_count = recs.iter().filter(|t| t.artist.as_deref() == Some("A")).count();
            let b_count = recs.iter().filter(|t| t.artist.as_deref() == Some("B")).count();
            assert_eq!(a_count, 3);
            assert_eq!(b_count, 1);
        }
    }

    #[test]
    fn test_genre_pass_fills_when_artists_have_no_tracks() {
        let db = test_db();
        for i in 0..5 {
            insert_track(&db, &format!("folk{}", i), Some("Someone"), Some("Folk"));
        }
        for i in 0..20 {
            insert_track(&db, &format!("rock{}", i), Some("Other"), Some("Rock"));
        }
        db.increment_artist("u1", "Not In Catalog").unwrap();
        db.increment_genre("u1", "Folk").unwrap();

        let recs = recommend(&db, "u1", 5).unwrap();
        assert_eq!(recs.len(), 5);
        assert!(recs.iter().all(|t| t.genre.as_deref() == Some("Folk")));
    }

    #[test]
    fn test_only_top_five_artists_drive_artist_pass() {
        let db = test_db();
        // Six artists; "F" has the lowest weight and falls outside the top five
        for (artist, plays) in [("A", 6), ("B", 5), ("C", 4), ("D", 3), ("E", 2), ("F", 1)] {
            insert_track(&db, &format!("{}-1", artist), Some(artist), None);
            for _ in 0..plays {
                db.increment_artist("u1", artist).unwrap();
            }
        }

        // limit 3 → artist quota 2, drawn from A..E only; the fill pass takes 1 more
        for _ in 0..20 {
            let recs = recommend(&db, "u1", 3).unwrap();
            assert_eq!(recs.len(), 3);
            let from_top: usize = recs[..2]
                .iter()
                .filter(|t| t.artist.as_deref() != Some("F"))
                .count();
            assert_eq!(from_top, 2);
        }
    }

    #[test]
    fn test_small_catalog_readmits_recent_tracks() {
        let db = test_db();
        for i in 0..5 {
            insert_track(&db, &format!("t{}", i), Some("A"), Some("Folk"));
        }
        for i in 0..5 {
            record_play(&db, "u1", &format!("t{}", i)).unwrap();
        }

        let recs = recommend(&db, "u1", 10).unwrap();
        assert_eq!(recs.len(), 5);
        assert_distinct(&recs);
    }

    #[test]
    fn test_recommend_has_no_side_effects() {
        let db = test_db();
        insert_track(&db, "t1", Some("A"), Some("Folk"));
        record_play(&db, "u1", "t1").unwrap();

        let profile = db.get_profile("u1").unwrap();
        let history = db.count_history("u1").unwrap();
        recommend(&db, "u1", 10).unwrap();
        recommend(&db, "cold", 10).unwrap();

        assert_eq!(db.get_profile("u1").unwrap(), profile);
        assert_eq!(db.count_history("u1").unwrap(), history);
        assert!(db.get_profile("cold").unwrap().is_none());
    }
}
