// Play-event ingestion - the write path hit every time a track is played
// Also home of the commit gate that keeps abandoned request writes from landing.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::db::{Database, Track};
use crate::error::{AppError, Result};

/// Current time in the format stored in `user_history.played_at`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

const GATE_OPEN: u8 = 0;
const GATE_COMMITTING: u8 = 1;
const GATE_CLOSED: u8 = 2;

/// Decides, exactly once, whether a write may still commit.
///
/// The caller waiting on the write closes the gate when it gives up; the writer
/// enters it right before `COMMIT`. Whichever happens first wins, so a caller
/// that reported a timeout never sees the write land afterwards.
#[derive(Debug, Clone, Default)]
pub struct CommitGate(Arc<AtomicU8>);

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to commit. False once the gate has been closed.
    pub fn try_enter(&self) -> bool {
        self.0
            .compare_exchange(GATE_OPEN, GATE_COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Forbid any later commit. False if the writer already entered, in which
    /// case its result must be awaited instead of discarded.
    pub fn close(&self) -> bool {
        match self
            .0
            .compare_exchange(GATE_OPEN, GATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == GATE_CLOSED,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire) == GATE_CLOSED
    }
}

/// Record that `user_id` played `track_id`.
///
/// History append and both weight bumps happen in one transaction: an unknown
/// track or any storage failure leaves history and preferences untouched.
/// Replays are counted, so calling this twice doubles the contribution.
pub fn record_play(db: &Database, user_id: &str, track_id: &str) -> Result<Track> {
    record_play_gated(db, user_id, track_id, &CommitGate::new())
}

/// Run `f` in one IMMEDIATE transaction that commits only if `gate` is still
/// open. Any error, or a closed gate, rolls everything back.
pub fn gated_write<T>(
    db: &Database,
    gate: &CommitGate,
    f: impl FnOnce(&Database) -> Result<T>,
) -> Result<T> {
    let tx = db.begin()?;
    if gate.is_closed() {
        return Err(AppError::Timeout);
    }

    let value = f(db)?;

    // Dropping `tx` rolls back
    if !gate.try_enter() {
        warn!("caller gave up, write rolled back");
        return Err(AppError::Timeout);
    }
    tx.commit()?;
    Ok(value)
}

/// [`record_play`] that rolls back with [`AppError::Timeout`] if `gate` is
/// closed before the transaction commits.
pub fn record_play_gated(
    db: &Database,
    user_id: &str,
    track_id: &str,
    gate: &CommitGate,
) -> Result<Track> {
    let track_id = track_id.trim();
    if track_id.is_empty() {
        return Err(AppError::InvalidInput("Missing trackId".to_string()));
    }

    let track = gated_write(db, gate, |db| {
        let track = db
            .get_available_track(track_id)?
            .ok_or_else(|| AppError::NotFound("Track".to_string()))?;

        db.append_history(user_id, &track.id, &now_timestamp())?;
        db.ensure_profile(user_id)?;

        if let Some(genre) = non_blank(track.genre.as_deref()) {
            db.increment_genre(user_id, genre)?;
        }
        if let Some(artist) = non_blank(track.artist.as_deref()) {
            db.increment_artist(user_id, artist)?;
        }
        Ok(track)
    })?;

    debug!(user_id, track_id = %track.id, "play recorded");
    Ok(track)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
