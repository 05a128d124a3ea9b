// Library scanner - Find and extract metadata from audio files

use crate::db::{Cover, Database, Track};
use lofty::prelude::*;
use lofty::read_from_path;
use rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Supported audio file extensions
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "m4a", "aac", "wma", "opus", "aiff", "aif",
];

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Result of scanning a directory
#[derive(Debug, Default)]
pub struct ScanResult {
    pub total_files: usize,
    pub imported: usize,
    pub skipped: usize,
    /// Known tracks whose file was not found this time
    pub missing: usize,
    /// Previously missing tracks whose file is back
    pub restored: usize,
    pub errors: Vec<ScanError>,
}

/// Errors that can occur during scanning
#[derive(Debug)]
pub struct ScanError {
    pub file_path: PathBuf,
    pub error: String,
}

/// Tag values read from a file, before fallbacks are applied
#[derive(Debug, Default)]
struct Tags {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    genre: Option<String>,
    track_number: Option<i32>,
    year: Option<i32>,
    duration: f64,
    cover: Option<Cover>,
}

/// A track read from disk together with its embedded artwork
#[derive(Debug)]
pub struct ScannedTrack {
    pub track: Track,
    pub cover: Option<Cover>,
}

/// Library scanner
pub struct Scanner;

impl Scanner {
    /// Scan a directory recursively for audio files
    pub fn scan_directory(path: &Path) -> Vec<PathBuf> {
        let mut audio_files = Vec::new();

        for entry in WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if let Some(ext) = path.extension() {
                let ext_str = ext.to_string_lossy().to_lowercase();
                if SUPPORTED_EXTENSIONS.contains(&ext_str.as_str()) {
                    audio_files.push(path.to_path_buf());
                }
            }
        }

        audio_files.sort();
        audio_files
    }

    /// Path of `file` relative to `root`, with `/` separators
    fn relative_path(root: &Path, file: &Path) -> String {
        let rel = file.strip_prefix(root).unwrap_or(file);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn read_tags(path: &Path) -> Result<Tags, String> {
        let tagged_file =
            read_from_path(path).map_err(|e| format!("Failed to read file: {}", e))?;

        let duration = tagged_file.properties().duration().as_secs_f64();

        // Try primary tag first, then fallback to first available
        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(Tags {
                duration,
                ..Tags::default()
            });
        };

        let cover = tag.pictures().first().map(|picture| Cover {
            mime: picture
                .mime_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "image/jpeg".to_string()),
            data: picture.data().to_vec(),
        });

        Ok(Tags {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            genre: tag.genre().map(|s| s.to_string()),
            track_number: tag.track().map(|t| t as i32),
            year: tag.year().map(|y| y as i32),
            duration,
            cover,
        })
    }

    /// Build a catalog track for `path`.
    /// Unreadable tags are not fatal: the track gets the fallback values.
    pub fn extract_metadata(root: &Path, path: &Path) -> ScannedTrack {
        let tags = Self::read_tags(path).unwrap_or_else(|e| {
            warn!(file = %path.display(), error = %e, "failed to parse tags, importing with defaults");
            Tags::default()
        });

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());

        let track = Track {
            id: uuid::Uuid::new_v4().to_string(),
            title: non_empty(tags.title).unwrap_or(stem),
            artist: Some(non_empty(tags.artist).unwrap_or_else(|| UNKNOWN_ARTIST.to_string())),
            album: Some(non_empty(tags.album).unwrap_or_else(|| UNKNOWN_ALBUM.to_string())),
            duration: tags.duration,
            track_number: tags.track_number,
            genre: non_empty(tags.genre),
            year: tags.year,
            file_path: Self::relative_path(root, path),
            file_name,
            created_at: None,
        };

        ScannedTrack {
            track,
            cover: tags.cover,
        }
    }

    /// Import all new files under `root` and flag tracks whose file is gone.
    /// Tracks are never deleted: play history and playlists keep resolving, and
    /// a flagged track is restored when its file shows up again.
    /// A missing root is created and yields an empty result.
    pub fn import_directory(db: &Database, root: &Path) -> ScanResult {
        let mut result = ScanResult::default();

        if !root.exists() {
            match fs::create_dir_all(root) {
                Ok(()) => info!(root = %root.display(), "created music library directory"),
                Err(e) => result.errors.push(ScanError {
                    file_path: root.to_path_buf(),
                    error: e.to_string(),
                }),
            }
            return result;
        }

        let files = Self::scan_directory(root);
        result.total_files = files.len();

        // Load all known paths in one query for fast lookups
        let mut known: HashMap<String, (String, bool)> = match db.get_all_file_paths() {
            Ok(rows) => rows
                .into_iter()
                .map(|(id, path, missing)| (path, (id, missing)))
                .collect(),
            Err(e) => {
                result.errors.push(ScanError {
                    file_path: root.to_path_buf(),
                    error: format!("Database error: {}", e),
                });
                return result;
            }
        };

        for file_path in files {
            let rel = Self::relative_path(root, &file_path);
            if let Some((id, was_missing)) = known.remove(&rel) {
                if was_missing {
                    match db.set_track_missing(&id, false) {
                        Ok(()) => {
                            debug!(file = %rel, "restored");
                            result.restored += 1;
                        }
                        Err(e) => result.errors.push(ScanError {
                            file_path,
                            error: format!("Database error: {}", e),
                        }),
                    }
                } else {
                    result.skipped += 1;
                }
                continue;
            }

            let scanned = Self::extract_metadata(root, &file_path);
            match Self::store(db, &scanned) {
                Ok(()) => {
                    debug!(file = %scanned.track.file_path, "imported");
                    result.imported += 1;
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.extended_code == SQLITE_CONSTRAINT_UNIQUE =>
                {
                    result.skipped += 1
                }
                Err(e) => result.errors.push(ScanError {
                    file_path,
                    error: format!("Database error: {}", e),
                }),
            }
        }

        // Whatever is left in `known` was not found on disk
        for (rel, (id, was_missing)) in known {
            if was_missing {
                continue;
            }
            match db.set_track_missing(&id, true) {
                Ok(()) => {
                    debug!(file = %rel, "file missing, track hidden");
                    result.missing += 1;
                }
                Err(e) => result.errors.push(ScanError {
                    file_path: root.join(&rel),
                    error: format!("Database error: {}", e),
                }),
            }
        }

        info!(
            total = result.total_files,
            imported = result.imported,
            skipped = result.skipped,
            missing = result.missing,
            restored = result.restored,
            errors = result.errors.len(),
            "scan finished"
        );
        result
    }

    /// Insert the track and its artwork; both or neither
    fn store(db: &Database, scanned: &ScannedTrack) -> rusqlite::Result<()> {
        let tx = db.begin()?;
        db.create_track(&scanned.track)?;
        if let Some(cover) = &scanned.cover {
            db.set_cover(&scanned.track.id, cover)?;
        }
        tx.commit()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
