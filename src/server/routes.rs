// REST API routes
// All responses sanitize data: no file_path, no absolute paths exposed.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{AppState, AuthUser};
use crate::db::{
    Affinity, AlbumSummary, ArtistSummary, Playlist, PlaylistEntry, PreferenceProfile, Track,
    TrackQuery, TrackSort,
};
use crate::error::{AppError, Result};
use crate::{ingest, recommend};

pub const HISTORY_DEFAULT_LIMIT: i64 = 50;
pub const HISTORY_MAX_LIMIT: i64 = 200;
pub const TRACKS_DEFAULT_LIMIT: i64 = 50;
pub const TRACKS_MAX_LIMIT: i64 = 500;
pub const PLAYLIST_NAME_MAX_CHARS: usize = 200;

// ---- Sanitized DTOs (never expose file_path) ----

/// Track data safe for clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDTO {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: f64,
    pub track_number: Option<i32>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub file_name: String,
}

impl From<Track> for TrackDTO {
    fn from(track: Track) -> Self {
        TrackDTO {
            id: track.id,
            title: track.title,
            artist: track.artist,
            album: track.album,
            duration: track.duration,
            track_number: track.track_number,
            genre: track.genre,
            year: track.year,
            file_name: track.file_name,
        }
    }
}

/// A history entry: the track as it is now, plus when it was played
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItemDTO {
    #[serde(flatten)]
    pub track: TrackDTO,
    pub played_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistDTO {
    pub artist: Option<String>,
    pub track_count: i64,
}

impl From<ArtistSummary> for ArtistDTO {
    fn from(a: ArtistSummary) -> Self {
        ArtistDTO {
            artist: a.artist,
            track_count: a.track_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDTO {
    pub album: Option<String>,
    pub artist: Option<String>,
    pub track_count: i64,
    pub has_cover: bool,
}

impl From<AlbumSummary> for AlbumDTO {
    fn from(a: AlbumSummary) -> Self {
        AlbumDTO {
            album: a.album,
            artist: a.artist,
            track_count: a.track_count,
            has_cover: a.has_cover,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDTO {
    pub id: String,
    pub name: String,
    pub track_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Playlist> for PlaylistDTO {
    fn from(p: Playlist) -> Self {
        PlaylistDTO {
            id: p.id,
            name: p.name,
            track_count: p.track_count,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistTrackDTO {
    #[serde(flatten)]
    pub track: TrackDTO,
    pub position: i64,
    pub added_at: String,
}

impl From<PlaylistEntry> for PlaylistTrackDTO {
    fn from(e: PlaylistEntry) -> Self {
        PlaylistTrackDTO {
            track: e.track.into(),
            position: e.position,
            added_at: e.added_at,
        }
    }
}

/// A playlist with its tracks in order
#[derive(Debug, Serialize)]
pub struct PlaylistDetailDTO {
    #[serde(flatten)]
    pub playlist: PlaylistDTO,
    pub tracks: Vec<PlaylistTrackDTO>,
}

#[derive(Debug, Serialize)]
pub struct AffinityDTO {
    pub name: String,
    pub weight: i64,
}

impl From<Affinity> for AffinityDTO {
    fn from(a: Affinity) -> Self {
        AffinityDTO {
            name: a.name,
            weight: a.weight,
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct PreferencesResponse {
    pub genres: Vec<AffinityDTO>,
    pub artists: Vec<AffinityDTO>,
}

impl From<PreferenceProfile> for PreferencesResponse {
    fn from(profile: PreferenceProfile) -> Self {
        PreferencesResponse {
            genres: profile.genres.into_iter().map(Into::into).collect(),
            artists: profile.artists.into_iter().map(Into::into).collect(),
        }
    }
}

// ---- Request/Response types ----

/// Body naming one track: a play event or a playlist addition
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TrackListParams {
    pub search: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<TrackListParams> for TrackQuery {
    fn from(p: TrackListParams) -> Self {
        TrackQuery {
            search: p.search,
            artist: p.artist,
            album: p.album,
            genre: p.genre,
            sort: p.sort.as_deref().map(TrackSort::parse).unwrap_or_default(),
            descending: p.order.as_deref() == Some("desc"),
            limit: p
                .limit
                .unwrap_or(TRACKS_DEFAULT_LIMIT)
                .clamp(1, TRACKS_MAX_LIMIT),
            offset: p.offset.unwrap_or(0).max(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub track_count: i64,
}

/// Clamp a history page size to `[1, HISTORY_MAX_LIMIT]`
pub fn history_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(HISTORY_DEFAULT_LIMIT)
        .clamp(1, HISTORY_MAX_LIMIT)
}

fn limit_param(
    params: std::result::Result<Query<LimitParams>, QueryRejection>,
) -> Result<Option<i64>> {
    params
        .map(|Query(p)| p.limit)
        .map_err(|e| AppError::InvalidInput(e.body_text()))
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(b)| b)
        .map_err(|e| AppError::InvalidInput(e.body_text()))
}

fn required_track_id(body: TrackRequest) -> Result<String> {
    body.track_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Missing trackId".to_string()))
}

/// Trimmed, non-empty, bounded playlist name
pub fn playlist_name(body: PlaylistRequest) -> Result<String> {
    let name = body.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Name required".to_string()));
    }
    if name.chars().count() > PLAYLIST_NAME_MAX_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Name longer than {} characters",
            PLAYLIST_NAME_MAX_CHARS
        )));
    }
    Ok(name.to_string())
}

// ---- Route registration ----

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tracks", get(list_tracks))
        .route("/api/tracks/artists", get(list_artists))
        .route("/api/tracks/albums", get(list_albums))
        .route("/api/tracks/{id}", get(get_track))
        .route("/api/tracks/{id}/cover", get(get_cover))
        .route("/api/user/history", get(get_history).post(record_history))
        .route("/api/user/recommendations", get(get_recommendations))
        .route("/api/user/preferences", get(get_preferences))
        .route("/api/user/playlists", get(list_playlists).post(create_playlist))
        .route(
            "/api/user/playlists/{id}",
            get(get_playlist)
                .put(rename_playlist)
                .delete(delete_playlist),
        )
        .route("/api/user/playlists/{id}/tracks", post(add_playlist_track))
        .route(
            "/api/user/playlists/{id}/tracks/{track_id}",
            delete(remove_playlist_track),
        )
}

// ---- Handlers ----

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let track_count = state.with_db(|db| Ok(db.count_tracks()?)).await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        track_count,
    }))
}

async fn list_tracks(
    State(state): State<AppState>,
    params: std::result::Result<Query<TrackListParams>, QueryRejection>,
) -> Result<Json<Vec<TrackDTO>>> {
    let Query(params) = params.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let query = TrackQuery::from(params);

    let tracks = state
        .with_db(move |db| Ok(db.list_tracks(&query)?))
        .await?;

    Ok(Json(tracks.into_iter().map(TrackDTO::from).collect()))
}

async fn list_artists(State(state): State<AppState>) -> Result<Json<Vec<ArtistDTO>>> {
    let artists = state.with_db(|db| Ok(db.list_artists()?)).await?;
    Ok(Json(artists.into_iter().map(ArtistDTO::from).collect()))
}

async fn list_albums(State(state): State<AppState>) -> Result<Json<Vec<AlbumDTO>>> {
    let albums = state.with_db(|db| Ok(db.list_albums()?)).await?;
    Ok(Json(albums.into_iter().map(AlbumDTO::from).collect()))
}

async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrackDTO>> {
    let track = state
        .with_db(move |db| {
            db.get_available_track(&id)?
                .ok_or_else(|| AppError::NotFound("Track".to_string()))
        })
        .await?;

    Ok(Json(track.into()))
}

async fn get_cover(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let cover = state
        .with_db(move |db| {
            if db.get_available_track(&id)?.is_none() {
                return Err(AppError::NotFound("Track".to_string()));
            }
            db.get_cover(&id)?
                .ok_or_else(|| AppError::NotFound("Cover art".to_string()))
        })
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, cover.mime),
            (header::CACHE_CONTROL, "private, max-age=86400".to_string()),
        ],
        cover.data,
    )
        .into_response())
}

async fn record_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<OkResponse>> {
    let track_id = required_track_id(json_body(body)?)?;

    // Gated: a play that times out must not commit later
    state
        .with_db_gated(move |db, gate| {
            ingest::record_play_gated(db, &user.user_id, &track_id, gate)
        })
        .await?;

    Ok(Json(OkResponse { ok: true }))
}

async fn get_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    params: std::result::Result<Query<LimitParams>, QueryRejection>,
) -> Result<Json<Vec<HistoryItemDTO>>> {
    let limit = history_limit(limit_param(params)?);

    let rows = state
        .with_db(move |db| Ok(db.recent_history(&user.user_id, limit)?))
        .await?;

    let items = rows
        .into_iter()
        .map(|(entry, track)| HistoryItemDTO {
            track: track.into(),
            played_at: entry.played_at,
        })
        .collect();

    Ok(Json(items))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    params: std::result::Result<Query<LimitParams>, QueryRejection>,
) -> Result<Json<Vec<TrackDTO>>> {
    let limit = recommend::clamp_limit(limit_param(params)?);

    let tracks = state
        .with_db(move |db| Ok(recommend::recommend(db, &user.user_id, limit)?))
        .await?;

    Ok(Json(tracks.into_iter().map(TrackDTO::from).collect()))
}

async fn get_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PreferencesResponse>> {
    let profile = state
        .with_db(move |db| Ok(db.get_profile(&user.user_id)?))
        .await?;

    Ok(Json(profile.map(PreferencesResponse::from).unwrap_or_default()))
}

async fn list_playlists(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<PlaylistDTO>>> {
    let playlists = state
        .with_db(move |db| Ok(db.list_playlists(&user.user_id)?))
        .await?;
    Ok(Json(playlists.into_iter().map(PlaylistDTO::from).collect()))
}

async fn create_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: std::result::Result<Json<PlaylistRequest>, JsonRejection>,
) -> Result<Json<PlaylistDTO>> {
    let name = playlist_name(json_body(body)?)?;
    let playlist = state
        .with_db_write(move |db| Ok(db.create_playlist(&user.user_id, &name)?))
        .await?;
    Ok(Json(playlist.into()))
}

async fn get_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<PlaylistDetailDTO>> {
    let (playlist, entries) = state
        .with_db(move |db| {
            let playlist = db
                .get_playlist(&user.user_id, &id)?
                .ok_or_else(|| AppError::NotFound("Playlist".to_string()))?;
            let entries = db.get_playlist_tracks(&playlist.id)?;
            Ok((playlist, entries))
        })
        .await?;

    Ok(Json(PlaylistDetailDTO {
        playlist: playlist.into(),
        tracks: entries.into_iter().map(PlaylistTrackDTO::from).collect(),
    }))
}

async fn rename_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: std::result::Result<Json<PlaylistRequest>, JsonRejection>,
) -> Result<Json<OkResponse>> {
    let name = playlist_name(json_body(body)?)?;
    state
        .with_db_write(move |db| {
            if db.rename_playlist(&user.user_id, &id, &name)? {
                Ok(())
            } else {
                Err(AppError::NotFound("Playlist".to_string()))
            }
        })
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn delete_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>> {
    state
        .with_db_write(move |db| {
            if db.delete_playlist(&user.user_id, &id)? {
                Ok(())
            } else {
                Err(AppError::NotFound("Playlist".to_string()))
            }
        })
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn add_playlist_track(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: std::result::Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<OkResponse>> {
    let track_id = required_track_id(json_body(body)?)?;
    state
        .with_db_write(move |db| {
            if db.get_playlist(&user.user_id, &id)?.is_none() {
                return Err(AppError::NotFound("Playlist".to_string()));
            }
            if db.get_available_track(&track_id)?.is_none() {
                return Err(AppError::NotFound("Track".to_string()));
            }
            if !db.add_track_to_playlist(&id, &track_id)? {
                return Err(AppError::Conflict("Track already in playlist".to_string()));
            }
            Ok(())
        })
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn remove_playlist_track(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, track_id)): Path<(String, String)>,
) -> Result<Json<OkResponse>> {
    state
        .with_db_write(move |db| {
            if db.get_playlist(&user.user_id, &id)?.is_none() {
                return Err(AppError::NotFound("Playlist".to_string()));
            }
            db.remove_track_from_playlist(&id, &track_id)?;
            Ok(())
        })
        .await?;
    Ok(Json(OkResponse { ok: true }))
}
