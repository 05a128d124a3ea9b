// tunedeck - personal music library server
// Scans a local folder into SQLite, records what each user plays and
// recommends tracks from their listening habits.

// Modules
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod recommend;
pub mod scanner;
pub mod server;

pub use config::ServerConfig;
pub use db::Database;
pub use error::{AppError, Result};
