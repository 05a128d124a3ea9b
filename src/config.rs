// Runtime configuration for the HTTP server and database location

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::db::Database;
use crate::error::{AppError, Result};

pub const DEFAULT_DB_PATH: &str = "data/music.db";
pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Settings for one server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Budget for every storage call made on behalf of a request
    pub query_timeout: Duration,
    /// Browser origin allowed to call the API
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Open the database at `path`, creating its parent directory and applying the
/// bundled schema. `busy_timeout` bounds how long a write waits for the lock.
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let db = Database::new(path)?;
    db.set_busy_timeout(busy_timeout)?;
    db.run_migrations()?;
    info!(path = %path.display(), "database ready");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr().to_string(), "127.0.0.1:4000");
        assert_eq!(config.query_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_open_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("music.db");

        let db = open_database(&path, Duration::from_millis(500)).unwrap();
        assert!(path.exists());
        assert_eq!(db.count_tracks().unwrap(), 0);
    }

    #[test]
    fn test_open_database_twice_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("music.db");
        {
            let db = open_database(&path, Duration::from_millis(500)).unwrap();
            db.create_user("Ada", None).unwrap();
        }
        let db = open_database(&path, Duration::from_millis(500)).unwrap();
        let users: i64 = db.count_users().unwrap();
        assert_eq!(users, 1);
    }
}
