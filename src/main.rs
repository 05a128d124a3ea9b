use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tunedeck::config::{self, ServerConfig};
use tunedeck::scanner::Scanner;
use tunedeck::server::{self, AppState};

#[derive(Parser)]
#[command(
    name = "tunedeck",
    author,
    version,
    about = "Personal music library server with play history and recommendations",
    long_about = None
)]
struct Cli {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// SQLite database file
    #[arg(long, env = "TUNEDECK_DB", default_value = config::DEFAULT_DB_PATH, global = true)]
    db: PathBuf,

    /// Milliseconds a storage call may take before it is abandoned
    #[arg(long, value_name = "MS", default_value_t = config::DEFAULT_QUERY_TIMEOUT_MS, global = true)]
    query_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// IP address to bind (e.g. 127.0.0.1, 0.0.0.0)
        #[arg(long, env = "TUNEDECK_BIND", value_name = "IP", default_value = "127.0.0.1")]
        bind: IpAddr,

        /// TCP port to listen on
        #[arg(long, env = "PORT", value_name = "PORT", default_value_t = config::DEFAULT_PORT)]
        port: u16,

        /// Browser origin allowed to call the API
        #[arg(long, env = "FRONTEND_URL", default_value = config::DEFAULT_CORS_ORIGIN)]
        cors_origin: String,
    },
    /// Scan a music folder into the catalog
    Scan {
        /// Root directory of the music library
        #[arg(value_name = "ROOT", value_hint = clap::ValueHint::DirPath)]
        root: PathBuf,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print a bearer token for it
    Add {
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Issue another bearer token for an existing user
    Token { user_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).init();

    let query_timeout = Duration::from_millis(cli.query_timeout_ms);
    let db = config::open_database(&cli.db, query_timeout)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;

    match cli.command {
        Commands::Serve {
            bind,
            port,
            cors_origin,
        } => {
            let config = ServerConfig {
                bind,
                port,
                query_timeout,
                cors_origin,
            };
            info!(
                tracks = db.count_tracks()?,
                origin = %config.cors_origin,
                "starting server"
            );
            server::serve(AppState::new(db, config))
                .await
                .context("server failed")?;
        }
        Commands::Scan { root } => {
            let result = tokio::task::spawn_blocking(move || Scanner::import_directory(&db, &root))
                .await
                .context("scan task failed")?;
            println!(
                "files: {} | imported: {} | skipped: {} | missing: {} | restored: {} | errors: {}",
                result.total_files,
                result.imported,
                result.skipped,
                result.missing,
                result.restored,
                result.errors.len()
            );
            for err in &result.errors {
                eprintln!("{}: {}", err.file_path.display(), err.error);
            }
        }
        Commands::User { command } => match command {
            UserCommands::Add { name, email } => {
                let user = db.create_user(&name, email.as_deref())?;
                let token = server::issue_token(&db, &user.id)?;
                println!("user:  {}", user.id);
                println!("token: {}", token);
            }
            UserCommands::Token { user_id } => {
                let token = server::issue_token(&db, &user_id)?;
                println!("token: {}", token);
            }
        },
    }
    Ok(())
}
