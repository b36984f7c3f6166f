//! CLI argument parsing, configuration loading, and startup helpers.

use crate::ServerConfig;
use crate::access::{ClientIpHeader, IpExtractor};
use crate::auth::{generate_token, hash_password};
use crate::config::{AppConfig, ConfigError};
use crate::db::{Database, NewUser, UserLevel};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "shoptrac", about = "Expense tracker API server", version)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "shoptrac.json")]
    pub config: PathBuf,

    /// Address to listen on, overrides the configuration file
    #[arg(short, long)]
    pub address: Option<String>,

    /// Port to listen on, overrides the configuration file
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to SQLite database file, overrides the configuration file
    #[arg(short, long)]
    pub database: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Take the client address from this proxy header instead of the socket peer
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Create an administrator with this username on startup.
    /// The password is read from ADMIN_PASSWORD or generated and printed once
    #[arg(long, value_name = "USERNAME")]
    pub create_admin: Option<String>,
}

/// Initialize logging. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(format: &LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load the configuration file and apply command line overrides.
pub fn load_config(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load(&args.config)?;
    if let Some(address) = &args.address {
        config.address = address.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    Ok(config)
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Take the admin password from ADMIN_PASSWORD, or generate one.
/// The second value tells whether the password was generated.
fn admin_password() -> Result<(String, bool), crate::error::Error> {
    if let Ok(password) = std::env::var("ADMIN_PASSWORD") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("ADMIN_PASSWORD") };
        if !password.is_empty() {
            return Ok((password, false));
        }
    }
    let (password, _) = generate_token()?;
    Ok((password, true))
}

/// Handle the --create-admin flag. An existing user with that name is left alone.
pub async fn handle_create_admin(db: &Database, username: &str) {
    match db.users().get_by_username(username).await {
        Ok(Some(existing)) => {
            info!(username = %existing.username, "User already exists, not creating an admin");
        }
        Ok(None) => {
            let (password, generated) = match admin_password() {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Failed to generate admin password");
                    std::process::exit(1);
                }
            };
            let password_hash = match hash_password(&password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };

            let key = Uuid::new_v4().to_string();
            let user = NewUser {
                key: &key,
                username,
                name: username,
                email: "",
                level: UserLevel::Admin,
                password_hash: &password_hash,
            };
            match db.users().create(&user).await {
                Ok(()) => {
                    info!(%username, "Admin user created");
                    if generated {
                        println!();
                        println!("Admin user created: {}", username);
                        println!("Password: {}", password);
                        println!();
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from the loaded configuration.
pub fn build_config(
    app: AppConfig,
    db: Database,
    ip_header: Option<ClientIpHeader>,
) -> ServerConfig {
    ServerConfig {
        db,
        app,
        ip_extractor: ip_header.map(IpExtractor::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["shoptrac"]).unwrap();
        assert_eq!(args.config, PathBuf::from("shoptrac.json"));
        assert!(args.port.is_none());
        assert!(args.ip_header.is_none());
        assert!(args.create_admin.is_none());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "shoptrac",
            "-c",
            "/etc/shoptrac.json",
            "--port",
            "8080",
            "--ip-header",
            "x-forwarded-for",
            "--create-admin",
            "root",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/shoptrac.json"));
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.ip_header, Some(ClientIpHeader::XForwardedFor));
        assert_eq!(args.create_admin.as_deref(), Some("root"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let args = Args::try_parse_from(["shoptrac", "-c", "/nonexistent/shoptrac.json"]).unwrap();
        assert!(matches!(load_config(&args), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let path = std::env::temp_dir().join(format!("shoptrac-test-{}.json", Uuid::new_v4()));
        std::fs::write(&path, r#"{ "port": 9000, "database": "from-file.db" }"#).unwrap();

        let args = Args::try_parse_from([
            "shoptrac",
            "-c",
            path.to_str().unwrap(),
            "--database",
            "from-args.db",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port, 9000);
        assert_eq!(config.database, "from-args.db");
    }

    #[tokio::test]
    async fn test_create_admin_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();

        handle_create_admin(&db, "root").await;
        let first = db.users().get_by_username("root").await.unwrap().unwrap();
        assert_eq!(first.level, UserLevel::Admin);

        handle_create_admin(&db, "root").await;
        let users = db.users().list().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].key, first.key);
    }
}
