use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Online library server connecting authors and readers.
#[derive(Parser, Debug, Clone)]
#[command(name = "shelf-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to load instead of the default search path.
    #[arg(short, long, env = "SHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// What to do; serves when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve {
        /// Listen address, overriding `server.bind`.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Manage accounts.
    User {
        /// Account action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Write a starter config and create the database.
    Init {
        /// Replace an existing config.toml.
        #[arg(short, long)]
        force: bool,
    },
}

/// Account actions.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Create an account.
    Add {
        /// Username.
        username: String,
        /// Email address.
        #[arg(short, long)]
        email: String,
        /// Password; read from stdin when omitted.
        #[arg(short, long)]
        password: Option<String>,
        /// Role: "user" or "admin".
        #[arg(short, long, default_value = "user")]
        role: String,
        /// Also create an author profile.
        #[arg(long)]
        author: bool,
    },

    /// Delete an account and everything it owns.
    Del {
        /// Username.
        username: String,
    },

    /// Print all accounts.
    List,

    /// Set a new password.
    Passwd {
        /// Username.
        username: String,
        /// New password; read from stdin when omitted.
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Deactivate a user account (login is refused).
    Deactivate {
        /// Username.
        username: String,
    },

    /// Reactivate a user account.
    Activate {
        /// Username.
        username: String,
    },
}

/// Server configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Accounts and tokens.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upload configuration.
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Reading progress configuration.
    #[serde(default)]
    pub reading: ReadingConfig,

    /// Maintenance configuration.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8000,
    )
}

/// SQLite storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, created on first start.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/shelf.db")
}

/// Account and token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// "open" lets anyone register; "disabled" leaves account creation to the CLI.
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Token signing secret. Overridden by `SHELF_SECRET`.
    #[serde(default)]
    pub secret: Option<String>,

    /// Access token lifetime in minutes.
    #[serde(default = "default_token_minutes")]
    pub token_minutes: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            secret: None,
            token_minutes: default_token_minutes(),
        }
    }
}

fn default_registration() -> String {
    "open".to_string()
}

fn default_token_minutes() -> u32 {
    30
}

impl AuthConfig {
    /// Whether self-service registration is allowed.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }

    /// Token lifetime in seconds.
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_minutes as i64 * 60
    }
}

/// Upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory for uploaded books and covers.
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Maximum book file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Maximum cover image size in bytes.
    #[serde(default = "default_max_cover_size")]
    pub max_cover_size: usize,

    /// Accepted book file extensions.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Longest thumbnail edge in pixels.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_file_size: default_max_file_size(),
            max_cover_size: default_max_cover_size(),
            allowed_extensions: default_allowed_extensions(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

fn default_max_cover_size() -> usize {
    2 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".to_string(), "epub".to_string(), "txt".to_string()]
}

fn default_thumbnail_size() -> u32 {
    200
}

impl UploadConfig {
    /// Check whether a book file extension is accepted.
    pub fn extension_allowed(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

/// How a progress update interacts with the stored page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// The submitted page wins, so readers may go back.
    #[default]
    Latest,
    /// The furthest page reached is kept.
    Furthest,
}

/// Reading progress configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingConfig {
    /// Merge strategy: "latest" or "furthest".
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

/// Maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval for purging expired token revocations (0 to disable).
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            purge_interval_seconds: default_purge_interval(),
        }
    }
}

fn default_purge_interval() -> u64 {
    3600
}

impl Config {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        use crate::error::AppError;

        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| AppError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// First existing config file among the working directory, the user
    /// config directory and `/etc/shelf-rs`.
    pub fn find_config_file() -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from("config.toml"), PathBuf::from("shelf-rs.toml")];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("shelf-rs").join("config.toml"));
        }
        candidates.push(PathBuf::from("/etc/shelf-rs/config.toml"));

        candidates.into_iter().find(|p| p.is_file())
    }

    /// Commented starter config written by `init`.
    pub fn generate_default() -> String {
        r#"# shelf-rs configuration

[server]
bind = "0.0.0.0:8000"

[database]
# path = "/var/lib/shelf-rs/shelf.db"

[auth]
# Registration mode: "open" or "disabled"
registration = "open"
# Token signing secret (or set SHELF_SECRET)
# secret = "change-me"
# Access token lifetime in minutes
token_minutes = 30

[uploads]
# dir = "/var/lib/shelf-rs/uploads"
max_file_size = 10485760
max_cover_size = 2097152
allowed_extensions = ["pdf", "epub", "txt"]
thumbnail_size = 200

[reading]
# Merge strategy: "latest" (readers may go back) or "furthest"
merge_strategy = "latest"

[maintenance]
# Purge interval for expired token revocations in seconds (0 to disable)
purge_interval_seconds = 3600
"#
        .to_string()
    }
}

/// Supported book file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    /// EPUB format (Electronic Publication).
    Epub,
    /// PDF format (Portable Document Format).
    Pdf,
    /// Plain text format.
    Txt,
}

impl BookFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            BookFormat::Epub => "application/epub+zip",
            BookFormat::Pdf => "application/pdf",
            BookFormat::Txt => "text/plain; charset=utf-8",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            "txt" => Some(BookFormat::Txt),
            _ => None,
        }
    }

    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Pdf => "pdf",
            BookFormat::Txt => "txt",
        }
    }
}
