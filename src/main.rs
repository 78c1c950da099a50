//! shelf-rs server entry point.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::Parser;
use shelf_rs::{
    auth::{AuthService, NewAccount, TokenIssuer},
    config::{Cli, Command, Config, UserCommand},
    db::{Database, User, timestamp_to_datetime},
    server::{self, AppState},
    uploads::FileStore,
};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the token signing secret.
const SECRET_ENV: &str = "SHELF_SECRET";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.clone().or_else(Config::find_config_file) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Init { force } => cmd_init(force),
        Command::User { action } => cmd_user(action, &config),
        Command::Serve { bind } => cmd_serve(config, bind).await,
    }
}

/// Write a starter config and prepare the data directories.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let target = Path::new("config.toml");
    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to replace it)",
            target.display()
        );
    }

    std::fs::write(target, Config::generate_default())?;
    println!("Wrote {}", target.display());

    let config = Config::default();
    Database::open(&config.database.path)?;
    println!("Database ready at {}", config.database.path.display());

    FileStore::new(config.uploads.clone()).ensure_dirs()?;
    println!("Uploads will be stored in {}", config.uploads.dir.display());

    println!();
    println!("Next, create an administrator:");
    println!("  shelf-rs user add <username> --email <email> --role admin");

    Ok(())
}

/// Account administration from the command line.
fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    // Tokens are never handed out here, so a throwaway key is enough
    let tokens = TokenIssuer::new(&random_secret(), config.auth.token_ttl_seconds());
    let auth = AuthService::new(db, tokens, config.auth.registration_enabled());

    let report = |found: bool, done: &str, username: &str| {
        if found {
            println!("{}: {}", done, username);
        } else {
            println!("No such user: {}", username);
        }
    };

    match action {
        UserCommand::Add {
            username,
            email,
            password,
            role,
            author,
        } => {
            let password = password.map_or_else(|| read_password("Password: "), Ok)?;
            let account = NewAccount {
                username,
                email,
                password,
                is_author: author,
                ..Default::default()
            };

            let user = auth.create_user(account, &role)?;
            println!(
                "Added {} <{}> as {}{} [{}]",
                user.username,
                user.email,
                user.role,
                if user.is_author { ", author" } else { "" },
                user.id
            );
        }
        UserCommand::Del { username } => {
            report(auth.delete_user(&username)?, "Removed", &username);
        }
        UserCommand::List => print_users(&auth.list_users()?),
        UserCommand::Passwd { username, password } => {
            let password = password.map_or_else(|| read_password("New password: "), Ok)?;
            report(
                auth.set_password(&username, &password)?,
                "Password updated",
                &username,
            );
        }
        UserCommand::Deactivate { username } => {
            report(auth.set_active(&username, false)?, "Deactivated", &username);
        }
        UserCommand::Activate { username } => {
            report(auth.set_active(&username, true)?, "Activated", &username);
        }
    }

    Ok(())
}

fn print_users(users: &[User]) {
    if users.is_empty() {
        println!("No accounts yet.");
        return;
    }

    println!(
        "{:<20} {:<30} {:<6} {:<7} {:<7} LAST LOGIN",
        "USERNAME", "EMAIL", "ROLE", "AUTHOR", "ACTIVE"
    );
    println!("{}", "-".repeat(90));

    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    for user in users {
        let last_login = match user.last_login {
            Some(ts) => timestamp_to_datetime(ts).format("%Y-%m-%d %H:%M").to_string(),
            None => "never".to_string(),
        };
        println!(
            "{:<20} {:<30} {:<6} {:<7} {:<7} {}",
            user.username,
            user.email,
            user.role,
            yes_no(user.is_author),
            yes_no(user.is_active),
            last_login
        );
    }
}

/// Run the HTTP server.
async fn cmd_serve(mut config: Config, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shelf_rs=info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let secret = match std::env::var(SECRET_ENV).ok().or(config.auth.secret.clone()) {
        Some(secret) if !secret.is_empty() => secret.into_bytes(),
        _ => {
            tracing::warn!(
                "No token secret configured (set {} or auth.secret); tokens will not survive a restart",
                SECRET_ENV
            );
            random_secret()
        }
    };

    let db = Database::open(&config.database.path)?;
    let state = AppState::new(&config, db.clone(), &secret);
    state.files.ensure_dirs()?;

    tracing::info!(
        database = %config.database.path.display(),
        uploads = %config.uploads.dir.display(),
        token_minutes = config.auth.token_minutes,
        "Starting shelf-rs"
    );

    if config.maintenance.purge_interval_seconds > 0 {
        spawn_revocation_purge(db, config.maintenance.purge_interval_seconds);
    }

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Listening");

    axum::serve(listener, server::create_router(state)).await?;
    Ok(())
}

/// Periodically drop revocation entries whose tokens have expired anyway.
fn spawn_revocation_purge(db: Database, every_seconds: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every_seconds));
        // First tick fires immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            match db.purge_expired_revocations() {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired token revocations"),
                Err(e) => tracing::warn!(error = %e, "Revocation purge failed"),
            }
        }
    });
}

/// Generate a random signing secret.
fn random_secret() -> Vec<u8> {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    URL_SAFE_NO_PAD.encode(key).into_bytes()
}

/// Read a password from stdin.
fn read_password(label: &str) -> anyhow::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", label)?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
