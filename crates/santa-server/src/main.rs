//! santa-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, starts the deadline sweep and serves the JSON API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for an account's `password_hash`:
//!
//! ```
//! cargo run -p santa-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use santa_api::ApiState;
use santa_core::lifecycle::Lifecycle;
use santa_server::{
  ServerConfig,
  auth::AccountDirectory,
  mail::SmtpNotifier,
  notify::{LogNotifier, Mailer},
  payment::StripeGateway,
};
use santa_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Santa gift-exchange server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("SANTA").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if server_cfg.accounts.is_empty() {
    tracing::warn!("no accounts configured; nobody can create sessions");
  }
  if server_cfg.payment.is_none() {
    tracing::warn!("no payment section; paid plans cannot be checked out");
  }

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let notifier = match &server_cfg.smtp {
    Some(smtp) => {
      let notifier = SmtpNotifier::new(smtp, server_cfg.public_url.clone())
        .context("invalid smtp section")?;
      tracing::info!(relay = %smtp.host, port = smtp.port, "sending assignments by email");
      Mailer::Smtp(notifier)
    }
    None => {
      tracing::warn!("no smtp section; assignment notices are only logged");
      Mailer::Log(LogNotifier::new(server_cfg.public_url.clone()))
    }
  };

  let lifecycle = Arc::new(Lifecycle::new(Arc::new(store), Arc::new(notifier)));

  let interval = Duration::from_secs(server_cfg.sweep_interval_secs.max(1));
  let _sweeper = lifecycle.scheduler().spawn(interval);
  tracing::info!(every = ?interval, "deadline sweep started");

  let state = ApiState {
    lifecycle,
    gateway: Arc::new(StripeGateway::new(server_cfg.payment.clone())),
  };
  let accounts = Arc::new(AccountDirectory::new(server_cfg.accounts.clone()));
  let app = santa_server::router(state, accounts);

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
