use crate::pipeline::{PipelineOptions, RegisteredFetchPolicy};
use crate::torrent::{Credentials, TransmissionClient};
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("must set --db")]
    MissingDatabase,
    #[error("must provide one or more input files")]
    NoInputs,
    #[error("invalid --exclude pattern: {0}")]
    InvalidExclude(#[from] regex::Error),
    #[error("--server must not be empty")]
    MissingServer,
}

/// Command line flags. Every flag can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "reconcile",
    version,
    about = "Add torrents to Transmission at the directories that already hold their files"
)]
pub struct Args {
    /// SQLite path database
    #[arg(long, env = "RECONCILE_DB")]
    pub db: Option<PathBuf>,

    /// Timeout for database operations, in seconds
    #[arg(long = "db-timeout", env = "RECONCILE_DB_TIMEOUT", default_value_t = 30)]
    pub db_timeout_secs: u64,

    /// Regex for excluding matched paths from the database
    #[arg(long, env = "RECONCILE_EXCLUDE")]
    pub exclude: Option<String>,

    /// Transmission server, host:port
    #[arg(long, env = "RECONCILE_SERVER", default_value = "localhost:9091")]
    pub server: String,

    #[arg(short = 'u', long, env = "RECONCILE_USERNAME", default_value = "transmission")]
    pub username: String,

    #[arg(
        short = 'p',
        long,
        env = "RECONCILE_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    pub password: String,

    /// Use SSL in server connections
    #[arg(long, env = "RECONCILE_SSL")]
    pub ssl: bool,

    /// Fail instead of continuing when the registered torrent list cannot be fetched
    #[arg(long, env = "RECONCILE_STRICT_REGISTERED")]
    pub strict_registered: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,

    /// Files of `torrent<TAB>contained-file` lines; `-` reads stdin
    pub inputs: Vec<PathBuf>,
}

impl Args {
    /// Parse the process arguments.
    /// In debug builds a .env file is loaded first, so its values act as flag defaults.
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            let _ = dotenvy::dotenv();
        }

        Self::parse()
    }
}

/// Run configuration, built once at startup and handed to each component
#[derive(Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub database_timeout: Duration,
    pub exclude: Option<Regex>,
    pub server: String,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub fetch_policy: RegisteredFetchPolicy,
    pub verbose: bool,
    pub inputs: Vec<PathBuf>,
}

impl Config {
    /// Validate parsed flags
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.inputs.is_empty() {
            return Err(ConfigError::NoInputs);
        }

        let database_path = args
            .db
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingDatabase)?;

        let exclude = match args.exclude.as_deref() {
            None | Some("") => None,
            Some(pattern) => Some(Regex::new(pattern)?),
        };

        let server = args.server.trim().to_string();
        if server.is_empty() {
            return Err(ConfigError::MissingServer);
        }

        let fetch_policy = if args.strict_registered {
            RegisteredFetchPolicy::Abort
        } else {
            RegisteredFetchPolicy::Degrade
        };

        Ok(Self {
            database_path,
            database_timeout: Duration::from_secs(args.db_timeout_secs),
            exclude,
            server,
            username: args.username,
            password: args.password,
            use_tls: args.ssl,
            fetch_policy,
            verbose: args.verbose,
            inputs: args.inputs,
        })
    }

    pub fn rpc_url(&self) -> String {
        TransmissionClient::rpc_url_for(&self.server, self.use_tls)
    }

    /// Basic auth credentials; none when no username is configured
    pub fn credentials(&self) -> Option<Credentials> {
        if self.username.is_empty() {
            return None;
        }
        Some(Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            exclude: self.exclude.clone(),
            fetch_policy: self.fetch_policy,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("database_timeout", &self.database_timeout)
            .field("exclude", &self.exclude.as_ref().map(Regex::as_str))
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("fetch_policy", &self.fetch_policy)
            .field("inputs", &self.inputs)
            .finish()
    }
}
