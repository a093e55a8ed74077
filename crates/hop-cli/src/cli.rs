use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORAGE_BACKEND_ENV: &str = "HOP_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "HOP_MYSQL_DSN";
pub const OPTIONS_FILE_ENV: &str = "HOP_OPTIONS_FILE";
pub const LOG_FORMAT_ENV: &str = "HOP_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "hop", about = "Shorten URLs and follow short links")]
pub struct Cli {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    /// JSON file overriding the default options.
    #[arg(long, env = OPTIONS_FILE_ENV)]
    pub options: Option<PathBuf>,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a short link for a long URL.
    Shorten {
        url: Option<String>,
        #[arg(long)]
        client: Option<String>,
    },
    /// Follow a short link, recording the hit.
    Resolve {
        /// Bare token or `/+/<token>` path.
        token: Option<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// List the links a client created, newest first.
    History {
        client_id: String,
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Manage blacklisted clients.
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum BlacklistAction {
    Add { client: String },
    Remove { client: String },
    List,
}
