//! Command-line options
//!
//! Every global option can also come from the environment so the daemon runs
//! unchanged under a service manager.

use clap::{Args, Parser, Subcommand};
use extsup_engine::{ExtensionConfig, ExtensionKind};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "/var/lib/extsup/extension_servers.json";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Parser)]
#[command(name = "extsupd", version, about = "Extension server supervisor")]
pub struct Cli {
    /// Extension server configuration file
    #[arg(
        long,
        global = true,
        env = "EXTSUP_CONFIG_FILE",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config_file: PathBuf,

    /// Log filter, e.g. `debug` or `extsup_engine=trace`
    #[arg(long, global = true, env = "EXTSUP_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start auto-start servers and supervise them until SIGTERM/SIGINT
    Run,
    /// Print the stored configurations as JSON
    List,
    /// Add or replace a configuration
    Add(AddArgs),
    /// Stop (if needed) and remove a configuration
    Remove { id: String },
    /// Launch one server, print its status after probation, then stop it
    Check { id: String },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub name: String,

    /// email, calendar, filesystem, web-scraper, database or custom
    #[arg(long = "type", default_value = "custom", value_parser = parse_kind)]
    pub kind: ExtensionKind,

    #[arg(long)]
    pub command: String,

    /// Repeat for each argument, in order
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// KEY=VALUE, repeatable. This is the entire environment of the process.
    #[arg(long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub auto_start: bool,

    #[arg(long)]
    pub disabled: bool,

    #[arg(long)]
    pub description: Option<String>,
}

impl AddArgs {
    pub fn into_config(self) -> ExtensionConfig {
        let mut config = ExtensionConfig::new(self.id, self.name, self.command)
            .kind(self.kind)
            .args(self.args)
            .auto_start(self.auto_start)
            .enabled(!self.disabled);
        config.env.extend(self.env);
        config.port = self.port;
        config.description = self.description;
        config
    }
}

impl Cli {
    /// Priority: --log-level / EXTSUP_LOG_LEVEL > RUST_LOG > info
    pub fn log_filter(&self) -> String {
        self.log_level
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }
}

fn parse_kind(s: &str) -> Result<ExtensionKind, String> {
    ExtensionKind::parse(s).ok_or_else(|| {
        let known: Vec<String> = ExtensionKind::ALL.iter().map(|k| k.to_string()).collect();
        format!("unknown type '{s}' (expected one of: {})", known.join(", "))
    })
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
