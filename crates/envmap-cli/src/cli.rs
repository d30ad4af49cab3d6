use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// CLI surface definition: thin forwarding to the configured provider.
#[derive(Parser, Debug)]
#[command(
    name = "envmap",
    about = "Resolve secrets from pluggable providers, including an encrypted local store",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a single secret (masked unless --raw).
    Get {
        name: String,
        #[arg(short, long, default_value = "dev")]
        env: String,
        /// Print the value unmasked.
        #[arg(long)]
        raw: bool,
    },
    /// List secrets for an environment (masked unless --raw).
    List {
        #[arg(short, long, default_value = "dev")]
        env: String,
        /// Only show names starting with this filter.
        #[arg(long, default_value = "")]
        filter: String,
        /// Include creation time when the provider records it.
        #[arg(long)]
        metadata: bool,
        /// Print values unmasked.
        #[arg(long)]
        raw: bool,
    },
    /// Create or update a secret. The value is read from --file, or from stdin
    /// when neither a file nor an inline value is given.
    Set {
        name: String,
        /// Inline value; ends up in shell history, prefer --file or stdin.
        #[arg(conflicts_with = "file")]
        value: Option<String>,
        /// File holding the value; surrounding whitespace is trimmed.
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(short, long, default_value = "dev")]
        env: String,
    },
    /// Write every secret of an environment to stdout, unmasked.
    Export {
        #[arg(short, long, default_value = "dev")]
        env: String,
        #[arg(long, value_enum, default_value_t = ExportFormat::Plain)]
        format: ExportFormat,
    },
    /// Generate a new 256-bit key file for the local store.
    Keygen { path: PathBuf },
    /// Show registered provider types.
    Providers,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Output format of `export`.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum ExportFormat {
    /// `NAME=value` lines, sorted by name.
    #[default]
    Plain,
    /// One pretty-printed JSON object.
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a starter config file if one does not exist.
    Init,
}
