mod cli;
mod config;
mod providers;

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Read},
    path::Path,
};

use chrono::SecondsFormat;
use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use envmap_core::{list_or_describe, Provider, ProviderRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand, ExportFormat};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Version => print_version(),
        Command::Providers => print_providers(&providers::registry()?),
        Command::Keygen { path } => keygen(&path)?,
        Command::Config(ConfigCommand::Init) => init_config(config_path)?,
        Command::Get { name, env, raw } => {
            let provider = open(config_path, &env)?;
            let value = provider.get(&name).await?;
            println!("{}", display_value(&value, raw));
        }
        Command::List {
            env,
            filter,
            metadata,
            raw,
        } => {
            let provider = open(config_path, &env)?;
            for line in render_list(provider.as_ref(), &filter, metadata, raw).await? {
                println!("{line}");
            }
        }
        Command::Set {
            name,
            value,
            file,
            env,
        } => {
            let value = read_secret(value, file.as_deref(), io::stdin().lock())?;
            let provider = open(config_path, &env)?;
            provider.set(&name, &value).await?;
            eprintln!("Stored {name} in {env}");
        }
        Command::Export { env, format } => {
            let provider = open(config_path, &env)?;
            print!("{}", render_export(&provider.list("").await?, format)?);
        }
    }

    Ok(())
}

fn init_tracing() {
    // Secrets go to stdout; keep diagnostics on stderr and quiet by default.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("envmap {}", env!("CARGO_PKG_VERSION"));
}

fn print_providers(registry: &ProviderRegistry) {
    for info in registry.infos() {
        println!("{:<14} {}", info.kind, info.description);
        if !info.required_fields.is_empty() {
            println!("{:<14} requires: {}", "", info.required_fields.join(", "));
        }
    }
}

fn open(config_path: Option<&Path>, env: &str) -> Result<Box<dyn Provider>> {
    let config = config::load(config_path)?;
    let registry = providers::registry()?;
    providers::open(&config, &registry, env)
}

fn keygen(path: &Path) -> Result<()> {
    envmap_storage::generate_key_file(path)?;
    println!("Key written to {}", path.display());
    Ok(())
}

fn init_config(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config::default_path()?,
    };
    let starter = config::Config::starter(config::default_store_path()?, config::default_key_path()?);
    let path = config::write_if_missing(&starter, &path)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

/// Value source for `set`: inline, a file (trimmed), or `stdin` (trimmed).
fn read_secret(value: Option<String>, file: Option<&Path>, mut stdin: impl Read) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    let raw = match file {
        Some(path) => fs::read_to_string(path)
            .wrap_err_with(|| format!("read secret file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            stdin
                .read_to_string(&mut buf)
                .wrap_err("read secret from stdin")?;
            buf
        }
    };
    Ok(raw.trim().to_string())
}

/// Keep the first and last two characters of longer values; hide short ones entirely.
fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => "(empty)".to_string(),
        1..=4 => "****".to_string(),
        n => {
            let head: String = chars[..2].iter().collect();
            let tail: String = chars[n - 2..].iter().collect();
            format!("{head}****{tail}")
        }
    }
}

fn display_value(value: &str, raw: bool) -> String {
    if raw {
        value.to_string()
    } else {
        mask_value(value)
    }
}

/// One `NAME=value` line per secret, with the creation time when requested and known.
async fn render_list(
    provider: &dyn Provider,
    filter: &str,
    metadata: bool,
    raw: bool,
) -> Result<Vec<String>> {
    if !metadata {
        let values = provider.list(filter).await?;
        return Ok(values
            .into_iter()
            .map(|(name, value)| format!("{name}={}", display_value(&value, raw)))
            .collect());
    }

    let records = list_or_describe(provider, filter).await?;
    Ok(records
        .into_iter()
        .map(|(name, record)| {
            let line = format!("{name}={}", display_value(&record.value, raw));
            match record.created_at {
                Some(ts) => format!(
                    "{line}  # created {}",
                    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
                None => line,
            }
        })
        .collect())
}

fn render_export(values: &BTreeMap<String, String>, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Plain => Ok(values
            .iter()
            .map(|(name, value)| format!("{name}={value}\n"))
            .collect()),
        ExportFormat::Json => {
            let mut body = serde_json::to_string_pretty(values)?;
            body.push('\n');
            Ok(body)
        }
    }
}
