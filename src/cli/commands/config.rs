use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of project config"
        )]
        global: bool,
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => handle_init(global, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(format),
    }
}

fn handle_init(global: bool, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let (scope, existing) = if global {
        ("global", Config::global_path())
    } else {
        ("project", Config::project_path())
    };
    let config_path =
        existing.ok_or_else(|| anyhow::anyhow!("could not determine {scope} config directory"))?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} config already exists at: {}\nUse --force to overwrite.",
            scope,
            config_path.display()
        );
    }

    let path = Config::init(global).with_context(|| format!("failed to create {scope} config"))?;
    print!(
        "{}",
        formatter.format_message(&format!("Created {} config at: {}", scope, path.display()))
    );

    Ok(())
}

/// Copy of the config safe to print: secrets are masked.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some("********".to_string());
    }
    config
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let resolved = Config::load()?;
    let config = redacted(&resolved.config);

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "config": config,
            "path": resolved.path,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match resolved.path {
        Some(ref path) => println!("# Loaded from: {}", path.display()),
        None => println!("# No config file found; showing defaults"),
    }
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&config).context("failed to serialize config")?
    );

    Ok(())
}

fn handle_path(format: OutputFormat) -> Result<()> {
    let project = Config::project_path();
    let global = Config::global_path();
    let snapshot = Config::default_snapshot_path();

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "project": project,
            "global": global,
            "snapshot": snapshot,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let describe = |path: &Option<std::path::PathBuf>| match path {
        Some(p) if p.exists() => format!("{} (exists)", p.display()),
        Some(p) => format!("{} (not found)", p.display()),
        None => "(unavailable)".to_string(),
    };

    println!("Project config:  {}", describe(&project));
    println!("Global config:   {}", describe(&global));
    println!("Index snapshot:  {}", describe(&snapshot));

    Ok(())
}
