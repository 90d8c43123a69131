// CLI binary: panicking on unrecoverable errors is standard for CLI tools.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use scpi_console::controls::controls_for;
use scpi_console::descriptor::{distinct_models, DescriptorCache, DescriptorTable};
use scpi_console::error::AppError;
use scpi_console::instrument::{Identity, Instrument, LoopbackTransport};
use scpi_console::render::render;
use scpi_console::script::parse_script;
use scpi_console::session::Session;
use scpi_console::settings::{self, AppSettings};
use scpi_console::workbook::{workbook_schema, SheetSource, Workbook};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "scpi-console", about = "SCPI bench console headless CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Descriptor workbook (JSON export); overrides the saved setting
    #[arg(long, global = true)]
    workbook: Option<PathBuf>,

    /// Config directory override
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the models described by the workbook
    Models,
    /// List the compiled commands for a model
    Commands { model: String },
    /// Show the input controls for one command
    Controls { model: String, command: String },
    /// Render a command without sending it
    Render {
        model: String,
        command: String,
        /// Parameter value, repeatable
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },
    /// Execute a command against a loopback instrument and print the replay script
    Exec {
        model: String,
        command: String,
        /// Resource name recorded in the history
        #[arg(long)]
        resource: String,
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        values: Vec<(String, String)>,
        /// Simulated reply to a query
        #[arg(long)]
        response: Option<String>,
        /// Also write the replay script into the config directory
        #[arg(long)]
        save: bool,
    },
    /// Send raw SCPI text to a loopback instrument
    Send {
        text: String,
        #[arg(long)]
        resource: String,
        #[arg(long)]
        response: Option<String>,
        #[arg(long)]
        save: bool,
    },
    /// Parse an exported script and list its steps
    Replay { script: PathBuf },
    /// Print the JSON Schema of the workbook format
    Schema,
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print current settings
    Show,
    /// Remember the default workbook
    SetWorkbook { path: PathBuf },
    /// Turn the JSONL command log on or off
    Audit {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

fn parse_assignment(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{arg}'"))
}

// ── Environment ──────────────────────────────────────────────────

fn dirs_config_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA")
            .map_or_else(|_| PathBuf::from("C:\\Users\\Default\\AppData\\Roaming"), PathBuf::from)
    } else if cfg!(target_os = "macos") {
        dirs_home().join("Library/Application Support")
    } else {
        std::env::var("XDG_CONFIG_HOME")
            .map_or_else(|_| dirs_home().join(".config"), PathBuf::from)
    };
    base.join(scpi_console::paths::APP_ID)
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
}

struct Context {
    config_dir: PathBuf,
    settings: AppSettings,
    workbook_override: Option<PathBuf>,
    json: bool,
}

impl Context {
    fn workbook(&self) -> Result<Workbook, AppError> {
        let path = self
            .workbook_override
            .as_ref()
            .or(self.settings.workbook_path.as_ref())
            .ok_or("No workbook: pass --workbook or run `scpi-console config set-workbook PATH`")?;
        Ok(Workbook::load(path)?)
    }

    fn table(&self, workbook: &Workbook, model: &str) -> Result<Arc<DescriptorTable>, AppError> {
        let table = DescriptorCache::new()
            .get_or_load(workbook, model)?
            .ok_or_else(|| AppError::NotFound {
                what: format!("Descriptor table for '{model}'"),
            })?;
        for warning in table.warnings() {
            eprintln!("warning: {warning}");
        }
        Ok(table)
    }
}

// ── Output formatting ────────────────────────────────────────────

fn print_output<T: Serialize>(value: &T, raw_json: bool, text: impl FnOnce() -> String) {
    if raw_json {
        let json = serde_json::to_value(value).unwrap_or(Value::Null);
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
    } else {
        println!("{}", text());
    }
}

// ── Commands ─────────────────────────────────────────────────────

fn run(command: Commands, ctx: &Context) -> Result<(), AppError> {
    match command {
        Commands::Models => {
            let workbook = ctx.workbook()?;
            let cache = DescriptorCache::new();
            let mut rows = Vec::new();
            for name in distinct_models(&workbook.sheet_names()) {
                let row = match cache.get_or_load(&workbook, &name) {
                    Ok(Some(table)) => serde_json::json!({
                        "model": name,
                        "commands": table.len(),
                        "warnings": table.warnings().len(),
                    }),
                    Ok(None) => continue,
                    Err(e) => serde_json::json!({ "model": name, "error": e.to_string() }),
                };
                rows.push(row);
            }
            print_output(&rows, ctx.json, || {
                rows.iter()
                    .map(|r| match r.get("error") {
                        Some(e) => format!("{}  (unusable: {})", r["model"].as_str().unwrap_or_default(), e.as_str().unwrap_or_default()),
                        None => format!(
                            "{}  ({} commands, {} warnings)",
                            r["model"].as_str().unwrap_or_default(),
                            r["commands"],
                            r["warnings"]
                        ),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        Commands::Commands { model } => {
            let workbook = ctx.workbook()?;
            let table = ctx.table(&workbook, &model)?;
            print_output(table.as_ref(), ctx.json, || {
                table
                    .commands()
                    .iter()
                    .map(|c| format!("{}  {:<28} {}", c.direction(), c.name(), c.template().as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        Commands::Controls { model, command } => {
            let workbook = ctx.workbook()?;
            let table = ctx.table(&workbook, &model)?;
            let def = table.find(&command).ok_or_else(|| AppError::NotFound {
                what: format!("Command '{command}'"),
            })?;
            let layout = controls_for(def);
            let text = serde_json::to_string_pretty(&layout).unwrap_or_default();
            print_output(&layout, ctx.json, || text);
        }
        Commands::Render { model, command, values } => {
            let workbook = ctx.workbook()?;
            let table = ctx.table(&workbook, &model)?;
            let def = table.find(&command).ok_or_else(|| AppError::NotFound {
                what: format!("Command '{command}'"),
            })?;
            let values: HashMap<String, String> = values.into_iter().collect();
            let rendered = render(def, &values)?;
            print_output(&rendered, ctx.json, || rendered.text.clone());
        }
        Commands::Exec { model, command, resource, values, response, save } => {
            let session = loopback_session(ctx, &model, &resource, response)?;
            let values: HashMap<String, String> = values.into_iter().collect();
            let entry = session.execute(&resource, &command, &values)?;
            eprintln!("{}", entry.audit_line());
            let export = export_history(&session, ctx, save)?;
            print_output(&entry, ctx.json, || export);
        }
        Commands::Send { text, resource, response, save } => {
            let session = loopback_session(ctx, "", &resource, response)?;
            let entry = session.execute_adhoc(&resource, &text)?;
            eprintln!("{}", entry.audit_line());
            let export = export_history(&session, ctx, save)?;
            print_output(&entry, ctx.json, || export);
        }
        Commands::Replay { script } => {
            let source = std::fs::read_to_string(&script)?;
            let steps = parse_script(&source)?;
            print_output(&steps, ctx.json, || {
                steps
                    .iter()
                    .map(|s| format!("{} {}: {}", s.resource, s.direction, s.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        }
        Commands::Schema => {
            let schema = workbook_schema();
            println!("{}", serde_json::to_string_pretty(&schema).unwrap_or_default());
        }
        Commands::Config { action } => config(action.unwrap_or(ConfigAction::Show), ctx)?,
    }
    Ok(())
}

/// A session whose only instrument is `resource`, answering through a loopback link.
fn loopback_session(
    ctx: &Context,
    model: &str,
    resource: &str,
    response: Option<String>,
) -> Result<Session, AppError> {
    let workbook: Arc<dyn SheetSource> = if model.is_empty() {
        Arc::new(Workbook::default())
    } else {
        Arc::new(ctx.workbook()?)
    };
    let transport = LoopbackTransport::new().with_default_response(response.unwrap_or_default());
    let mut session = Session::new(workbook, Box::new(transport));
    if ctx.settings.audit_enabled {
        session = session.with_audit_dir(ctx.config_dir.clone());
    }
    session.register(Instrument::new(resource, Identity::new("", model, "")));
    Ok(session)
}

fn export_history(session: &Session, ctx: &Context, save: bool) -> Result<String, AppError> {
    let export = session.history().export();
    if save {
        let path = scpi_console::paths::history_export_path(&ctx.config_dir);
        scpi_console::files::atomic_write(&path, export.as_bytes())?;
        eprintln!("saved {}", path.display());
    }
    Ok(export)
}

fn config(action: ConfigAction, ctx: &Context) -> Result<(), AppError> {
    let mut updated = ctx.settings.clone();
    match action {
        ConfigAction::Show => {
            let path = scpi_console::paths::settings_path(&ctx.config_dir);
            print_output(&ctx.settings, ctx.json, || {
                format!(
                    "settings: {}\nworkbook: {}\naudit:    {}",
                    path.display(),
                    ctx.settings
                        .workbook_path
                        .as_deref()
                        .map_or_else(|| "(none)".to_string(), |p| p.display().to_string()),
                    if ctx.settings.audit_enabled { "on" } else { "off" }
                )
            });
            return Ok(());
        }
        ConfigAction::SetWorkbook { path } => {
            updated.workbook_path = Some(absolute(&path));
        }
        ConfigAction::Audit { enabled } => updated.audit_enabled = enabled,
    }
    settings::save_settings(&ctx.config_dir, &updated)?;
    print_output(&updated, ctx.json, || "Settings saved.".to_string());
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

// ── Main ─────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(dirs_config_dir);
    let ctx = Context {
        settings: settings::load_settings(&config_dir).unwrap_or_default(),
        config_dir,
        workbook_override: cli.workbook,
        json: cli.json,
    };

    if let Err(e) = run(cli.command, &ctx) {
        if ctx.json {
            println!("{}", serde_json::to_string_pretty(&e).unwrap_or_default());
        } else {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}
