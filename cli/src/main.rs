mod commands;
mod config;
mod mcp;
mod server;
mod tools;
mod widget;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{WidgetAction, cmd_add, cmd_list, cmd_remove, cmd_widget};
use crate::config::Config;
use crate::widget::{TemplateSource, WidgetTemplate};
use dinner_core::reconcile::MealField;
use dinner_core::store::MealStore;

#[derive(Parser)]
#[command(
    name = "dinner",
    version,
    about = "A dinner planner served to agents over the Model Context Protocol"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a meal to the plan
    Add {
        /// Meal name
        meal: String,
        /// Date of the meal (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(short, long)]
        date: Option<String>,
        /// Optional notes
        #[arg(short, long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a meal by ID
    Remove {
        /// Meal ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the planned meals
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the MCP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value = "8000")]
        port: u16,
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,
        /// Public base URL the widget loads its scripts from (default: http://localhost:<port>)
        #[arg(long, env = "BASE_URL")]
        base_url: Option<String>,
        /// Directory holding the built widget assets
        #[arg(long, env = "DINNER_ASSETS_DIR", default_value = "assets")]
        assets: PathBuf,
        /// Database file (default: dinner.db in the data directory)
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        /// Keep the plan in memory only; it is lost on exit
        #[arg(long, conflicts_with = "db")]
        in_memory: bool,
    },
    /// Reconcile a tool output with the cached widget state and render it
    Widget {
        /// Structured content of a tool result (JSON file)
        #[arg(long, value_name = "FILE")]
        tool_output: Option<PathBuf>,
        /// Cached widget state (default: widget-state.json in the data directory)
        #[arg(long, value_name = "FILE")]
        state: Option<PathBuf>,
        /// Output the resulting state as JSON
        #[arg(long)]
        json: bool,
        #[command(subcommand)]
        action: Option<WidgetCommands>,
    },
}

#[derive(Subcommand)]
enum WidgetCommands {
    /// Insert a blank row at the top
    Add,
    /// Edit a field of a row
    Edit {
        /// Row ID
        id: String,
        /// Field: meal, date, notes
        field: MealField,
        /// New value (empty clears date and notes)
        value: String,
    },
    /// Delete a row
    Delete {
        /// Row ID
        id: String,
    },
    /// Expand or collapse a row's notes
    Toggle {
        /// Row ID
        id: String,
    },
}

impl From<WidgetCommands> for WidgetAction {
    fn from(cmd: WidgetCommands) -> Self {
        match cmd {
            WidgetCommands::Add => Self::Add,
            WidgetCommands::Edit { id, field, value } => Self::Edit { id, field, value },
            WidgetCommands::Delete { id } => Self::Delete { id },
            WidgetCommands::Toggle { id } => Self::Toggle { id },
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(data_dir = %config.data_dir.display(), "loaded config");

    match cli.command {
        Commands::Add {
            meal,
            date,
            notes,
            json,
        } => {
            let store = MealStore::open(&config.db_path)?;
            cmd_add(&store, &meal, date.as_deref(), notes, json)
        }
        Commands::Remove { id, json } => {
            let store = MealStore::open(&config.db_path)?;
            cmd_remove(&store, &id, json)
        }
        Commands::List { json } => {
            let store = MealStore::open(&config.db_path)?;
            cmd_list(&store, json)
        }
        Commands::Serve {
            port,
            bind,
            base_url,
            assets,
            db,
            in_memory,
        } => {
            let store = if in_memory {
                tracing::info!("using in-memory store");
                MealStore::open_in_memory()?
            } else {
                let path = db.unwrap_or(config.db_path);
                tracing::info!(path = %path.display(), "opening store");
                MealStore::open(&path)?
            };
            tracing::info!(meals = store.count()?, "store ready");

            let base_url = base_url.unwrap_or_else(|| format!("http://localhost:{port}"));
            let widget = WidgetTemplate::load(&assets, &base_url)?;
            match &widget.source {
                TemplateSource::File(path) => {
                    tracing::info!(path = %path.display(), "widget template loaded");
                }
                TemplateSource::Generated => tracing::warn!(
                    assets = %assets.display(),
                    %base_url,
                    "no built widget found, serving a generated shell"
                ),
            }

            server::start_server(
                store,
                widget,
                server::ServeOptions {
                    bind,
                    port,
                    assets_dir: assets,
                },
            )
            .await
        }
        Commands::Widget {
            tool_output,
            state,
            json,
            action,
        } => {
            let state_path = state.unwrap_or(config.widget_state_path);
            cmd_widget(
                tool_output.as_deref(),
                &state_path,
                action.map(WidgetAction::from),
                json,
            )
        }
    }
}
