use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use dutylog::config::{Backend, Settings, CONFIG_PATH_VAR};
use dutylog::journal::assemble::form::{from_form, to_form};
use dutylog::journal::assemble::JournalForm;
use dutylog::journal::{ClassCode, Journal, JournalFilter, RecordRef, ShiftType};
use dutylog::reconcile::{Reconciler, SaveMode};
use dutylog::remote;
use dutylog::server::create_router;
use dutylog::types::AppState;

/// Daily duty journal with an offline fallback.
#[derive(Parser)]
#[command(name = "dutylog", version, about, long_about = None)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true, env = CONFIG_PATH_VAR)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the `/journals` HTTP API over the configured backend
    Serve {
        /// Address to listen on, overriding the settings file
        #[arg(long)]
        bind: Option<String>,
    },

    #[command(flatten)]
    Journal(JournalCommands),
}

#[derive(Subcommand)]
enum JournalCommands {
    /// Report whether the remote store is reachable
    Status,

    /// List journals, remote and local merged
    List {
        /// Only read the local store
        #[arg(long)]
        local: bool,
        #[arg(long)]
        shift: Option<ShiftType>,
        #[arg(long)]
        class: Option<ClassCode>,
        /// Earliest date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Match against date, duty reps or class name
        #[arg(long)]
        search: Option<String>,
    },

    /// Print one journal
    Show {
        id: String,
        /// Print as an editable form instead of the stored record
        #[arg(long)]
        form: bool,
    },

    /// Add a journal from a form file (`-` reads stdin)
    Add {
        file: PathBuf,
        /// Save to the local store without trying the remote one
        #[arg(long)]
        offline: bool,
    },

    /// Replace a journal with the contents of a form file (`-` reads stdin)
    Edit { id: String, file: PathBuf },

    /// Delete a journal
    Delete { id: String },

    /// Push journals saved offline to the remote store
    Sync,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_form(path: &Path) -> Result<Journal> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading form from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };

    let form: JournalForm = serde_json::from_str(&content).context("parsing journal form")?;
    Ok(from_form(&form)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(settings: &Settings, bind: Option<String>) -> Result<()> {
    if settings.backend == Backend::Api {
        bail!("`serve` needs the tables or memory backend, not api");
    }

    let store = remote::connect(settings).context("connecting to the journal store")?;
    let app = create_router(Arc::new(AppState::new(store)));

    let address = bind.unwrap_or_else(|| settings.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(address = %address, backend = ?settings.backend, "Serving journal API");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}

async fn run(settings: &Settings, command: JournalCommands) -> Result<()> {
    let reconciler = Reconciler::from_settings(settings)?;

    match command {
        JournalCommands::Status => print_json(&reconciler.connection_status().await)?,
        JournalCommands::List {
            local,
            shift,
            class,
            from,
            to,
            search,
        } => {
            let filter = JournalFilter {
                shift,
                class,
                from,
                to,
                search,
            };
            let journals = if local {
                reconciler.list_local()?
            } else {
                let listing = reconciler.list().await?;
                if let Some(e) = &listing.degraded {
                    warn!(error = %e, "Showing local journals only");
                }
                listing.journals
            };
            print_json(&filter.apply(journals))?;
        }
        JournalCommands::Show { id, form } => {
            let journal = reconciler
                .get(&RecordRef::parse(&id))
                .await?
                .with_context(|| format!("journal {id} not found"))?;
            if form {
                print_json(&to_form(&journal))?;
            } else {
                print_json(&journal)?;
            }
        }
        JournalCommands::Add { file, offline } => {
            let journal = read_form(&file)?;
            let mode = if offline {
                SaveMode::Offline
            } else {
                SaveMode::Auto
            };
            let id = reconciler.create(&journal, mode).await?;
            if id.is_local() {
                warn!(journal_id = %id, "Saved offline; run `dutylog sync` once connected");
            }
            println!("{id}");
        }
        JournalCommands::Edit { id, file } => {
            let journal = read_form(&file)?;
            reconciler.update(&RecordRef::parse(&id), &journal).await?;
            println!("{id}");
        }
        JournalCommands::Delete { id } => {
            reconciler.delete(&RecordRef::parse(&id)).await?;
            println!("{id}");
        }
        JournalCommands::Sync => {
            let report = reconciler.push_offline().await?;
            for (local_id, remote_id) in &report.pushed {
                println!("{local_id} -> {remote_id}");
            }
            for (local_id, e) in &report.failed {
                warn!(local_id = %local_id, error = %e, "Left in local store");
            }
            for (local_id, remote_id, e) in &report.duplicated {
                warn!(
                    local_id = %local_id,
                    journal_id = %remote_id,
                    error = %e,
                    "Stored remotely but still held locally; delete the local copy before syncing again"
                );
            }
            if !report.is_clean() {
                bail!(
                    "{} journal(s) could not be pushed, {} duplicated",
                    report.failed.len(),
                    report.duplicated.len()
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Commands::Serve { bind } => serve(&settings, bind).await,
        Commands::Journal(command) => run(&settings, command).await,
    }
}
