mod panic_handler;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use serde::Deserialize;
use simplelog::{Config, LevelFilter, WriteLogger};

use folio::blocks::{Block, BlockSequence};
use folio::progress::{
    DwellOutcome, IntersectionReport, JsonFileBackend, PersistWorker, ProgressBackend,
    ReadingSession,
};
use folio::settings;

const APP_NAME: &str = "folio";
const PROGRESS_FILENAME: &str = "progress.json";
/// Upper bound on timer firings between two trace events and after the last one
const MAX_TRAILING_TICKS: usize = 10_000;

#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Reading progress tracking for long documents")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded viewing trace against a document's blocks
    Replay {
        /// JSON array of blocks in reading order
        #[arg(long)]
        blocks: PathBuf,
        /// JSON array of timestamped viewing events
        #[arg(long)]
        trace: PathBuf,
        /// Progress file (defaults to the user data directory)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Document id (defaults to the blocks file name)
        #[arg(long)]
        document: Option<String>,
    },
    /// Show stored reading progress
    Progress {
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        document: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct TraceStep {
    /// Milliseconds since the start of the trace
    at_ms: u64,
    #[serde(flatten)]
    event: TraceEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TraceEvent {
    Select {
        #[serde(default)]
        block_id: Option<String>,
    },
    Visible {
        block_id: String,
        ratio: f32,
    },
    Tick,
}

fn main() -> Result<()> {
    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create("folio.log")?,
    )?;
    panic_handler::initialize_panic_handler();

    let cli = Cli::parse();
    match &cli.config {
        Some(path) => settings::load_settings_from_path(path),
        None => settings::load_settings(),
    }

    info!("Starting folio");
    match cli.command {
        Command::Replay {
            blocks,
            trace,
            store,
            document,
        } => replay(&blocks, &trace, store, document),
        Command::Progress { store, document } => show_progress(store, document.as_deref()),
    }
}

fn default_store_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_NAME).join(PROGRESS_FILENAME))
        .context("Could not determine data directory, pass --store")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn replay(
    blocks_path: &Path,
    trace_path: &Path,
    store: Option<PathBuf>,
    document: Option<String>,
) -> Result<()> {
    let blocks: Vec<Block> = read_json(blocks_path)?;
    let steps: Vec<TraceStep> = read_json(trace_path)?;
    let document_id = match document {
        Some(id) => id,
        None => blocks_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .context("Blocks path has no file name, pass --document")?,
    };
    if blocks.is_empty() {
        bail!("{} contains no blocks", blocks_path.display());
    }

    let store_path = match store {
        Some(path) => path,
        None => default_store_path()?,
    };
    let backend = JsonFileBackend::load_or_empty(&store_path);
    let snapshot = backend.load_snapshot(&document_id);
    let writer = PersistWorker::spawn(backend);

    let mut session = ReadingSession::new(
        document_id.clone(),
        BlockSequence::new(blocks),
        &settings::get_tracking(),
        Box::new(writer.handle()),
    );
    session.initialize(&snapshot);

    let start = Instant::now();
    let mut confirmed = Vec::new();
    for step in steps {
        let now = start + Duration::from_millis(step.at_ms);
        run_due_timers(&mut session, now, &mut confirmed);

        let outcome = match step.event {
            TraceEvent::Select { block_id } => {
                session.select_block(block_id.as_deref());
                DwellOutcome::Idle
            }
            TraceEvent::Visible { block_id, ratio } => {
                session.on_visibility(&IntersectionReport::new(block_id, ratio), now)
            }
            TraceEvent::Tick => session.tick(now),
        };
        debug!("t={}ms {outcome:?}", step.at_ms);
        if let DwellOutcome::Confirmed(id) = outcome {
            confirmed.push(id);
        }
    }

    // Let pending sweeps and throttled writes fire
    let mut fired = 0;
    while let Some(deadline) = session.next_deadline() {
        if fired == MAX_TRAILING_TICKS {
            warn!("Timers still pending after {fired} ticks, giving up");
            break;
        }
        if let DwellOutcome::Confirmed(id) = session.tick(deadline) {
            confirmed.push(id);
        }
        fired += 1;
    }

    let progress = session.furthest_progress();
    drop(session);
    drop(writer);

    println!("document: {document_id}");
    println!("confirmed: {}", confirmed.join(", "));
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}

fn run_due_timers(session: &mut ReadingSession, now: Instant, confirmed: &mut Vec<String>) {
    let mut fired = 0;
    while let Some(deadline) = session.next_deadline() {
        if deadline > now {
            break;
        }
        if fired == MAX_TRAILING_TICKS {
            warn!("Timers still due after {fired} ticks, moving on");
            break;
        }
        if let DwellOutcome::Confirmed(id) = session.tick(deadline) {
            confirmed.push(id);
        }
        fired += 1;
    }
}

fn show_progress(store: Option<PathBuf>, document: Option<&str>) -> Result<()> {
    let path = match store {
        Some(path) => path,
        None => default_store_path()?,
    };
    let backend = JsonFileBackend::load(&path)?;

    let mut entries: Vec<_> = backend
        .iter()
        .filter(|(id, _)| document.is_none_or(|d| d == id.as_str()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    if entries.is_empty() {
        println!("No progress stored in {}", path.display());
        return Ok(());
    }
    for (id, stored) in entries {
        println!(
            "{id}: block {} (position {}) updated {}",
            stored.block_id,
            stored.position,
            stored.updated_at.to_rfc3339()
        );
    }
    Ok(())
}
