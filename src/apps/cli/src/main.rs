/// PowerTools CLI
///
/// Loads a transcript fixture into the simulated chat host and runs one
/// deletion-engine command against it.
mod logging;
mod prompt;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use powertools_core::{
    BulkKind, ChatHostSim, ConfirmPrompt, HostDom, JsonFileStore, NodeId, PowerTools,
    PowerToolsConfig, PowerToolsEvent, SidebarAction, SimTranscript, StaticConfirm,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "powertools")]
#[command(about = "PowerTools - bulk-delete chat transcript turns", long_about = None)]
#[command(version)]
struct Cli {
    /// Transcript fixture (JSON: host options plus turns)
    #[arg(short, long)]
    transcript: PathBuf,

    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Key-value store file for boundary flags and stats
    #[arg(long)]
    store: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete every user turn of one kind, top-down
    BulkDelete {
        /// text | image | file
        #[arg(value_parser = parse_kind)]
        kind: BulkKind,
    },

    /// Delete from a turn down to the first boundary flag
    DeleteFrom {
        /// Zero-based turn index
        index: usize,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Flip the boundary flag of a turn
    ToggleBoundary {
        /// Zero-based turn index
        index: usize,
    },

    /// Remove every boundary flag
    ClearBoundaries,

    /// Inject turn controls and report what was added
    Inject,
}

fn parse_kind(raw: &str) -> std::result::Result<BulkKind, String> {
    raw.parse::<BulkKind>().map_err(|e| e.to_string())
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("powertools").join("storage.json"))
        .unwrap_or_else(|| PathBuf::from("powertools-storage.json"))
}

async fn load_transcript(path: &Path) -> Result<SimTranscript> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid transcript: {}", path.display()))
}

fn turn_at(sim: &ChatHostSim, index: usize) -> Result<NodeId> {
    let turns = sim.turns();
    match turns.get(index) {
        Some(turn) => Ok(*turn),
        None => bail!("Turn index {} out of range ({} turns)", index, turns.len()),
    }
}

fn print_events(mut rx: broadcast::Receiver<PowerToolsEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PowerToolsEvent::Status { message, .. }) => println!("{}", message),
                Ok(PowerToolsEvent::ClicksSaved { added, total, .. }) => {
                    println!("Clicks saved: +{} (total {})", added, total)
                }
                Ok(PowerToolsEvent::ReviewMilestone { name, total, .. }) => {
                    tracing::info!("Review milestone reached: name={}, total={}", name, total)
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Status output lagged: skipped={}", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_transcript(sim: &ChatHostSim) {
    let texts = sim.turn_texts();
    println!("Transcript: {} turns", texts.len());
    for (index, text) in texts.iter().enumerate() {
        println!("  [{}] {}", index, text);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let config = match &cli.config {
        Some(path) => PowerToolsConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => PowerToolsConfig::default(),
    };
    let transcript = load_transcript(&cli.transcript).await?;
    let sim = ChatHostSim::from_transcript(&transcript).context("Failed to render transcript")?;
    tracing::info!("Transcript loaded: turns={}", transcript.turns.len());

    let store_path = cli.store.clone().unwrap_or_else(default_store_path);
    tracing::debug!("Using store: path={}", store_path.display());
    let store = Arc::new(JsonFileStore::new(store_path));

    let prompt: Arc<dyn ConfirmPrompt> = match &cli.command {
        Commands::DeleteFrom { yes: true, .. } => Arc::new(StaticConfirm(true)),
        _ => Arc::new(prompt::TerminalPrompt),
    };
    let tools = PowerTools::new(sim.host(), store, prompt, config)?;
    let printer = print_events(tools.events().subscribe());

    let result = run_command(&cli.command, &sim, &tools).await;

    // Dropping the facade closes the event channel and ends the printer.
    drop(tools);
    if let Err(e) = printer.await {
        tracing::warn!("Status printer failed: {}", e);
    }
    result?;

    print_transcript(&sim);
    Ok(())
}

async fn run_command(command: &Commands, sim: &ChatHostSim, tools: &PowerTools) -> Result<()> {
    match command {
        Commands::BulkDelete { kind } => {
            if let Some(report) = tools.handle_action(SidebarAction::BulkDelete(*kind)).await? {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Commands::DeleteFrom { index, .. } => {
            let turn = turn_at(sim, *index)?;
            let report = tools.orchestrator().delete_from(turn).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ToggleBoundary { index } => {
            let turn = turn_at(sim, *index)?;
            let active = tools.toggle_boundary(turn).await;
            println!("Boundary on turn {}: {}", index, if active { "set" } else { "cleared" });
        }
        Commands::ClearBoundaries => {
            tools.handle_action(SidebarAction::ClearBoundaries).await?;
        }
        Commands::Inject => {
            let task = tools.start_injector();
            tokio::time::sleep(Duration::from_millis(50)).await;
            tools.stop_injector();
            task.await.context("Injector task failed")?;

            let dom = sim.dom();
            for (index, turn) in sim.turns().into_iter().enumerate() {
                let buttons = dom
                    .query_selector_all(turn, ".delete-boundary-button, .delete-below-button")
                    .unwrap_or_default();
                let flagged = dom
                    .query_selector(turn, ".delete-boundary-button.active")
                    .ok()
                    .flatten()
                    .is_some();
                println!(
                    "Turn [{}]: controls={}, boundary={}",
                    index,
                    buttons.len(),
                    flagged
                );
            }
        }
    }
    Ok(())
}
