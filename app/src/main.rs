use anyhow::Context as _;
use clap::{Parser, Subcommand};
use settings::Settings;
use tokio_util::sync::CancellationToken;

use crate::energy::EnergyReconciler;
use crate::room_status::{SetpointMode, WaterHeaterMode};
use crate::statistics::{PgStatisticsStore, StatisticsStore};

mod core;
mod energy;
mod intuis;
mod room_status;
mod runtime;
mod settings;
mod statistics;
mod topology;

#[derive(Parser)]
#[command(version, about = "Polls Muller Intuitiv heating controllers and keeps their energy statistics")]
struct Cli {
    /// Configuration file, values can be overridden by environment variables
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll status and energy until interrupted (default)
    Run,
    /// Print the current status of every room
    Status,
    /// Switch a room to manual mode with the given set point
    SetTemperature {
        #[arg(long)]
        room: String,
        #[arg(long)]
        temperature: f64,
    },
    /// Set the set-point mode of a room (home, manual, off, hg)
    SetMode {
        #[arg(long)]
        room: String,
        #[arg(long)]
        mode: SetpointMode,
    },
    /// Set the operating mode of a water heater room
    SetWaterHeaterMode {
        #[arg(long)]
        room: String,
        #[arg(long, value_enum)]
        mode: WaterHeaterMode,
    },
    /// Delete every energy statistic written by this service
    ClearStatistics,
}

#[tokio::main(flavor = "multi_thread")]
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new(&cli.config).context("Error reading configuration")?;

    settings
        .monitoring
        .init()
        .map_err(|e| anyhow::anyhow!("Error initializing monitoring: {}", e))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(settings).await,
        Command::Status => print_status(settings).await,
        Command::SetTemperature { room, temperature } => {
            let runtime = runtime::connect(settings.intuis.new_client()?, &settings.polling).await?;
            runtime.control().set_temperature(&room, temperature).await
        }
        Command::SetMode { room, mode } => {
            let runtime = runtime::connect(settings.intuis.new_client()?, &settings.polling).await?;
            runtime.control().set_mode(&room, mode).await
        }
        Command::SetWaterHeaterMode { room, mode } => {
            let runtime = runtime::connect(settings.intuis.new_client()?, &settings.polling).await?;
            runtime.control().set_water_heater_mode(&room, mode).await
        }
        Command::ClearStatistics => {
            let store = PgStatisticsStore::new(settings.database.new_pool().await?);
            let removed = store
                .clear_namespace(&format!("{}:", settings.energy.statistic_prefix))
                .await?;
            println!("Removed {} statistics", removed);
            Ok(())
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = PgStatisticsStore::new(settings.database.new_pool().await?);
    store.migrate().await?;

    tracing::info!("Starting bootstrapping");
    let runtime = runtime::bootstrap(settings.intuis.new_client()?, &settings.polling)
        .await
        .context("Error bootstrapping, service not started")?;

    let energy = runtime.energy_coordinator(&settings.polling, &settings.energy);
    let reconciler = EnergyReconciler::new(store, runtime.topology.clone(), settings.energy.clone());
    let energy_batches = energy.subscribe();

    //published batches stay buffered on the bus until the reconciler runs
    if let Err(e) = energy.first_refresh().await {
        tracing::warn!("Initial energy refresh failed, retrying with next cycle: {}", e);
    }
    tracing::info!("Bootstrapping completed");

    let cancel = CancellationToken::new();
    let shutdown = {
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown requested"),
                Err(e) => tracing::error!("Error waiting for shutdown signal: {}", e),
            }
            cancel.cancel();
        }
    };

    tracing::info!("Starting main loop");
    tokio::join!(
        runtime.status.run(cancel.clone()),
        energy.run(cancel.clone()),
        reconciler.run(energy_batches, cancel.clone()),
        shutdown,
    );

    tracing::info!("Stopped");
    Ok(())
}

async fn print_status(settings: Settings) -> anyhow::Result<()> {
    let runtime = runtime::bootstrap(settings.intuis.new_client()?, &settings.polling).await?;

    let snapshot = runtime.status.snapshot();
    println!(
        "Status {}, last refresh {}",
        snapshot.state,
        snapshot.last_success.map_or("-".to_owned(), |t| t.to_string())
    );

    for status in snapshot.data.unwrap_or_default().values() {
        let room_type = runtime.topology.room(&status.room_id).and_then(|r| r.room_type.as_deref());
        let mut line = format!(
            "{:<20} {:<12} {:>6} -> {:>6}  {}",
            status.name,
            room_type.unwrap_or("-"),
            status.current_temperature.map_or("-".to_owned(), |t| format!("{:.1}", t)),
            status.target_temperature.map_or("-".to_owned(), |t| format!("{:.1}", t)),
            status.mode.as_ref().map_or("-".to_owned(), |m| m.to_string()),
        );

        if status.open_window == Some(true) {
            line.push_str("  window open");
        }
        if let Some(mode) = status.water_heater_mode() {
            line.push_str(&format!("  water heater {}", mode));
        }

        println!("{}", line);
    }

    Ok(())
}
