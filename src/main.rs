//! Campus Parking
//!
//! CLI entry point: run the booking server or operate on slots directly.

use anyhow::{Context, Result};
use campus_parking::artifact::{QrTicketWriter, TicketArtifacts};
use campus_parking::config::{find_config, ParkingConfig};
use campus_parking::logging;
use campus_parking::registry::{Registry, Slot};
use campus_parking::server::{self, AppState};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "parking")]
#[command(version)]
#[command(about = "Campus parking slot booking", long_about = None)]
struct Cli {
    /// Configuration file (default: nearest parking.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config {
        /// Only print which file was loaded
        #[arg(long)]
        path: bool,
    },

    /// Book a free slot
    Book {
        /// Slot id (e.g. A1)
        slot: String,
    },

    /// Create missing slot rows in the configured store
    Init,

    /// Release a booked slot
    Release {
        /// Slot id
        slot: String,
    },

    /// Run the web server
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// List all slots
    Slots,

    /// Show one slot
    Status {
        /// Slot id
        slot: String,
    },

    /// Check a ticket; exits non-zero when invalid
    Validate {
        /// Slot id printed on the ticket
        slot: String,

        /// Booking id printed on the ticket
        booking_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = config_source(cli.config.as_deref())?;
    let mut config = match &source {
        Some(path) => ParkingConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ParkingConfig::default(),
    };
    config.apply_env();
    logging::init(&config.logging);

    match cli.command {
        Commands::Config { path } => cmd_config(&config, source.as_deref(), path),
        Commands::Book { slot } => cmd_book(&config, &slot),
        Commands::Init => cmd_init(&config),
        Commands::Release { slot } => cmd_release(&config, &slot),
        Commands::Serve { bind } => cmd_serve(config, bind),
        Commands::Slots => cmd_slots(&config),
        Commands::Status { slot } => cmd_status(&config, &slot),
        Commands::Validate { slot, booking_id } => {
            if !cmd_validate(&config, &slot, &booking_id)? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Explicit `--config` must exist; otherwise search up from the cwd.
fn config_source(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(find_config(&cwd))
}

fn open_registry(config: &ParkingConfig) -> Result<Registry> {
    Registry::from_config(config).context("Failed to initialize slot registry")
}

fn print_slot(slot: &Slot) {
    match &slot.booking_id {
        Some(id) => println!("{:<10}  booked  {}", slot.slot_id, id),
        None => println!("{:<10}  free", slot.slot_id),
    }
}

fn cmd_config(config: &ParkingConfig, source: Option<&Path>, path_only: bool) -> Result<()> {
    if path_only {
        match source {
            Some(path) => println!("{}", path.display()),
            None => println!("(defaults)"),
        }
        return Ok(());
    }
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

fn cmd_init(config: &ParkingConfig) -> Result<()> {
    let registry = open_registry(config)?;
    let occupancy = registry.occupancy();
    println!(
        "Initialized {} slots in {} store ({} booked, {} free)",
        occupancy.total,
        registry.store_name(),
        occupancy.booked,
        occupancy.free
    );
    Ok(())
}

fn cmd_slots(config: &ParkingConfig) -> Result<()> {
    let registry = open_registry(config)?;
    for slot in registry.list() {
        print_slot(&slot);
    }
    Ok(())
}

fn cmd_status(config: &ParkingConfig, slot_id: &str) -> Result<()> {
    let registry = open_registry(config)?;
    let slot = registry.get(slot_id)?;
    print_slot(&slot);
    Ok(())
}

fn cmd_book(config: &ParkingConfig, slot_id: &str) -> Result<()> {
    let registry = open_registry(config)?;
    let booking = registry
        .book(slot_id)
        .with_context(|| format!("Failed to book {}", slot_id))?;
    println!("Booked {}: {}", booking.slot_id, booking.booking_id);

    if config.artifacts.enabled {
        let writer = QrTicketWriter::new(&config.artifacts.dir);
        match writer.render(&booking) {
            Ok(path) => println!("Ticket: {}", path.display()),
            Err(err) => tracing::warn!(error = %err, "ticket rendering failed"),
        }
    }
    Ok(())
}

fn cmd_release(config: &ParkingConfig, slot_id: &str) -> Result<()> {
    let registry = open_registry(config)?;
    registry
        .release(slot_id)
        .with_context(|| format!("Failed to release {}", slot_id))?;
    println!("Released {}", slot_id);
    Ok(())
}

fn cmd_validate(config: &ParkingConfig, slot_id: &str, booking_id: &str) -> Result<bool> {
    let registry = open_registry(config)?;
    let valid = registry.validate(slot_id, booking_id).unwrap_or(false);
    if valid {
        println!("Valid Ticket");
    } else {
        println!("Invalid Ticket");
    }
    Ok(valid)
}

fn cmd_serve(mut config: ParkingConfig, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let registry = Arc::new(open_registry(&config)?);
    let state = AppState::from_config(registry, &config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime
        .block_on(server::serve(state, &config.server.bind))
        .with_context(|| format!("Server on {} failed", config.server.bind))
}
