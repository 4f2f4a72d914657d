//! recron - a declarative cron reconciliation engine.
//!
//! Usage:
//!   recron run <resources-dir>      Run the controller with resources from the directory
//!   recron validate <resources-dir> Validate resource definitions without running
//!   recron list <resources-dir>     List resources and their upcoming fire-times

use clap::{Parser, Subcommand};
use recron::{
    load_resources_from_directory, Clock, Controller, Event, EventBus, EventHandler,
    InMemoryStore, ProcessExecutor, ResourceStore, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// recron - a declarative cron reconciliation engine
#[derive(Parser)]
#[command(name = "recron")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller with resources from a directory
    Run {
        /// Path to the directory containing resource YAML files
        #[arg(value_name = "RESOURCES_DIR")]
        resources_dir: PathBuf,

        /// Reconcile tick interval in seconds (default: 1)
        #[arg(long, default_value = "1")]
        tick_interval: u64,
    },

    /// Validate resource definitions without running
    Validate {
        /// Path to the directory containing resource YAML files
        #[arg(value_name = "RESOURCES_DIR")]
        resources_dir: PathBuf,
    },

    /// List resources and their upcoming fire-times
    List {
        /// Path to the directory containing resource YAML files
        #[arg(value_name = "RESOURCES_DIR")]
        resources_dir: PathBuf,
    },
}

/// Simple logging event handler that prints reconcile events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::JobLaunched {
                resource,
                job,
                fire_time,
                ..
            } => {
                info!("Launched '{}' for {} (fire-time {})", job, resource, fire_time);
            }
            Event::JobCancelled { resource, job, .. } => {
                info!("Cancelled '{}' for {}", job, resource);
            }
            Event::JobsPruned {
                resource, jobs, ..
            } => {
                info!("Pruned {} completed job(s) for {}", jobs.len(), resource);
            }
            Event::LaunchSkipped {
                resource,
                fire_time,
                reason,
                ..
            } => {
                info!(
                    "Skipped fire-time {} for {} ({:?})",
                    fire_time, resource, reason
                );
            }
            Event::BacklogDropped { resource, .. } => {
                warn!("Dropped oversized missed-run backlog for {}", resource);
            }
            Event::ReconcileFailed {
                resource, error, ..
            } => {
                error!("Reconciliation failed for {}: {}", resource, error);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            resources_dir,
            tick_interval,
        } => {
            run_controller(resources_dir, tick_interval).await?;
        }
        Commands::Validate { resources_dir } => {
            validate_resources(resources_dir)?;
        }
        Commands::List { resources_dir } => {
            list_resources(resources_dir)?;
        }
    }

    Ok(())
}

/// Run the controller with resources from a directory.
async fn run_controller(
    resources_dir: PathBuf,
    tick_interval: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading resources from: {}", resources_dir.display());

    let resources = load_resources_from_directory(&resources_dir)?;

    if resources.is_empty() {
        warn!("No resource files found in {}", resources_dir.display());
        return Ok(());
    }

    info!("Loaded {} resource(s):", resources.len());
    for (id, spec) in &resources {
        let suspend_info = if spec.suspend { " (suspended)" } else { "" };
        info!(
            "  - {} [{}] policy={}{}",
            id, spec.schedule, spec.concurrency_policy, suspend_info
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    // Seed the store with the declared resources
    let store = InMemoryStore::new();
    for (id, spec) in resources {
        store.insert(id, spec, clock.now()).await?;
    }

    // Create event bus with logging handler
    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    let executor = ProcessExecutor::new(Arc::clone(&clock));

    let controller = Controller::new(store, executor)
        .with_clock(clock)
        .with_event_bus(event_bus)
        .with_tick_interval(Duration::from_secs(tick_interval));

    info!("Starting controller (tick interval: {}s)...", tick_interval);
    info!("Press Ctrl+C to stop");

    let (handle, controller_task) = controller.start().await;

    // Wait for Ctrl+C
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("\nShutting down...");
            handle.shutdown().await?;
        }
        _ = controller_task => {
            info!("Controller stopped");
        }
    }

    info!("Goodbye!");
    Ok(())
}

/// Validate resource definitions without running.
fn validate_resources(resources_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating resources in: {}", resources_dir.display());

    match load_resources_from_directory(&resources_dir) {
        Ok(resources) => {
            info!("All {} resource(s) are valid:", resources.len());
            for (id, spec) in &resources {
                info!("  - {} [{}]: OK", id, spec.schedule);
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List resources and their upcoming fire-times.
fn list_resources(resources_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let resources = load_resources_from_directory(&resources_dir)?;

    if resources.is_empty() {
        println!("No resources found in {}", resources_dir.display());
        return Ok(());
    }

    let clock = SystemClock::new();

    println!("Resources in {}:", resources_dir.display());
    println!();

    for (id, spec) in &resources {
        println!("ID: {}", id);
        println!("  Schedule: {}", spec.schedule);
        if let Some(tz) = &spec.timezone {
            println!("  Timezone: {}", tz);
        }
        println!("  Policy: {}", spec.concurrency_policy);
        println!("  Suspended: {}", spec.suspend);
        if let Some(deadline) = spec.starting_deadline_seconds {
            println!("  Starting deadline: {}s", deadline);
        }
        println!(
            "  History limits: {} succeeded / {} failed",
            spec.successful_history_limit(),
            spec.failed_history_limit()
        );

        match spec.parse_schedule() {
            Ok(schedule) => {
                let upcoming = schedule.next_n_after(clock.now(), 3)?;
                if upcoming.is_empty() {
                    println!("  Upcoming: none");
                } else {
                    println!("  Upcoming:");
                    for t in upcoming {
                        println!("    - {}", t);
                    }
                }
            }
            Err(e) => println!("  Upcoming: unavailable ({})", e),
        }

        println!();
    }

    Ok(())
}
