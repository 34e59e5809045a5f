//! berth CLI - dry runs of the offer-driven scheduling core.

mod config;
mod driver;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use berth_core::{Offer, ServiceSpec, TaskStatus};
use berth_offer::{
    DefaultOfferAccepter, DefaultOfferEvaluator, DefaultOfferRequirementProvider,
    DefaultTaskKiller, PersistentLaunchRecorder, TaskKiller,
};
use berth_plan::{
    DefaultPlanManager, DefaultPlanScheduler, Element, PhaseFactory, Plan, PlanCoordinator,
    PlanManager, StatusPublisher, StepFactory, StrategyKind,
};
use berth_recovery::RecoveryPlanManager;
use berth_storage::{JsonStateStore, MemoryStateStore, StateStore};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::SchedulerConfig;
use crate::driver::SimulatedCluster;

const DEFAULT_MAX_CYCLES: usize = 50;
const STATUS_CHANNEL_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Offer-driven deployment and recovery planner", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the deploy plan for a service
    Plan {
        /// Service spec (JSON)
        #[arg(long)]
        spec: PathBuf,
        /// Strategy between the steps of each phase
        #[arg(long)]
        strategy: Option<StrategyKind>,
    },
    /// Deploy a service against a simulated cluster
    Simulate {
        /// Service spec (JSON)
        #[arg(long)]
        spec: PathBuf,
        /// Agent capacity, one template offer per agent (JSON)
        #[arg(long)]
        offers: PathBuf,
        /// Max offer cycles
        #[arg(long)]
        cycles: Option<usize>,
        /// Milliseconds between offer rounds
        #[arg(long, default_value = "10")]
        interval_ms: u64,
        /// Task instance whose first launch fails (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,
    },
    /// Kill a stored task
    Kill {
        /// Task instance name, e.g. node-0-server
        task: String,
        /// Mark the task permanently failed so its pod is replaced
        #[arg(long)]
        destructive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SchedulerConfig::load(cli.config.as_deref()).await?;
    let store = open_store(&config).await?;

    match cli.command {
        Commands::Plan { spec, strategy } => {
            let service: ServiceSpec = read_json(&spec).await?;
            let strategy = strategy.unwrap_or(config.coordinator.deploy_strategy);
            let steps = StepFactory::from_store(store.as_ref()).await?;
            print_plan(&PhaseFactory::new(steps).plan(&service, strategy));
        }
        Commands::Simulate {
            spec,
            offers,
            cycles,
            interval_ms,
            fail,
        } => {
            let service: ServiceSpec = read_json(&spec).await?;
            let agents: Vec<Offer> = read_json(&offers).await?;
            if agents.is_empty() {
                bail!("{} lists no agents", offers.display());
            }
            simulate(config, store, service, agents, cycles, Duration::from_millis(interval_ms), fail)
                .await?;
        }
        Commands::Kill { task, destructive } => {
            if config.state_dir.is_none() {
                bail!("kill needs a persistent store: set state_dir or {}", config::STATE_DIR_ENV);
            }
            let (status_tx, mut status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
            let cluster = Arc::new(SimulatedCluster::new(Vec::new(), status_tx));
            DefaultTaskKiller::new(store.clone(), cluster)
                .kill_task(&task, destructive)
                .await;

            while let Ok(status) = status_rx.try_recv() {
                store.store_status(&status).await?;
                println!("{} {}", status.task_id, status.state);
            }
        }
    }

    Ok(())
}

async fn open_store(config: &SchedulerConfig) -> Result<Arc<dyn StateStore>> {
    Ok(match &config.state_dir {
        Some(dir) => {
            info!("Using state store at {}", dir.display());
            Arc::new(
                JsonStateStore::new(dir)
                    .await
                    .with_context(|| format!("opening state store {}", dir.display()))?,
            )
        }
        None => Arc::new(MemoryStateStore::new()),
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn simulate(
    config: SchedulerConfig,
    store: Arc<dyn StateStore>,
    service: ServiceSpec,
    agents: Vec<Offer>,
    cycles: Option<usize>,
    interval: Duration,
    fail: Vec<String>,
) -> Result<()> {
    let (status_tx, status_rx) = mpsc::channel::<TaskStatus>(STATUS_CHANNEL_CAPACITY);
    let (offer_tx, offer_rx) = mpsc::channel(1);
    let cluster = Arc::new(SimulatedCluster::new(agents, status_tx).with_failures(fail));

    let publisher = StatusPublisher::default();
    let mut changes = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => info!("{}: {} -> {}", change.element, change.from, change.to),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Missed {} status changes", missed)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let steps = StepFactory::from_store(store.as_ref())
        .await?
        .with_publisher(publisher.clone());
    let deploy = PhaseFactory::new(steps)
        .plan(&service, config.coordinator.deploy_strategy)
        .with_publisher(publisher.clone());
    let recovery = RecoveryPlanManager::new(
        store.clone(),
        service,
        config.recovery.launch_constrainer(),
        config.recovery.failure_monitor(),
    )
    .with_publisher(publisher);

    let scheduler = DefaultPlanScheduler::new(
        Arc::new(DefaultOfferEvaluator::new(Arc::new(
            DefaultOfferRequirementProvider::new(),
        ))),
        Arc::new(
            DefaultOfferAccepter::new()
                .with_recorder(Arc::new(PersistentLaunchRecorder::new(store.clone()))),
        ),
        Arc::new(DefaultTaskKiller::new(store.clone(), cluster.clone())),
    );

    let max_cycles = cycles
        .or(config.coordinator.max_cycles)
        .unwrap_or(DEFAULT_MAX_CYCLES);
    let mut coordinator = PlanCoordinator::new(Arc::new(scheduler), store)
        .with_manager(Arc::new(DefaultPlanManager::new(deploy)))
        .with_manager(Arc::new(recovery))
        .with_config(config.coordinator.with_max_cycles(Some(max_cycles)));

    let feed = {
        let cluster = cluster.clone();
        tokio::spawn(async move {
            while let Ok(permit) = offer_tx.reserve().await {
                permit.send(cluster.offers());
                tokio::time::sleep(interval).await;
            }
        })
    };

    coordinator.run(cluster.as_ref(), offer_rx, status_rx).await;
    feed.abort();

    info!("Stopped after {} cycles", coordinator.cycles());
    for manager in coordinator.managers() {
        print_plan(&manager.plan());
    }
    if !coordinator.is_complete() {
        warn!("Deployment did not complete");
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("{} ({})", plan.name(), plan.status());
    for phase in plan.phases() {
        println!("  {} ({})", phase.name(), phase.status());
        for step in phase.steps() {
            println!("    {}", step.message());
            for error in step.errors() {
                println!("      error: {}", error);
            }
        }
    }
}
