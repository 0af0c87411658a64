//! # homeruled: homerule daemon
//!
//! Composition root that wires the storage adapter into the execution engine
//! and runs the background loops.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize logging
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository implementations (adapters) and the engine
//! - Run the resumer, the minute schedule ticker, and the feed-event listener
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use homerule_adapter_storage_sqlite_sqlx::{
    SqliteAutomationRepository, SqliteComponentRepository, SqliteExecutionRepository,
    SqliteFeedStore,
};
use homerule_app::dispatcher::TriggerDispatcher;
use homerule_app::engine::{EnginePorts, ExecutionEngine};
use homerule_app::event_bus::InProcessEventBus;
use homerule_app::ports::FixedSunTimes;
use homerule_app::resolver::ResolverRegistry;
use homerule_app::resumer::ExecutionResumer;
use homerule_domain::event::{Event, EventType};
use homerule_domain::feed::FeedReading;

use crate::config::Config;

type Engine = ExecutionEngine<
    SqliteAutomationRepository,
    SqliteComponentRepository,
    SqliteExecutionRepository,
    SqliteFeedStore,
    Arc<InProcessEventBus>,
>;

type Dispatcher = TriggerDispatcher<
    SqliteAutomationRepository,
    SqliteComponentRepository,
    SqliteExecutionRepository,
    SqliteFeedStore,
    Arc<InProcessEventBus>,
    FixedSunTimes,
>;

type Resumer = ExecutionResumer<
    SqliteAutomationRepository,
    SqliteComponentRepository,
    SqliteExecutionRepository,
    SqliteFeedStore,
    Arc<InProcessEventBus>,
>;

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config.logging.filter);

    // Database
    let db = homerule_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let pool = db.pool().clone();

    // Repositories
    let automations = SqliteAutomationRepository::new(pool.clone());
    let components = SqliteComponentRepository::new(pool.clone());
    let executions = SqliteExecutionRepository::new(pool.clone());
    let feeds = SqliteFeedStore::new(pool);

    // Event bus
    let bus = Arc::new(InProcessEventBus::new(config.event_bus.capacity));

    // Engine
    let registry = Arc::new(ResolverRegistry::standard(
        feeds.clone(),
        automations.clone(),
    )?);
    let engine: Arc<Engine> = Arc::new(ExecutionEngine::new(
        EnginePorts {
            automations,
            components,
            executions,
            feeds,
            publisher: Arc::clone(&bus),
        },
        registry,
        config.engine_settings(),
    ));
    let resumer = Resumer::new(Arc::clone(&engine));
    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        FixedSunTimes(config.sun_times()?),
    ));

    // Background loops
    let mut tasks: Vec<JoinHandle<()>> = vec![
        tokio::spawn(resume_loop(resumer, config.resume_interval())),
        tokio::spawn(feed_listener(bus.subscribe(), Arc::clone(&dispatcher))),
    ];
    if config.scheduler.enabled {
        tasks.push(tokio::spawn(schedule_loop(dispatcher)));
    }
    tracing::info!(
        database = config.database_url(),
        scheduler = config.scheduler.enabled,
        "homeruled started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    for task in &tasks {
        task.abort();
    }
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn resume_loop(resumer: Resumer, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(error) = resumer.tick().await {
            tracing::warn!(%error, "resumer scan failed");
        }
    }
}

/// Tick at the start of every wall-clock minute.
async fn schedule_loop(dispatcher: Arc<Dispatcher>) {
    let now = homerule_domain::time::now();
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_millis(u64::from(now.timestamp_subsec_millis()));
    let start = tokio::time::Instant::now() + MINUTE.saturating_sub(into_minute);

    let mut ticker = tokio::time::interval_at(start, MINUTE);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match dispatcher
            .on_schedule_tick(homerule_domain::time::now())
            .await
        {
            Ok(report) if !report.is_empty() => tracing::info!(
                started = report.started.len(),
                denied = report.denied.len(),
                errored = report.errored.len(),
                unreachable = report.unreachable.len(),
                "schedule tick"
            ),
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "schedule tick failed"),
        }
    }
}

async fn feed_listener(mut events: broadcast::Receiver<Event>, dispatcher: Arc<Dispatcher>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "feed listener lagged behind the event bus");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if event.event_type != EventType::FeedValueChanged {
            continue;
        }
        let Some(reading) = FeedReading::from_event(&event) else {
            tracing::warn!(event_id = %event.id, "malformed feed event");
            continue;
        };
        if let Err(error) = dispatcher.on_feed_changed(event.premises_id, reading).await {
            tracing::warn!(feed_id = %reading.feed_id, %error, "feed dispatch failed");
        }
    }
}
