use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use media_moderator::{
    EventBus, HttpScorer, MemoryStore, ModerationEvent, ModerationStore, Moderator,
    ModeratorConfig, PgStore,
    api::{ApiState, SecurityState, create_router},
    moderation::{DecisionEngine, OffenseLedger, ReviewWorkflow, ScoreCache},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration is validated before anything else starts
    let config = Arc::new(ModeratorConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check the MODERATOR_* environment variables.");
        e
    })?);

    init_logging(&config)?;

    info!("Starting media moderator v{}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let store = create_store(&config).await?;
    let events = EventBus::default();

    let policy = config.to_policy();
    let engine = Arc::new(DecisionEngine::new(policy.clone()).context("Invalid decision policy")?);
    let cache = Arc::new(ScoreCache::new(config.to_cache_settings()));
    let ledger = Arc::new(OffenseLedger::new(store.clone(), policy));
    let reviews = Arc::new(ReviewWorkflow::new(
        store.clone(),
        ledger.clone(),
        cache.clone(),
        engine.clone(),
        events.clone(),
    ));

    let restored = reviews
        .restore()
        .await
        .context("Failed to restore pending review cases")?;
    info!("Review workflow ready ({} pending case(s))", restored);

    let scorer = Arc::new(
        HttpScorer::new(config.to_scorer_config()).context("Failed to create scorer client")?,
    );

    let moderator = Arc::new(Moderator::new(
        scorer,
        engine,
        cache.clone(),
        ledger,
        reviews.clone(),
        store,
        events.clone(),
    ));

    spawn_event_logger(&events);
    spawn_maintenance(cache, reviews, &config);

    let app = create_router(
        ApiState { moderator },
        SecurityState::new(config.api.api_keys.clone()),
    )
    .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Moderation API listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Media moderator stopped");
    Ok(())
}

fn init_logging(config: &ModeratorConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

async fn create_store(config: &ModeratorConfig) -> Result<Arc<dyn ModerationStore>> {
    if !config.database.postgres_enabled {
        warn!("PostgreSQL disabled, offenders and review cases are kept in memory");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(&config.database.postgres_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    store
        .init_schema()
        .await
        .context("Failed to initialize moderation schema")?;

    Ok(Arc::new(store))
}

/// Log every moderation event; this is where chat owners get notified
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match &event {
                    ModerationEvent::Decided { decision, .. } if !decision.kind.removes_content() => {
                        debug!(event = event.name(), "{}", summarize(&event));
                    }
                    ModerationEvent::ScoringFailed { .. } | ModerationEvent::ReviewOverdue { .. } => {
                        warn!(event = event.name(), "{}", summarize(&event));
                    }
                    _ => info!(event = event.name(), "{}", summarize(&event)),
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event logger lagged, {} event(s) dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn summarize(event: &ModerationEvent) -> String {
    match event {
        ModerationEvent::Decided { user, decision, .. } => {
            format!("{} -> {} ({})", user, decision.kind, decision.reason)
        }
        ModerationEvent::ScoringFailed { user, error, .. } => {
            format!("scoring failed for {}: {}", user, error)
        }
        ModerationEvent::ReviewOpened { case } => {
            format!("case {} opened for {}", case.case_id, case.user)
        }
        ModerationEvent::ReviewResolved { case, decision } => format!(
            "case {} {} by {} -> {}",
            case.case_id,
            case.state,
            case.resolved_by.as_deref().unwrap_or("unknown"),
            decision.kind
        ),
        ModerationEvent::ReviewOverdue { case } => {
            format!("case {} pending since {}", case.case_id, case.opened_at)
        }
    }
}

/// Periodically drop expired cache records and re-announce overdue reviews
fn spawn_maintenance(cache: Arc<ScoreCache>, reviews: Arc<ReviewWorkflow>, config: &ModeratorConfig) {
    let period = Duration::from_secs(config.review.sweep_interval_secs);
    let overdue_after = config.overdue_after();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            cache.evict_expired(chrono::Utc::now()).await;

            if let Err(e) = reviews.overdue(overdue_after).await {
                error!("Overdue review sweep failed: {}", e);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
