//! hsfsm - horizontally scalable finite state machine demo
//!
//! Drives one entity from several concurrent routines. Every routine talks to
//! the store only; none of them holds the entity's state.

use hsfsm_core::{Config, Engine, EntityId, Store};
use hsfsm_storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if HSFSM_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("HSFSM_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            if std::env::var("HSFSM_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    let layout = config.layout()?;
    let table = Arc::new(config.build_table()?);

    tracing::info!("Starting hsfsm demo");
    tracing::info!("  Table: {}.{}", layout.table(), layout.field());
    tracing::info!("  Dialect: {}", config.store.dialect);
    tracing::info!("  Initial state: {}", table.initial());
    tracing::info!("  Events: {}", table.rules().len());

    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(5)));
    let engine = Arc::new(
        Engine::new(table, layout, store.clone()).with_default_timeout(config.default_timeout()),
    );

    let id = EntityId::from("1");
    engine.initialize(&id).await?;

    let routines: [(&str, &[&str]); 3] = [
        ("1", &["Ready"]),
        ("2", &["Ready", "NotReady"]),
        ("3", &["Stop", "Delete"]),
    ];

    let mut handles = Vec::new();
    for (routine, events) in routines {
        let engine = engine.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            for event in events {
                if let Err(e) = transition(&*engine, routine, &id, event).await {
                    tracing::error!(routine, event, "transition failed: {}", e);
                }
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    let state = engine.current(&id).await?;
    tracing::info!(
        id = %id,
        state = %state,
        statements = store.statement_count(),
        changes = store.rows_changed(),
        "Settled"
    );
    Ok(())
}

/// Reads the state, fires one event, reads the state again.
async fn transition<S: Store>(
    engine: &Engine<S>,
    routine: &str,
    id: &EntityId,
    event: &str,
) -> Result<(), hsfsm_core::CoreError> {
    let before = engine.current(id).await?;
    tracing::info!(routine, state = %before, "-> {}", event);

    engine.event(id, event).await?;

    let after = engine.current(id).await?;
    tracing::info!(routine, state = %after, "<- {}", event);
    Ok(())
}
