use std::process;
use std::sync::Arc;

use riverbero::{
    cache::{CacheConfig, StoreRegistry},
    config,
    infra::{InfraError, telemetry},
    relay::{RelayOptions, RelayServer, spawn_reducer_bridge},
};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| InfraError::configuration(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), InfraError> {
    let registry = StoreRegistry::global();
    let store = registry
        .new_store(&settings.relay.store)
        .map_err(|err| InfraError::server(format!("failed to create store: {err}")))?;
    let cache = store
        .new_cache::<String, Value>(&settings.relay.cache, CacheConfig::from(&settings.cache))
        .map_err(|err| InfraError::server(format!("failed to create cache: {err}")))?;

    let server = RelayServer::new(RelayOptions {
        addr: settings.server.addr,
        path: settings.relay.path.clone(),
        key: settings.relay.key.clone(),
        queue_capacity: settings.relay.queue_capacity,
    })
    .map_err(|err| InfraError::server(format!("failed to create relay server: {err}")))?;

    // Late joiners receive the accumulated projection history as one message
    // before any live broadcast.
    let history_cache = Arc::clone(&cache);
    server.set_on_new_connection(move |subscriber| {
        let entries: Vec<Value> = history_cache
            .reducer_history()
            .into_iter()
            .map(|(stamp, derived)| {
                serde_json::json!({
                    "created_at": stamp.format(&Rfc3339).unwrap_or_default(),
                    "state": derived,
                })
            })
            .collect();
        if let Err(err) = subscriber.publish(Value::Array(entries)) {
            warn!(subscriber = %subscriber.key(), error = %err, "failed to send initial state");
        }
    });

    spawn_reducer_bridge(cache.reducer_feed(), Arc::clone(&server));

    let addr = server
        .start()
        .await
        .map_err(|err| InfraError::server(format!("failed to start relay server: {err}")))?;
    info!(
        addr = %addr,
        store = %settings.relay.store,
        cache = %settings.relay.cache,
        "riverbero serving"
    );

    shutdown_signal().await;

    server.shutdown();
    if tokio::time::timeout(settings.server.graceful_shutdown, server.join())
        .await
        .is_err()
    {
        warn!("graceful shutdown window elapsed before connections drained");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
