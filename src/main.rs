use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailwatch::config::Config;
use mailwatch::effects::{AlertLogger, HttpForwarder, SideEffect};
use mailwatch::fetch::HttpDeltaFetcher;
use mailwatch::lock::{FsLockStore, ItemLock};
use mailwatch::processor::ChangeProcessor;
use mailwatch::server::{self, AppState};
use mailwatch::store::{CursorStore, DedupStore};
use mailwatch::types::HolderId;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let upstream_url = config
        .upstream_url
        .clone()
        .expect("MAILWATCH_UPSTREAM_URL must be set");

    // Startup recovery: locks left by a crashed run are removed eagerly so
    // no item waits out the staleness threshold under contention, and the
    // dedup snapshot is reloaded (a lost snapshot degrades to reprocessing,
    // not to a refusal to start).
    let locks = FsLockStore::new(config.locks_dir(), config.lock_stale_after);
    match locks.sweep_stale() {
        Ok(0) => {}
        Ok(removed) => info!(removed, "removed stale locks from a previous run"),
        Err(e) => warn!(error = %e, "stale lock sweep failed"),
    }
    let dedup = DedupStore::load(config.dedup_path(), config.dedup_cap);
    let cursors = CursorStore::new(config.cursors_dir());

    let mut effects: Vec<Arc<dyn SideEffect>> = vec![Arc::new(AlertLogger::new())];
    match &config.forward_url {
        Some(url) => {
            info!(endpoint = %url, "forwarding enabled");
            effects.push(Arc::new(HttpForwarder::new(url.clone())));
        }
        None => info!("forwarding disabled (MAILWATCH_FORWARD_URL unset)"),
    }

    let processor = ChangeProcessor::new(
        cursors.clone(),
        dedup,
        Box::new(locks),
        Arc::new(HttpDeltaFetcher::new(upstream_url)),
        effects,
        HolderId::for_process(),
    );

    let app = server::build_router(AppState::new(processor, cursors));

    info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
