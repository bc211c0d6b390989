#![forbid(unsafe_code)]

//! HTTP surface over the catalog and the scheduler.
//!
//! Every route carries the shared secret and its arguments as base64 path
//! segments. Responses are JSON; failures carry `{"error": "..."}` with a
//! status code per error kind (401 bad secret, 400 bad input, 404 unknown
//! hash, 409 duplicate command, 500 store failure).

pub mod handlers;
pub mod request;
pub mod secret;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::catalog::{CommandStore, ScheduledCommand};
use crate::scheduler::{CompletionHook, Scheduler, SchedulerConfig};

pub use secret::Secret;

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<CommandStore>,
    pub scheduler: Scheduler,
    pub secret: Arc<Secret>,
}

impl AppState {
    /// Starts the scheduler with finished runs folded back into `store`.
    #[must_use]
    pub fn start(store: CommandStore, cfg: SchedulerConfig, secret: Secret) -> Self {
        let store = Arc::new(store);
        let scheduler = Scheduler::start_with_hook(cfg, duration_hook(Arc::clone(&store)));
        Self {
            store,
            scheduler,
            secret: Arc::new(secret),
        }
    }
}

/// Records the duration of every completed run in the catalog.
#[must_use]
pub fn duration_hook(store: Arc<CommandStore>) -> CompletionHook {
    Arc::new(move |finished: &ScheduledCommand| {
        if let Err(e) = store.record_run(finished) {
            tracing::error!(hash = %finished.command.hash, error = %e, "failed to record duration");
        }
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/secret/:secret/add/command/:command/description/:description/workingDirectory/:workingDirectory",
            post(handlers::add),
        )
        .route("/secret/:secret/list", get(handlers::list))
        .route(
            "/secret/:secret/search/description/:description",
            get(handlers::search),
        )
        .route("/secret/:secret/select/cmdHash/:cmdHash", get(handlers::select))
        .route("/secret/:secret/show/cmdHash/:cmdHash", get(handlers::show))
        .route("/secret/:secret/delete/cmdHash/:cmdHash", post(handlers::delete))
        .route("/secret/:secret/run/cmdHash/:cmdHash", post(handlers::run))
        .route("/secret/:secret/status", get(handlers::status))
        .route("/secret/:secret/queue", get(handlers::status))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "starting server");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
