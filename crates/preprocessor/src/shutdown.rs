//! Signal handling and cleanup for the preprocessor process.
//!
//! SIGINT and SIGTERM cancel a shared [`CancellationToken`]; closers then run
//! concurrently under a timeout once the worker has stopped.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Cleanup step run after the worker stops
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

pub fn closer<F, Fut>(f: F) -> Closer
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    Box::new(|| Box::pin(f()))
}

/// Cancel `token` on SIGINT, or SIGTERM on Unix
pub fn spawn_signal_handler(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up SIGTERM handler: {}", err);
            }
        }
    });
}

/// Run all closers concurrently; returns false if they did not finish in time
pub async fn run_closers(closers: Vec<Closer>, timeout: Duration) -> bool {
    if closers.is_empty() {
        return true;
    }

    tracing::info!("Running closers with timeout of {:?}", timeout);
    match tokio::time::timeout(timeout, run_all(closers)).await {
        Ok(()) => {
            tracing::info!("All closers completed");
            true
        }
        Err(_) => {
            tracing::error!("Closers timed out after {:?}", timeout);
            false
        }
    }
}

async fn run_all(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("Closer completed successfully"),
            Ok(Err(err)) => tracing::error!("Closer error: {:#}", err),
            Err(err) => tracing::error!("Closer panicked: {}", err),
        }
    }
}
