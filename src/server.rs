use crate::config::Config;
use crate::services::queue::run_worker;
use crate::services::{Maintenance, RetryPolicy, Store};
use crate::{routes, state};
use tokio::{net::TcpListener, signal, task::JoinSet};
use tokio_util::sync::CancellationToken;

pub async fn run_until_done(config: Config, bind: TcpListener) -> anyhow::Result<()> {
    let store = Store::connect(&config.database.parse_path()?).await?;
    let (state, receiver) = state::AppState::build(store, &config)?;
    let mut join_set: JoinSet<anyhow::Result<()>> = JoinSet::new();
    let shutdown_signal = CancellationToken::new();
    // axum serve
    {
        let shutdown_signal = shutdown_signal.clone();
        let routes = routes::build().with_state(state.clone());
        join_set.spawn(async move {
            axum::serve(bind, routes)
                .with_graceful_shutdown(async move {
                    shutdown_signal.cancelled().await;
                })
                .await?;
            Ok::<_, anyhow::Error>(())
        });
    }
    // task queue worker
    {
        let policy = RetryPolicy {
            max_attempts: config.queue.max_attempts.max(1),
            backoff: config.queue.backoff(),
        };
        join_set.spawn(run_worker(
            state.queue.clone(),
            receiver,
            state.runner.clone(),
            policy,
            shutdown_signal.clone(),
        ));
    }
    // periodic cache resync and retention
    {
        let maintenance = Maintenance {
            queue: state.queue.clone(),
            repository: state.repository.clone(),
            cache: state.cache.clone(),
            interval: config.maintenance.interval(),
            event_max_age: config.maintenance.event_max_age(),
        };
        join_set.spawn(maintenance.run(shutdown_signal.clone()));
    }
    // register ctrl+c signal
    {
        let shutdown_signal = shutdown_signal.clone();
        join_set.spawn(async move {
            let _ = signal::ctrl_c().await;
            tracing::debug!("Received Ctrl+C, start terminating");
            shutdown_signal.cancel();
            Ok::<_, anyhow::Error>(())
        });
    }
    #[cfg(unix)]
    {
        let shutdown_signal = shutdown_signal.clone();
        join_set.spawn(async move {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            sigterm.recv().await;
            tracing::debug!("Received SIGTERM signal, start terminating");
            shutdown_signal.cancel();
            Ok::<_, anyhow::Error>(())
        });
    }
    while let Some(r) = join_set.join_next().await {
        if shutdown_signal.is_cancelled() {
            join_set.shutdown().await;
            tracing::info!("Server stopped");
            break;
        }
        match r {
            Ok(Ok(_)) => (),
            Ok(Err(e)) => return Err(e),
            Err(e) => anyhow::bail!("Internal error in spawn: {e}"),
        }
    }
    Ok(())
}
