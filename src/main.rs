use fir_pipeline_backend::config::Config;
use fir_pipeline_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).with_ansi(true).init();
    }

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let port = config.port;
    let startup_timeout = config.startup_timeout;

    let state = AppState::new(config).await?;

    // ── Background tasks ──────────────────────────────────────────────
    let _health_monitor = state.reliability.health.clone().spawn();
    let _session_sweeper = state
        .sessions
        .clone()
        .spawn_sweeper(std::time::Duration::from_secs(300), state.config.session_timeout);

    // ── Dependency gate: don't accept traffic until required deps are up,
    // or STARTUP_TIMEOUT elapses ───────────────────────────────────────
    let gate = state.reliability.gate.clone();
    let health = state.reliability.health.clone();
    gate.wait_and_open(&health, startup_timeout).await;

    let app = fir_pipeline_backend::create_router(state.clone());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    print_banner(port);
    tracing::info!("fir-pipeline-backend listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

fn print_banner(port: u16) {
    println!();
    println!("  \x1b[1;33m>>>  FIR PIPELINE BACKEND  <<<\x1b[0m");
    println!("  \x1b[33mComplaint-to-FIR document generation service\x1b[0m");
    println!("  \x1b[1;32mhttp://localhost:{port}\x1b[0m");
    println!();
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("shutdown signal received, starting graceful drain");

    state.reliability.shutdown.begin_drain().await;

    if let Err(e) = state.sessions.flush().await {
        tracing::error!("shutdown: failed to flush session store: {}", e);
    }

    // Closing the pool waits for checked-out connections to return, then
    // drops them — the closest sqlx equivalent to a "table flush" for a
    // connection pool that has no buffered writes of its own.
    state.fir_store.pool().close().await;

    // reqwest has no explicit close; its connections are torn down when the
    // last client handle (held by Orchestrator/ModelClient/KbRetriever) is
    // dropped along with `state` as main() returns.
    tracing::info!("shutdown: relational store closed, draining complete");
}
