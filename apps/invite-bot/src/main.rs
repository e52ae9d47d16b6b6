use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invite_bot::config::Config;
use invite_bot::engine::Engine;
use invite_bot::ports::Collaborators;
use invite_bot::store::Stores;
use invite_bot::telegram::BotApi;
use invite_bot::{routes, sweeper, AppState};

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let stores = Stores::open(&config).await.expect("failed to open stores");

    let bot = Arc::new(
        BotApi::new(
            &config.bot_token,
            Duration::from_millis(config.provider_timeout_ms),
        )
        .expect("failed to build bot api client"),
    );

    if let Some(base) = &config.webhook_url {
        let url = format!("{base}/webhook/{}", config.webhook_secret);
        if let Err(err) = bot.set_webhook(&url).await {
            tracing::error!(?err, %base, "failed to register webhook");
        }
    }

    tracing::info!(
        group_id = %config.group_id,
        mode = ?config.membership_mode,
        limit = config.weekly_invite_limit,
        store = stores.backend(),
        "invite-bot configured"
    );

    let engine = Arc::new(Engine::new(
        config.engine_settings(),
        &stores,
        Collaborators::from_single(bot.clone()),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweeper::run(
        engine.clone(),
        stores.clone(),
        chrono::Duration::seconds(config.registry_grace_seconds),
        Duration::from_secs(config.sweep_interval_seconds.max(1)),
        shutdown_rx,
    ));

    let state = AppState {
        engine,
        stores: stores.clone(),
        config: Arc::new(config),
        callbacks: bot,
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "invite-bot listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    // The router and sweeper have released their handles by now.
    stores.close();
    tracing::info!("shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(?err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
