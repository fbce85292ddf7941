// statusboard: fleet status poller and chat publisher.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_api::DiscordClient;
use tokio::sync::watch;
use tracing::{error, info, warn};

use statusboard::http::{self, auth::AdminAuth, rate_limit::RateLimiter, state::AppState};
use statusboard::publish::Publisher;
use statusboard::scheduler;
use statusboard::settings::Settings;
use statusboard::store::{ConfigStore, watcher::ConfigWatcher};

/// Bound on waiting for the admin server after shutdown is signalled.
const ADMIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Admin-plane rate limit: burst, then sustained requests per minute.
const RATE_LIMIT_BURST: u32 = 10;
const RATE_LIMIT_PER_MINUTE: u32 = 30;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "statusboard starting");

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            std::process::exit(1);
        }
    };

    let store = match ConfigStore::open(&settings.config_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("FATAL: failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    {
        let cfg = store.get();
        info!(
            path = %settings.config_path.display(),
            servers = cfg.servers.len(),
            interval_secs = cfg.update_interval,
            "configuration loaded"
        );
    }

    let chat = match DiscordClient::new(&settings.discord_token) {
        Ok(chat) => chat,
        Err(e) => {
            eprintln!("FATAL: failed to build chat client: {}", e);
            std::process::exit(1);
        }
    };
    let identity = match chat.current_user().await {
        Ok(user) => user,
        Err(e) => {
            eprintln!("FATAL: chat session: {}", e);
            std::process::exit(1);
        }
    };
    info!(user = %identity.username, "chat session established");

    let publisher = Publisher::new(chat, settings.channel_id.clone(), identity.id);
    publisher.cleanup_startup().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut admin_task = None;
    if let Some(admin) = &settings.admin {
        let cors = match http::cors_layer(admin) {
            Ok(cors) => cors,
            Err(e) => {
                eprintln!("FATAL: {}", e);
                std::process::exit(1);
            }
        };
        let app_state = AppState::new(
            store.clone(),
            Arc::new(AdminAuth::new(&admin.bearer_token)),
            Arc::new(RateLimiter::new(RATE_LIMIT_BURST, RATE_LIMIT_PER_MINUTE)),
            admin.trusted_proxies.clone(),
        );

        // Flip the drain flag as soon as shutdown is signalled so requests
        // arriving during the graceful drain get a 503 instead of racing
        // the stopping scheduler.
        let draining = app_state.draining.clone();
        let mut drain_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let _ = drain_rx.changed().await;
            draining.store(true, std::sync::atomic::Ordering::Relaxed);
        });

        let router = http::build_router(app_state, admin.static_dir.clone(), cors);
        let listener = match tokio::net::TcpListener::bind(&admin.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("FATAL: failed to bind admin API to {}: {}", admin.bind_addr, e);
                std::process::exit(1);
            }
        };
        info!(addr = %admin.bind_addr, "admin API listening");

        let mut rx = shutdown_rx.clone();
        admin_task = Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.changed().await;
            };
            let serve = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown);
            if let Err(e) = serve.await {
                error!(error = %e, "admin server error");
            }
        }));
    }

    let probe_client = match reqwest::Client::builder().build() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("FATAL: failed to build probe client: {}", e);
            std::process::exit(1);
        }
    };
    let watcher = ConfigWatcher::new(store.clone());

    scheduler::run(&store, &watcher, &probe_client, &publisher, shutdown_rx).await;

    if let Some(task) = admin_task {
        if tokio::time::timeout(ADMIN_SHUTDOWN_TIMEOUT, task).await.is_err() {
            warn!("admin server did not stop within 30s");
        }
    }
    info!("statusboard shut down cleanly");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
