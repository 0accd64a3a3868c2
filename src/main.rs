use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog::cli::{Cli, Commands};
use catalog::middleware::rate_limit::{self, RateLimiter};
use catalog::store::postgres::PgStore;
use catalog::store::CatalogStore;
use catalog::{api, config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "catalog=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(Commands::Grant { email, permissions }) => {
            let db = PgStore::connect(&cfg.database_url, cfg.db_max_connections).await?;
            grant_permissions(&db, &email, &permissions).await
        }
        Some(Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url, cfg.db_max_connections).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url, cfg.db_max_connections).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let limiter = Arc::new(RateLimiter::new(
        cfg.limiter_rps,
        cfg.limiter_burst,
        cfg.limiter_enabled,
    ));
    rate_limit::spawn_sweeper(limiter.clone());

    let state = Arc::new(AppState {
        store: Arc::new(db),
        limiter,
        config: cfg,
    });

    let app = api::api_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("catalog API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

async fn grant_permissions(db: &PgStore, email: &str, permissions: &[String]) -> anyhow::Result<()> {
    if permissions.is_empty() {
        anyhow::bail!("no permissions given");
    }

    let user = db
        .get_user_by_email(email)
        .await
        .map_err(|e| anyhow::anyhow!("lookup failed for {}: {}", email, e))?;

    let codes: Vec<&str> = permissions.iter().map(String::as_str).collect();
    db.grant_permissions(user.id, &codes)
        .await
        .map_err(|e| anyhow::anyhow!("grant failed: {}", e))?;

    println!("Granted {} to {}", permissions.join(", "), email);
    Ok(())
}
