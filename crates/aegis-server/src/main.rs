use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use aegis_api::auth::{self, AppState, AppStateInner};
use aegis_api::middleware::require_auth;
use aegis_api::{alerts, contacts, timers};
use aegis_dispatch::{Dispatcher, WebhookGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aegis=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("AEGIS_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("AEGIS_DB_PATH").unwrap_or_else(|_| "aegis.db".into());
    let host = std::env::var("AEGIS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("AEGIS_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let send_timeout: u64 = std::env::var("AEGIS_SEND_TIMEOUT_SECS")
        .unwrap_or_else(|_| "10".into())
        .parse()?;

    // Init database
    let db = Arc::new(aegis_db::Database::open(&PathBuf::from(&db_path))?);

    // Background workers: notification dispatch and safety-timer escalation
    let dispatcher = Dispatcher::new(
        db.clone(),
        WebhookGateway::from_env(),
        Duration::from_secs(send_timeout),
    );
    tokio::spawn(dispatcher.run(Duration::from_secs(1)));
    tokio::spawn(aegis_dispatch::timer::run_timer_loop(
        db.clone(),
        Duration::from_secs(1),
    ));

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/signin", post(auth::signin))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/trusted-contacts", get(contacts::list_contacts))
        .route("/api/trusted-contacts", post(contacts::create_contact))
        .route("/api/trusted-contacts/{id}", put(contacts::update_contact))
        .route("/api/trusted-contacts/{id}", delete(contacts::delete_contact))
        .route("/api/panic-alerts/trigger", post(alerts::trigger_alert))
        .route("/api/panic-alerts", get(alerts::list_alerts))
        .route("/api/panic-alerts/{id}", get(alerts::get_alert))
        .route("/api/panic-alerts/{id}/status", put(alerts::update_alert_status))
        .route("/api/safety-timer", get(timers::current_timer))
        .route("/api/safety-timer", post(timers::start_timer))
        .route("/api/safety-timer/check-in", post(timers::check_in))
        .route("/api/safety-timer/cancel", post(timers::cancel_timer))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let app = Router::new()
        .route("/health", get(health))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Aegis server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
