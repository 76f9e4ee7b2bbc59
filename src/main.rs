use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use aquabeacon_api::config::AppConfig;
use aquabeacon_api::services::daraja::DarajaGateway;
use aquabeacon_api::state::AppState;
use aquabeacon_api::{database, routes, services};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env();
    let db = database::connection::connect(&config.database_url, &config.database_name).await;
    let app_state = initialize_app_state(db, config).await;

    tokio::spawn(services::sweeper::run(
        app_state.db.clone(),
        app_state.config.payment_expiry_secs,
    ));

    let app = build_router(app_state.clone());
    start_server(app, &app_state.config).await;
}

async fn initialize_app_state(db: mongodb::Database, config: AppConfig) -> AppState {
    let app_state = AppState::new(db, config);

    let Some(daraja_config) = app_state.config.daraja.clone() else {
        tracing::warn!("M-Pesa configuration incomplete, payments are disabled");
        return app_state;
    };

    tracing::info!(
        "📱 M-Pesa short code {} ({})",
        daraja_config.short_code,
        daraja_config.environment
    );

    let gateway = Arc::new(DarajaGateway::new(daraja_config));

    // Fetch a token once at boot to verify the credentials; run degraded
    // rather than crash-looping when Daraja is unreachable.
    match gateway.get_access_token().await {
        Ok(_) => {
            tracing::info!("✅ M-Pesa gateway initialized and ready");
            app_state.with_daraja(gateway)
        }
        Err(e) => {
            tracing::error!("❌ M-Pesa credential check failed: {}", e);
            tracing::warn!("Continuing with payments disabled");
            app_state
        }
    }
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .nest("/api/payments", routes::payments::routes(app_state.clone()))
        .nest("/api/mpesa", routes::mpesa::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, config: &AppConfig) {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("invalid HOST/PORT");

    tracing::info!("🚀 AquaBeacon payments API starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            axum::serve(listener, app).await.unwrap();
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn root_handler() -> &'static str {
    "AquaBeacon Payments API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    use mongodb::bson::doc;

    let db_status = match state.db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "mpesa": state.daraja.is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
