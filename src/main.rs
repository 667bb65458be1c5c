use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use liftmate_api::config::AppConfig;
use liftmate_api::database::connection::get_db_client;
use liftmate_api::routes;
use liftmate_api::services::mpesa_service::MpesaService;
use liftmate_api::services::payment_service::PaymentService;
use liftmate_api::services::ride_service::RideService;
use liftmate_api::state::AppState;
use liftmate_api::store::mongo::{MongoDriverDirectory, MongoRideStore};
use liftmate_api::store::{DriverDirectory, RideStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let db = get_db_client().await;
    let app_state = initialize_app_state(db).await;

    let app = build_router(app_state);
    start_server(app).await;
}

async fn initialize_app_state(db: mongodb::Database) -> AppState {
    let ride_store = Arc::new(MongoRideStore::new(&db));
    if let Err(e) = ride_store.ensure_indexes().await {
        tracing::warn!("Failed to ensure ride indexes: {}", e);
    }

    let drivers: Arc<dyn DriverDirectory> = Arc::new(MongoDriverDirectory::new(&db));
    let rides: Arc<dyn RideStore> = ride_store;
    let ride_service = Arc::new(RideService::new(Arc::clone(&rides), drivers));

    let mut app_state = AppState::new(db, ride_service);

    tracing::info!("Attempting to initialize M-Pesa service...");
    match AppConfig::from_env() {
        Ok(config) => {
            tracing::info!(
                "M-Pesa config loaded (short code {}, environment {})",
                config.mpesa_short_code,
                config.mpesa_environment
            );

            let stk_timeout = std::time::Duration::from_secs(config.mpesa_timeout_secs);
            match MpesaService::new(config) {
                Ok(mpesa) => match mpesa.get_access_token().await {
                    Ok(_) => {
                        let payments = Arc::new(
                            PaymentService::new(rides, Arc::new(mpesa)).with_timeout(stk_timeout),
                        );
                        app_state = app_state.with_payments(payments);
                        tracing::info!("M-Pesa service initialized and ready");
                    }
                    Err(e) => {
                        tracing::error!("Failed to get M-Pesa access token: {}", e);
                        tracing::warn!("Payment routes will be disabled");
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to build M-Pesa client: {}", e);
                    tracing::warn!("Payment routes will be disabled");
                }
            }
        }
        Err(e) => {
            tracing::error!("Failed to load M-Pesa config: {}", e);
            tracing::warn!("Payment routes will be disabled");
        }
    }

    app_state
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .nest("/api/rides", routes::rides::routes())
        .nest("/api/payments", routes::payments::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router) {
    let port = std::env::var("PORT").unwrap_or_else(|_| "10000".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(10000)));

    tracing::info!("Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn root_handler() -> &'static str {
    "LiftMate Ride API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    use mongodb::bson::doc;

    let db_status = match state.db.run_command(doc! {"ping": 1}).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "mpesa": state.payments.is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
