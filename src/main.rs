use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod client_ip;
mod config;
mod error;
mod geo;
mod routes;
mod store;
mod visitor;

use geo::{GeoLocator, IpApiLocator};
use store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub tera: Arc<tera::Tera>,
    pub geo: Arc<dyn GeoLocator>,
    pub store: Option<Arc<dyn DocumentStore>>,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::visitor::index))
        .route("/api/visitor-info", get(routes::visitor::api_visitor_info))
        .route("/health", get(routes::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = config::AppConfig::from_env();
    init_tracing(config.debug);

    if let Err(e) = config.validate() {
        tracing::warn!("{e}; persistence is disabled");
    }

    let tera = tera::Tera::new(&config.templates_glob()).expect("Failed to load templates");

    let geo: Arc<dyn GeoLocator> = Arc::new(IpApiLocator::new(
        config.geoip_api_url.clone(),
        config.geoip_timeout(),
    ));
    let store = store::connect(&config).await;

    let state = AppState {
        tera: Arc::new(tera),
        geo,
        store,
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install signal handler");
    tracing::info!("Shutting down...");
}
