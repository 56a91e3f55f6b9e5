use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acp_adapter::bootstrap;
use acp_adapter::config::AdapterConfig;
use acp_adapter::routes;
use acp_relay::GatewayProvider;

const ALLOWED_HEADERS: [&str; 7] = [
    "content-type",
    "authorization",
    "signature",
    "timestamp",
    "idempotency-key",
    "request-id",
    "api-version",
];

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default().allowed_origin_fn(|origin, _| {
            origin
                .to_str()
                .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                .unwrap_or(false)
        })
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(ALLOWED_HEADERS)
        .expose_headers(vec!["request-id", "idempotency-key"])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AdapterConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "configuration loaded");

    let state = match bootstrap::bootstrap(&config) {
        Ok(s) => web::Data::new(s),
        Err(e) => {
            tracing::error!("Failed to start adapter: {e}");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(u64::from(config.rate_limit_rpm.max(1)))
        .finish()
    {
        Some(c) => c,
        None => {
            tracing::error!("Invalid RATE_LIMIT_RPM: {}", config.rate_limit_rpm);
            std::process::exit(1);
        }
    };
    let cors_origins = config.allowed_origins.clone();

    tracing::info!("ACP relay adapter listening on port {port}");
    tracing::info!("Gateway: {}", config.network.gateway_url);
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  POST http://localhost:{port}/agentic_commerce/delegate_payment");
    tracing::info!("  POST http://localhost:{port}/agentic_commerce/capture");
    tracing::info!("  POST http://localhost:{port}/negotiation/proposals");
    tracing::info!("  POST http://localhost:{port}/escrow/{{deposit,release,refund}}");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(65_536))
            .app_data(web::JsonConfig::default().limit(65_536))
            .configure(routes::configure::<GatewayProvider>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
