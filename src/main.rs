use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use serverless_handlers::backend::Backend;
use serverless_handlers::handlers::{self, Services};
use serverless_handlers::logger::FUNCTION_INSTANCE_ID;
use serverless_handlers::{config, is_development};

#[derive(Parser)]
#[command(name = "functions")]
#[command(about = "Serve the HTTP and background functions locally")]
#[command(version)]
struct Args {
    #[arg(long, env = "HOST", default_value = "0.0.0.0", help = "Address to bind")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 5001, help = "Port to listen on")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the config singleton reads the environment
    let _ = dotenvy::dotenv();

    let default_level = if is_development!() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let args = Args::parse();
    let config = config::config();
    tracing::info!("Starting functions in {:?} mode", config.environment);

    let services = Services::from_config();
    let mut app = app(&services);
    if config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app(services: &Services) -> Router {
    let functions: Vec<String> = handlers::endpoints(services)
        .iter()
        .map(|endpoint| format!("/{}", endpoint.name()))
        .chain(handlers::triggers().iter().map(|function| format!("/events/{}", function.name())))
        .collect();

    Router::new()
        .route(
            "/",
            get(move || {
                let functions = functions.clone();
                async move { Json(json!({ "name": env!("CARGO_PKG_NAME"), "functions": functions })) }
            }),
        )
        .route("/health", get(health))
        .merge(handlers::router(services))
}

async fn health() -> impl IntoResponse {
    let backend = Backend::instance();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "project": backend.project_id(),
            "instance": FUNCTION_INSTANCE_ID.as_str(),
        })),
    )
}
