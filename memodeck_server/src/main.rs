use axum::http::{header::CONTENT_TYPE, Method};
use clap::Parser;
use memodeck::clock::SystemClock;
use memodeck::config::{Environment, ServerConfig};
use memodeck_server::route::create_router;
use memodeck_server::{build_state, spawn_sweeper};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

async fn start_server(args: Args) -> Result<(), String> {
    let config = ServerConfig::from_env(args.environment);
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| format!("Failed to create {}: {}", config.data_dir.display(), e))?;

    let listen_address = config.listen_address.clone();
    let state = build_state(config, Arc::new(SystemClock)).await?;
    spawn_sweeper(state.clone());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any)
        .allow_headers([CONTENT_TYPE]);
    let app = create_router(state).layer(cors);
    let listener = TcpListener::bind(&listen_address)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", listen_address, e))?;
    log::info!("starting server at {}", listen_address);
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Memodeck Web Server
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = Environment::Production)]
    environment: Environment,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = start_server(args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
