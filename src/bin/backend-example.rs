//! Demo backend: answers every request with its listen address and the
//! caller's address.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    routing::any,
    Router,
};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "backend-example")]
#[command(about = "Example backend for hashring-proxy", long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(long = "listen.http", default_value = ":4000")]
    listen_http: String,
}

async fn hello(
    State(listen): State<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> String {
    tracing::info!(
        remote = %remote,
        method = %request.method(),
        uri = %request.uri(),
        headers = ?request.headers(),
        "Request received"
    );
    format!("Hello from backend {} to client {}", listen, remote)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend_example=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let cli = Cli::parse();
    let bind = hashring_proxy::config::schema::normalize_bind_address(&cli.listen_http);

    let app = Router::new()
        .route("/", any(hello))
        .route("/{*path}", any(hello))
        .with_state(cli.listen_http.clone());

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
