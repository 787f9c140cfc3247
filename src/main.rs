//! Velox demo server.
//!
//! ```text
//!     Client Request
//!         → http::server (tracing, timeout, connect info)
//!         → App::fetch
//!             → extensions (pre-dispatch)
//!             → routing (segment trie)
//!             → handler chain (validated context)
//!             → normalize → extensions (post-dispatch)
//!     Client Response
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use velox::config::{load_config, Config};
use velox::observability::{logging, metrics};
use velox::{App, Chain, Context, Error, HttpServer, Outcome, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "velox", version, about = "Velox HTTP dispatch demo server")]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        runtime = %config.runtime.kind,
        base = %config.app.base,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = Arc::new(build_app(&config)?);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    HttpServer::new(app, &config.timeouts)
        .run(listener, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_app(config: &Config) -> Result<App, velox::routing::RouteError> {
    let mut app = App::from_config(config);

    app.get(
        "/",
        Chain::new(|_ctx: Context| async { Ok::<_, Error>(Outcome::respond("velox")) }),
    )?
    .get(
        "/health",
        Chain::new(|ctx: Context| async move {
            Ok::<_, Error>(Outcome::respond(json!({
                "status": "ok",
                "runtime": ctx.runtime().as_str(),
            })))
        }),
    )?
    .get(
        "/echo/:name",
        Chain::new(|ctx: Context| async move {
            let name = ctx.req().param("name")?;
            Ok::<_, Error>(Outcome::respond(json!({ "name": name })))
        }),
    )?
    .post(
        "/echo",
        Chain::new(|ctx: Context| async move {
            let body = ctx.req().json(None).await.ok_or(Error::BadRequest)?;
            Ok::<_, Error>(Outcome::respond(body))
        }),
    )?;

    Ok(app)
}
