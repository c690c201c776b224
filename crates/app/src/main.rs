use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "csolr-server", version, about = "Plugin search server backed by Solr")]
struct Args {
    /// Listen address for the search pages
    #[arg(long = "listen", env = "CSOLR_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

fn init_tracing() {
    let env = std::env::var("CSOLR_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CSOLR_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CSOLR_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let args = Args::parse();
    let state = Arc::new(csolr_web::AppState::from_env()?);
    csolr_web::serve(args.listen, state).await
}
