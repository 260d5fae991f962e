//! invguard service
//!
//! Serves derived views and analytics over the latest InvGuard snapshots and
//! streams inventory notifications over a websocket.
//!
//! Usage:
//!   invguard            # reads ./invguard.json if present, then INVGUARD_* variables
//!   RUST_LOG=debug invguard

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use invguard::config::Settings;
use invguard::interface::ViewInterface;
use invguard::server::router;
use invguard::session::Session;
use invguard::source::{DirectorySource, HttpSource, Source};

#[tokio::main]
async fn main() -> invguard::Result<()> {
    let settings = Settings::load()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();

    let source = match &settings.data_dir {
        Some(dir) => {
            info!(dir=%dir.display(), "reading collections from exports");
            Source::Directory(DirectorySource::new(dir))
        }
        None => {
            let session = Session::load(&settings.session_file)?;
            if !session.is_authenticated() {
                warn!(file=%settings.session_file.display(), "no stored session, requests go out unauthenticated");
            }
            info!(api=%settings.api_url, "reading collections from the API");
            Source::Http(HttpSource::new(&settings.api_url, session, settings.transaction_fetch_limit))
        }
    };

    let address = settings.address();
    let refresh_interval = settings.refresh_interval();
    let interface = Arc::new(ViewInterface::new(source, settings));
    for notice in interface.refresh_all().await {
        warn!(%notice, "initial load incomplete");
    }
    let refresher = refresh_interval.map(|period| Arc::clone(&interface).spawn_refresh(period));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(%address, "invguard listening");
    let served = axum::serve(listener, router(interface)).await;
    if let Some(task) = refresher {
        task.abort();
    }
    Ok(served?)
}
