//! Terminal unread badge: logs the viewer's unread label whenever it changes.

use actix::Actor;
use anyhow::{bail, Context};
use env_logger::Env;
use realty::client::ConversationClient;
use realty::transport::{bind_indicator, RealtimeProvider, WsProvider};
use realty::unread::indicator::{Dismount, UnreadIndicator};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    realty::app_config::init();

    let config = realty::app_config::client();
    if config.token.is_empty() {
        bail!("No token configured; set REALTY_CLIENT__TOKEN");
    }

    let client = ConversationClient::from_config()?;
    let viewer = client
        .fetch_viewer(&config.token)
        .await
        .context("Unable to resolve the configured token")?;
    log::info!("Watching unread messages for user {}", viewer.id);

    let indicator = UnreadIndicator::new(client.clone(), Some(viewer.clone()))
        .with_observer(|label| match label {
            Some(label) => log::info!("Unread: {}", label),
            None => log::info!("No unread messages"),
        })
        .start();

    let push = if config.realtime {
        let provider = WsProvider::for_server(client.base_url())?;
        match provider.connect(&viewer).await {
            Ok(handle) => {
                bind_indicator(&provider, &handle, indicator.clone());
                Some((provider, handle))
            }
            Err(e) => {
                log::warn!("Push channel unavailable, polling only: {}", e);
                None
            }
        }
    } else {
        None
    };

    actix_web::rt::signal::ctrl_c().await?;
    log::info!("Shutting down");

    indicator.send(Dismount).await?;
    if let Some((provider, handle)) = push {
        provider.disconnect(handle);
    }

    Ok(())
}
