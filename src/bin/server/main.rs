use actix::Actor;
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{App, HttpServer};
use env_logger::Env;
use realty::db::init_db;
use realty::web::messages_ws::{init_message_server, MessageServer};
use std::io::{Error, ErrorKind};
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_lib_mods();
    realty::app_config::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| realty::app_config::database().url);
    init_db(database_url)
        .await
        .map_err(|e| Error::new(ErrorKind::Other, format!("Database unavailable: {}", e)))?;

    realty::rate_limit::init_rate_limits(&realty::app_config::rate_limit());
    realty::storage::init_storage()
        .map_err(|e| Error::new(ErrorKind::Other, format!("Storage unavailable: {}", e)))?;

    // Start the push server for new-message events
    let message_server = MessageServer::new().start();
    init_message_server(message_server);

    // Spawn rate limiter and token cleanup task
    actix_web::rt::spawn(async {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(300)); // Every 5 minutes
        loop {
            interval.tick().await;
            realty::rate_limit::cleanup_old_entries_public();
            match realty::session::purge_expired_tokens().await {
                Ok(purged) => log::debug!("Purged {} expired tokens", purged),
                Err(e) => log::warn!("Failed to purge expired tokens: {}", e),
            }
        }
    });

    let bind = realty::app_config::server().bind;
    log::info!("Listening on {}", bind);

    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_FRAME_OPTIONS, "DENY"))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .wrap(Logger::new("%a %r %s %Dms"))
            .configure(realty::web::configure)
    })
    .bind(bind)?
    .run()
    .await
}

/// Initialize third party crates we rely on but don't have control over.
fn init_lib_mods() {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
