pub mod auth;
pub mod conversations;
pub mod messages_ws;
pub mod profile;
pub mod properties;
pub mod uploads;

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Route resolution will stop at the first match.
    auth::configure(conf);
    profile::configure(conf);
    conversations::configure(conf);
    properties::configure(conf);
    uploads::configure(conf);
    messages_ws::configure(conf);
}
