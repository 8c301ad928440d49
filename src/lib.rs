pub mod app_config;
pub mod cache;
pub mod client;
pub mod constants;
pub mod conversations;
pub mod db;
pub mod ip;
pub mod middleware;
pub mod orm;
pub mod properties;
pub mod rate_limit;
pub mod session;
pub mod storage;
pub mod transport;
pub mod unread;
pub mod user;
pub mod web;
