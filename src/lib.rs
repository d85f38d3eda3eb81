pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod reports;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod transfer;
pub mod url_check;
pub mod utils;
pub mod validation;
