pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod listing;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;
pub mod threading;
pub mod validation;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config as configure, AppState};
pub use security::SecurityHeaders;
