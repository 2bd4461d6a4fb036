pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod gmail_api;
pub mod record;
pub mod types;

pub use config::Config;
pub use error::Error;
