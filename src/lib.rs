pub mod api;
pub mod common_scraper;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod scraper;
pub mod scrapers;
pub mod store;
pub mod utils;
