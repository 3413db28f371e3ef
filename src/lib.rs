pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod keys;
pub mod output;
pub mod parser;
pub mod record;
pub mod render;
pub mod session;
pub mod source;
pub mod stats;
