pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod payload;
pub mod record;
pub mod remote;
pub mod report;
pub mod transport;
