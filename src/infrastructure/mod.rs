pub mod config;
pub mod http;
pub mod mapping_client;
pub mod repositories;
