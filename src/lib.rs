pub mod app;
pub mod cli;
pub mod config;
pub mod errors;
pub mod message;
pub mod storage;
pub mod types;
