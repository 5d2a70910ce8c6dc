pub mod alerts;
pub mod broadcast;
pub mod collector;
pub mod config;
pub mod db;
pub mod metrics;
pub mod service;
pub mod store;
pub mod ws_server;

pub mod error;
pub mod logger;
pub mod time;
