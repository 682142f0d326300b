pub mod activity;
pub mod assets;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod policy;
pub mod routes;
pub mod schema;
pub mod sharing;
pub mod state;
pub mod storage;
pub mod utils;
