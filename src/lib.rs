pub mod api;
pub mod config;
pub mod database;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod seeds;
pub mod services;
pub mod utils;
