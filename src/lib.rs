pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;
pub mod storage;
pub mod utils;
