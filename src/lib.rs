pub mod auth;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod desk;
pub mod error;
pub mod logging;
pub mod models;
pub mod pagination;
pub mod policy;

#[cfg(test)]
mod testing;
