pub mod api;
pub mod backend;
pub mod config;
pub mod delta;
pub mod encoders;
pub mod error;
pub mod monitor;
pub mod persist;
pub mod state;
pub mod stats;
pub mod store;
pub mod supervisor;
