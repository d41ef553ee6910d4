pub mod commits;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod framework;
pub mod monitor;
pub mod sync;
