mod app;
pub mod config;
pub mod diagnostics;
mod error;
pub mod metrics;
pub mod streaming;

#[cfg(test)]
pub mod testing;

// for main.rs
pub use app::{execute, run};
pub use error::Error;
