//! Test support for the streaming protocol loop

pub mod mocks;

pub use mocks::*;
