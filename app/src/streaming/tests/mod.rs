//! Test suite for the streaming protocol loop
//!
//! Driver and supervisor behaviour is exercised against the scripted
//! `MockStreamer`, which records every call made on every stream.

pub mod driver_tests;
