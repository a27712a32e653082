//! Platform abstraction for console output.
//!
//! The interpreter never writes to stdout directly: `print` and uncaught
//! error reports go through a `ConsoleProvider`, so embedders can redirect
//! output and tests can capture it.

mod std_impl;

pub use std_impl::{BufferedConsole, StdConsoleProvider};

/// Log level for console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// print() - general output
    Log,
    /// Uncaught errors and job failures
    Error,
}

/// Trait for handling console output.
pub trait ConsoleProvider {
    /// Write one line at the specified log level.
    fn write(&self, level: ConsoleLevel, message: &str);
}

/// A console provider that discards all output.
pub struct NoOpConsoleProvider;

impl ConsoleProvider for NoOpConsoleProvider {
    fn write(&self, _level: ConsoleLevel, _message: &str) {}
}
