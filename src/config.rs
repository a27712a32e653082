//! Runtime configuration

use serde::Deserialize;

use crate::error::JsError;
use crate::gc::DEFAULT_GC_THRESHOLD;

/// Frames kept from each end of a truncated stack trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StackTraceLimit {
    /// Innermost frames kept
    pub head: usize,
    /// Outermost frames kept
    pub tail: usize,
}

impl Default for StackTraceLimit {
    fn default() -> Self {
        Self { head: 50, tail: 50 }
    }
}

/// Interpreter settings. Every field has a default, so a partial JSON
/// document (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Allocations between automatic collections; 0 disables them
    pub gc_threshold: usize,
    /// Maximum number of bytecode frames before `RangeError`
    pub max_stack_depth: usize,
    pub stack_trace_limit: StackTraceLimit,
    /// When false, promise jobs are posted to the macrotask queue
    pub microtask_queue: bool,
    /// Wall-clock budget for one host entry, in milliseconds
    pub time_limit_ms: Option<u64>,
    /// Strict code may not create globals by assigning to them
    pub strict_globals: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            max_stack_depth: 1000,
            stack_trace_limit: StackTraceLimit::default(),
            microtask_queue: true,
            time_limit_ms: None,
            strict_globals: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(text: &str) -> Result<Self, JsError> {
        serde_json::from_str(text)
            .map_err(|e| JsError::internal_error(format!("invalid runtime config: {}", e)))
    }
}
