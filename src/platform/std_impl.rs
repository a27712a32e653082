//! Standard library implementations of platform traits.

use std::cell::RefCell;
use std::rc::Rc;

use super::{ConsoleLevel, ConsoleProvider};

/// Console provider using stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConsoleProvider;

impl StdConsoleProvider {
    pub fn new() -> Self {
        Self
    }
}

impl ConsoleProvider for StdConsoleProvider {
    fn write(&self, level: ConsoleLevel, message: &str) {
        match level {
            ConsoleLevel::Log => println!("{message}"),
            ConsoleLevel::Error => eprintln!("{message}"),
        }
    }
}

/// Console provider that records lines in memory.
///
/// Clones share the same buffer, so a test can keep one handle and give the
/// other to the interpreter.
#[derive(Debug, Clone, Default)]
pub struct BufferedConsole {
    lines: Rc<RefCell<Vec<(ConsoleLevel, String)>>>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written at `ConsoleLevel::Log`
    pub fn output(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(level, _)| *level == ConsoleLevel::Log)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Lines written at `ConsoleLevel::Error`
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(level, _)| *level == ConsoleLevel::Error)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

impl ConsoleProvider for BufferedConsole {
    fn write(&self, level: ConsoleLevel, message: &str) {
        self.lines.borrow_mut().push((level, message.to_string()));
    }
}
