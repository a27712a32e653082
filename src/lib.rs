//! Register-based JavaScript bytecode virtual machine
//!
//! `regvm` executes bytecode produced through [`BytecodeBuilder`]: there is
//! no parser. An [`Interpreter`] owns the heap, hidden classes, string
//! dictionary, realm intrinsics, register stack, job queues and debugger.
//!
//! # Example
//!
//! ```
//! use regvm::bytecode::{BytecodeBuilder, Op};
//! use regvm::{Interpreter, JsValue};
//!
//! let mut b = BytecodeBuilder::new();
//! let r = b.alloc_register().unwrap();
//! let s = b.alloc_register().unwrap();
//! b.emit_load_number(r, 40.0).unwrap();
//! b.emit_load_number(s, 2.0).unwrap();
//! b.emit(Op::Add { dst: r, left: r, right: s });
//! b.emit(Op::Ret { value: r });
//!
//! let mut interp = Interpreter::new();
//! let result = interp.run(b.finish().unwrap()).unwrap();
//! assert_eq!(result, JsValue::Number(42.0));
//! ```

pub mod api;
pub mod bytecode;
pub mod config;
pub mod environment;
pub mod error;
pub mod gc;
pub mod interpreter;
pub mod object;
pub mod platform;
pub mod string_dict;
pub mod value;

pub use bytecode::{BytecodeBuilder, BytecodeChunk};
pub use config::RuntimeConfig;
pub use error::JsError;
pub use gc::{GcStats, ObjectId};
pub use interpreter::{
    BreakpointId, BreakpointLocation, DebugCommand, DebuggerHost, Interpreter, PauseContext,
    PauseReason, StackFrameInfo,
};
pub use object::function::NativeFn;
pub use platform::{BufferedConsole, ConsoleLevel, ConsoleProvider};
pub use value::{CheapClone, JsString, JsSymbol, JsValue, PropertyKey};
