//! Stack traces and error objects
//!
//! The trace interleaves bytecode frames with the native functions running
//! between them, innermost first. Error objects record it as a `stack`
//! string when they are created.

use crate::bytecode::SourceLocation;
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::ObjectKind;
use crate::object::shape::PropertyFlags;
use crate::value::{JsString, JsValue};

use super::Interpreter;
use super::stack::Frame;

/// One line of a stack trace
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrameInfo {
    pub function_name: String,
    pub file: Option<String>,
    pub location: Option<SourceLocation>,
    /// Instruction index within the function
    pub ip: usize,
    pub native: bool,
}

impl std::fmt::Display for StackFrameInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.native {
            return write!(f, "    at {} (native)", self.function_name);
        }
        let file = self.file.as_deref().unwrap_or("unknown");
        match self.location {
            Some(loc) => write!(
                f,
                "    at {} ({}:{}:{})",
                self.function_name, file, loc.line, loc.column
            ),
            None => write!(f, "    at {} (address at {}:{})", self.function_name, file, self.ip),
        }
    }
}

fn frame_info(frame: &Frame) -> StackFrameInfo {
    let function_name = match (&frame.chunk.function_info.name, frame.callee) {
        (Some(name), _) if !name.as_str().is_empty() => name.to_string(),
        (_, None) => "global".to_string(),
        _ => "anonymous".to_string(),
    };
    let ip = frame.current_ip();
    StackFrameInfo {
        function_name,
        file: frame.chunk.file.as_ref().map(JsString::to_string),
        location: frame.chunk.location(ip),
        ip,
        native: false,
    }
}

impl Interpreter {
    /// The current call stack, innermost first
    pub fn stack_trace(&self) -> Vec<StackFrameInfo> {
        self.capture_stack(false)
    }

    /// `skip_native_top` drops the innermost native call, which is the
    /// error constructor itself when called from `new Error(...)`
    pub(crate) fn capture_stack(&self, skip_native_top: bool) -> Vec<StackFrameInfo> {
        let mut natives = self.native_calls.iter().rev().peekable();
        if skip_native_top {
            natives.next_if(|n| n.depth == self.frames.len());
        }
        let native_info = |name: &JsString| StackFrameInfo {
            function_name: name.to_string(),
            file: None,
            location: None,
            ip: 0,
            native: true,
        };
        let mut out = Vec::with_capacity(self.frames.len() + self.native_calls.len());
        for (index, frame) in self.frames.iter().enumerate().rev() {
            while let Some(native) = natives.next_if(|n| n.depth > index) {
                out.push(native_info(&native.name));
            }
            out.push(frame_info(frame));
        }
        out.extend(natives.map(|n| native_info(&n.name)));
        out
    }

    /// Render a trace below `header`, truncated to the configured head and tail
    pub(crate) fn format_stack(&self, header: &str, frames: &[StackFrameInfo]) -> String {
        let mut text = header.to_string();
        let limit = self.config.stack_trace_limit;
        let push = |text: &mut String, info: &StackFrameInfo| {
            text.push('\n');
            text.push_str(&info.to_string());
        };
        if frames.len() > limit.head + limit.tail {
            let skipped = frames.len() - limit.head - limit.tail;
            for info in frames.iter().take(limit.head) {
                push(&mut text, info);
            }
            text.push_str(&format!("\n    ... skipping {} frames", skipped));
            for info in frames.iter().skip(limit.head + skipped) {
                push(&mut text, info);
            }
        } else {
            for info in frames {
                push(&mut text, info);
            }
        }
        text
    }

    /// Allocate an error object with `message` and a captured `stack`
    pub(crate) fn make_error(
        &mut self,
        proto: ObjectId,
        name: &str,
        message: &str,
        skip_native_top: bool,
    ) -> ObjectId {
        let id = self.alloc_object(Some(proto), ObjectKind::Error);
        let header = if message.is_empty() {
            name.to_string()
        } else {
            format!("{}: {}", name, message)
        };
        let frames = self.capture_stack(skip_native_top);
        let stack = self.format_stack(&header, &frames);
        if !message.is_empty() {
            let key = self.key("message");
            let value = JsValue::String(self.intern(message));
            self.define_raw(id, key, value, PropertyFlags::HIDDEN);
        }
        let key = self.key("stack");
        self.define_raw(id, key, JsValue::String(JsString::from(stack)), PropertyFlags::HIDDEN);
        id
    }

    /// The JS value a catch handler receives for `error`. Native errors are
    /// materialized as error objects; uncatchable errors stay errors.
    pub(crate) fn error_value(&mut self, error: JsError) -> Result<JsValue, JsError> {
        let Some((name, message)) = error.native_parts() else {
            return match error {
                JsError::Thrown { value } => Ok(value),
                other => Err(other),
            };
        };
        let proto = match name {
            "TypeError" => self.realm.type_error_prototype,
            "RangeError" => self.realm.range_error_prototype,
            "ReferenceError" => self.realm.reference_error_prototype,
            "SyntaxError" => self.realm.syntax_error_prototype,
            _ => self.realm.error_prototype,
        };
        let message = message.to_string();
        Ok(JsValue::Object(self.make_error(proto, name, &message, false)))
    }

    /// Text for an uncaught error: the `stack` of error objects, otherwise
    /// the value's string form
    pub fn error_to_string(&mut self, error: &JsError) -> String {
        let JsError::Thrown { value } = error else {
            return error.to_string();
        };
        let JsValue::Object(id) = value else {
            return self.display_primitive(value);
        };
        let id = *id;
        let stack_key = self.key("stack");
        if let Ok(JsValue::String(stack)) = self.get_property(id, &stack_key) {
            return stack.to_string();
        }
        let name_key = self.key("name");
        let message_key = self.key("message");
        let name = match self.get_property(id, &name_key) {
            Ok(JsValue::String(s)) => s.to_string(),
            _ => "Object".to_string(),
        };
        match self.get_property(id, &message_key) {
            Ok(JsValue::String(m)) if !m.as_str().is_empty() => format!("{}: {}", name, m),
            _ => name,
        }
    }
}
