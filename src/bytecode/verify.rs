//! Structural bytecode verification
//!
//! The dispatch loop trusts operand ranges it has verified once, so every
//! chunk tree is checked here before the interpreter will run it.

use super::op::{ConstantIndex, JumpTarget, Op};
use super::{BytecodeChunk, Constant, FunctionKind};
use crate::error::JsError;

fn fail(chunk: &BytecodeChunk, ip: usize, message: impl std::fmt::Display) -> JsError {
    let name = chunk
        .name()
        .map(|n| n.as_str().to_string())
        .unwrap_or_else(|| "<anonymous>".to_string());
    JsError::Verify(format!("{} @{}: {}", name, ip, message))
}

/// Verify `chunk` and every chunk nested in its constant pool.
pub fn verify(chunk: &BytecodeChunk) -> Result<(), JsError> {
    verify_one(chunk)?;
    for constant in &chunk.constants {
        if let Constant::Chunk(inner) = constant {
            verify(inner)?;
        }
    }
    Ok(())
}

fn verify_one(chunk: &BytecodeChunk) -> Result<(), JsError> {
    let code_len = chunk.code.len();
    if code_len == 0 {
        return Err(fail(chunk, 0, "empty function body"));
    }
    let in_code = |t: JumpTarget| (t as usize) < code_len;

    for handler in &chunk.exception_table {
        if handler.start > handler.end
            || handler.end as usize > code_len
            || !in_code(handler.target)
        {
            return Err(fail(chunk, handler.start as usize, "exception range outside code"));
        }
    }

    let constant = |idx: ConstantIndex| chunk.constants.get(idx as usize);
    let is_generator_body = matches!(
        chunk.function_info.kind,
        FunctionKind::Generator | FunctionKind::AsyncFunction | FunctionKind::AsyncGenerator
    );

    for (ip, op) in chunk.code.iter().enumerate() {
        for reg in op.registers() {
            if reg >= chunk.register_count {
                return Err(fail(
                    chunk,
                    ip,
                    format!("register r{} >= register count {}", reg, chunk.register_count),
                ));
            }
        }
        for target in op.jump_targets() {
            if !in_code(target) {
                return Err(fail(chunk, ip, format!("jump target {} outside code", target)));
            }
        }

        match op {
            Op::LoadConst { idx, .. } => match constant(*idx) {
                Some(Constant::String(_) | Constant::Number(_) | Constant::BigInt(_)) => {}
                _ => return Err(fail(chunk, ip, "LoadConst needs a primitive constant")),
            },
            Op::GetById { key, cache, .. }
            | Op::TryGetById { key, cache, .. }
            | Op::PutById { key, cache, .. }
            | Op::TryPutById { key, cache, .. } => {
                if !matches!(constant(*key), Some(Constant::String(_))) {
                    return Err(fail(chunk, ip, "property name must be a string constant"));
                }
                if *cache as usize >= chunk.caches.len() {
                    return Err(fail(chunk, ip, "cache index out of range"));
                }
            }
            Op::PutNewOwnById { key, .. }
            | Op::DelById { key, .. }
            | Op::DeclareGlobalVar { name: key } => {
                if !matches!(constant(*key), Some(Constant::String(_))) {
                    return Err(fail(chunk, ip, "property name must be a string constant"));
                }
            }
            Op::CacheNewObject { keys, cache, .. } => {
                if !matches!(constant(*keys), Some(Constant::Keys(_))) {
                    return Err(fail(chunk, ip, "CacheNewObject needs a key list"));
                }
                if *cache as usize >= chunk.caches.len() {
                    return Err(fail(chunk, ip, "cache index out of range"));
                }
            }
            Op::CreateClosure { chunk: idx, .. } | Op::CreateClass { chunk: idx, .. } => {
                if !matches!(constant(*idx), Some(Constant::Chunk(_))) {
                    return Err(fail(chunk, ip, "closure needs a function constant"));
                }
            }
            Op::CreateEnvironment { scope, .. } => {
                if *scope as usize >= chunk.scopes.len() {
                    return Err(fail(chunk, ip, "scope index out of range"));
                }
            }
            Op::SwitchImm { table, .. } => match chunk.jump_tables.get(*table as usize) {
                Some(t) if t.targets.iter().all(|t| in_code(*t)) => {}
                _ => return Err(fail(chunk, ip, "bad jump table")),
            },
            Op::StringSwitch { table, .. } => match chunk.string_tables.get(*table as usize) {
                Some(t) if t.cases.values().all(|t| in_code(*t)) => {}
                _ => return Err(fail(chunk, ip, "bad string table")),
            },
            Op::Yield { .. } | Op::Await { .. } | Op::ResumeGenerator { .. }
                if !is_generator_body =>
            {
                return Err(fail(chunk, ip, "suspension outside a generator or async body"));
            }
            _ => {}
        }
    }
    Ok(())
}
