//! Human-readable bytecode listing

use std::fmt;

use super::op::Op;
use super::{BytecodeChunk, Constant};
use crate::value::number_to_string;

fn describe_constant(constant: &Constant) -> String {
    match constant {
        Constant::String(s) => format!("{:?}", s.as_str()),
        Constant::Number(n) => number_to_string(*n),
        Constant::BigInt(b) => format!("{}n", b.value()),
        Constant::Chunk(c) => format!(
            "<function {}>",
            c.name().map(|n| n.as_str()).unwrap_or("anonymous")
        ),
        Constant::Keys(keys) => {
            let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
            format!("[{}]", names.join(", "))
        }
    }
}

/// Constant operands worth annotating in the listing
fn constant_operand(op: &Op) -> Option<u16> {
    match op {
        Op::LoadConst { idx, .. } => Some(*idx),
        Op::GetById { key, .. }
        | Op::TryGetById { key, .. }
        | Op::PutById { key, .. }
        | Op::TryPutById { key, .. }
        | Op::PutNewOwnById { key, .. }
        | Op::DelById { key, .. } => Some(*key),
        Op::DeclareGlobalVar { name } => Some(*name),
        Op::CacheNewObject { keys, .. } => Some(*keys),
        Op::CreateClosure { chunk, .. } | Op::CreateClass { chunk, .. } => Some(*chunk),
        _ => None,
    }
}

impl fmt::Display for BytecodeChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = &self.function_info;
        writeln!(
            f,
            "Function<{}>({} params, {} registers, {:?}{}):",
            info.name.as_ref().map(|n| n.as_str()).unwrap_or("global"),
            info.param_count,
            self.register_count,
            info.kind,
            if info.strict { ", strict" } else { "" }
        )?;
        for (ip, op) in self.code.iter().enumerate() {
            write!(f, "  {:>4}: {:?}", ip, op)?;
            if let Some(c) = constant_operand(op).and_then(|idx| self.get_constant(idx)) {
                write!(f, "  ; {}", describe_constant(c))?;
            }
            writeln!(f)?;
        }
        if !self.exception_table.is_empty() {
            writeln!(f, "Exception Handlers:")?;
            for h in &self.exception_table {
                writeln!(f, "  [{}, {}) -> {}", h.start, h.end, h.target)?;
            }
        }
        for (i, table) in self.jump_tables.iter().enumerate() {
            writeln!(f, "Jump Table {} (min {}): {:?}", i, table.min, table.targets)?;
        }
        for (i, table) in self.string_tables.iter().enumerate() {
            let mut cases: Vec<_> = table.cases.iter().collect();
            cases.sort_by_key(|(_, target)| **target);
            writeln!(f, "String Table {}:", i)?;
            for (s, target) in cases {
                writeln!(f, "  {:?} -> {}", s.as_str(), target)?;
            }
        }
        for constant in &self.constants {
            if let Constant::Chunk(inner) = constant {
                writeln!(f)?;
                write!(f, "{}", inner)?;
            }
        }
        Ok(())
    }
}
