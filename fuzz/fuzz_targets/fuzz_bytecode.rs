#![no_main]

use libfuzzer_sys::fuzz_target;
use regvm::bytecode::{BytecodeBuilder, Op};
use regvm::{Interpreter, RuntimeConfig};

/// Registers used by generated code
const REGISTERS: u8 = 8;

/// Decode one instruction from a 4-byte window. Jump targets are taken
/// raw so the verifier sees out-of-range values too.
fn decode(bytes: &[u8]) -> Op {
    let r = |i: usize| bytes[i] % REGISTERS;
    let (dst, a, b) = (r(1), r(2), r(3));
    let target = u32::from(bytes[2]);
    match bytes[0] % 26 {
        0 => Op::LoadInt {
            dst,
            value: i32::from(bytes[2]) - 128,
        },
        1 => Op::LoadUndefined { dst },
        2 => Op::LoadNull { dst },
        3 => Op::Mov { dst, src: a },
        4 => Op::Add { dst, left: a, right: b },
        5 => Op::Sub { dst, left: a, right: b },
        6 => Op::Mul { dst, left: a, right: b },
        7 => Op::Div { dst, left: a, right: b },
        8 => Op::Mod { dst, left: a, right: b },
        9 => Op::Exp { dst, left: a, right: b },
        10 => Op::Less { dst, left: a, right: b },
        11 => Op::Eq { dst, left: a, right: b },
        12 => Op::StrictEq { dst, left: a, right: b },
        13 => Op::Not { dst, src: a },
        14 => Op::Negate { dst, src: a },
        15 => Op::TypeOf { dst, src: a },
        16 => Op::Inc { dst, src: a },
        17 => Op::NewObject { dst },
        18 => Op::NewArray {
            dst,
            size: u16::from(bytes[2] % 16),
        },
        19 => Op::GetByVal { dst, obj: a, key: b },
        20 => Op::PutByVal { obj: dst, key: a, value: b },
        21 => Op::Jmp { target },
        22 => Op::JmpTrue { cond: dst, target },
        23 => Op::Call1 {
            dst,
            callee: a,
            this: b,
        },
        24 => Op::Throw { value: dst },
        _ => Op::Ret { value: dst },
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }

    let mut b = BytecodeBuilder::new();
    for reg in 0..REGISTERS {
        b.emit(Op::LoadUndefined { dst: reg });
    }
    for window in data.chunks_exact(4) {
        b.emit(decode(window));
    }
    b.emit(Op::Ret { value: 0 });
    let Ok(chunk) = b.finish() else {
        return;
    };

    let mut interp = Interpreter::with_config(RuntimeConfig {
        time_limit_ms: Some(50),
        ..RuntimeConfig::default()
    });
    // Verification failures and script errors are both expected
    let _ = interp.run(chunk);
    let _ = interp.drain_jobs();
});
